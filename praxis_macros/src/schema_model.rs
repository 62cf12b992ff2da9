use crate::parsing::SchemaArgs;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

pub fn derive_schema_model_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let args = match SchemaArgs::from_attrs(&input.attrs) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };
    let schema_name = args.name.unwrap_or_else(|| name.to_string());
    let validate = args.validate.map(|path| {
        quote! {
            fn validate(&self) -> ::std::result::Result<(), ::std::string::String> {
                #path(self)
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        #[automatically_derived]
        impl #impl_generics ::praxis::core::SchemaModel for #name #ty_generics #where_clause {
            fn schema_name() -> &'static str {
                #schema_name
            }

            #validate
        }
    };

    TokenStream::from(expanded)
}
