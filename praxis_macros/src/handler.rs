//! `#[handler]`: turns an async function into a handler signature.
//!
//! The function is emitted unchanged next to a companion
//! `<name>_handler()` constructor returning a
//! `praxis::handler::HandlerSignature` that carries the function's name,
//! its declared parameters, type hints for its input and output, and the
//! function item itself for later lookup from the registry.

use crate::parsing::{handler_params, result_ok_type};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemFn};

pub fn handler_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[handler] does not take arguments; pass the name at registration",
        )
        .to_compile_error()
        .into();
    }

    let input = parse_macro_input!(item as ItemFn);
    let sig = &input.sig;
    let fn_name = &sig.ident;
    let vis = &input.vis;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "#[handler] functions must be async")
            .to_compile_error()
            .into();
    }

    if !sig.generics.params.is_empty() {
        return syn::Error::new_spanned(&sig.generics, "#[handler] functions cannot be generic")
            .to_compile_error()
            .into();
    }

    let Some(params) = handler_params(&sig.inputs) else {
        return syn::Error::new_spanned(
            &sig.inputs,
            "#[handler] must be applied to a free function, not a method",
        )
        .to_compile_error()
        .into();
    };

    let output_ty = match result_ok_type(&sig.output) {
        Some(ty) => ty,
        None => {
            return syn::Error::new_spanned(
                &sig.output,
                "#[handler] functions must return Result<T, E>",
            )
            .to_compile_error()
            .into()
        }
    };

    let (input_ty, func) = match params.as_slice() {
        [] => {
            return syn::Error::new_spanned(
                &sig.ident,
                "handler must accept at least the context parameter",
            )
            .to_compile_error()
            .into()
        }
        [_ctx] => (
            quote! { () },
            quote! { ::praxis::handler::HandlerFn::unary(#fn_name) },
        ),
        [_ctx, param] => {
            let ty = param.ty;
            (
                quote! { #ty },
                quote! { ::praxis::handler::HandlerFn::binary(#fn_name) },
            )
        }
        _ => {
            return syn::Error::new_spanned(
                &sig.inputs,
                "handler accepts at most two parameters: the context and one input",
            )
            .to_compile_error()
            .into()
        }
    };

    let with_input_type = if params.len() == 2 {
        Some(quote! { .with_input_type(::praxis::type_hint!(#input_ty)) })
    } else {
        None
    };

    let parameters = params.iter().map(|param| {
        let name = &param.name;
        let annotation = param.annotation();
        quote! { ::praxis::handler::Parameter::new(#name, ::std::option::Option::Some(#annotation)) }
    });

    let name_str = fn_name.to_string();
    let companion = format_ident!("{}_handler", fn_name);
    let doc = format!("Handler signature generated for [`{}`].", fn_name);

    let expanded = quote! {
        #input

        #[doc = #doc]
        #vis fn #companion() -> ::praxis::handler::HandlerSignature<#input_ty, #output_ty> {
            ::praxis::handler::HandlerSignature::new(#func)
                .named(#name_str)
                .with_parameters(::std::vec![#(#parameters),*])
                #with_input_type
                .with_output_type(::praxis::type_hint!(#output_ty))
                .for_callable(&#fn_name)
        }
    };

    TokenStream::from(expanded)
}
