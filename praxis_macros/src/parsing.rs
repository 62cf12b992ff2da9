//! Attribute parsing and signature analysis.
//!
//! This module hides how `#[schema(...)]` arguments are parsed and how
//! handler signatures are taken apart (parameter names, the `Ok` type of
//! the returned `Result`).

use quote::quote;
use syn::{Attribute, FnArg, GenericArgument, Pat, PathArguments, ReturnType, Type};

/// Arguments of the `#[schema(...)]` helper attribute.
#[derive(Default)]
pub(crate) struct SchemaArgs {
    /// Overrides the schema name; defaults to the type name.
    pub name: Option<String>,
    /// Path to a `fn(&Self) -> Result<(), String>` run after decoding.
    pub validate: Option<syn::Path>,
}

impl SchemaArgs {
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut args = Self::default();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("schema")) {
            attr.parse_nested_meta(|meta| args.parse_meta(meta))?;
        }
        Ok(args)
    }

    fn parse_meta(&mut self, meta: syn::meta::ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            self.name = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            Ok(())
        } else if meta.path.is_ident("validate") {
            self.validate = Some(meta.value()?.parse::<syn::Path>()?);
            Ok(())
        } else {
            Err(meta.error("expected `name` or `validate`"))
        }
    }
}

/// The `T` of a `Result<T, E>` return type, if the function returns one.
pub(crate) fn result_ok_type(return_type: &ReturnType) -> Option<&Type> {
    match return_type {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => result_ok_type_inner(ty),
    }
}

fn result_ok_type_inner(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Path(type_path) => {
            // Match both "Result" and full paths like "std::result::Result"
            let segment = type_path.path.segments.last()?;
            if segment.ident != "Result" {
                return None;
            }
            match &segment.arguments {
                PathArguments::AngleBracketed(args) => {
                    args.args.iter().find_map(|arg| match arg {
                        GenericArgument::Type(ty) => Some(ty),
                        _ => None,
                    })
                }
                _ => None,
            }
        }
        Type::Paren(paren) => result_ok_type_inner(&paren.elem),
        Type::Group(group) => result_ok_type_inner(&group.elem),
        _ => None,
    }
}

/// A typed function parameter, reduced to what handler registration needs.
pub(crate) struct HandlerParam<'a> {
    pub name: String,
    pub ty: &'a Type,
}

impl HandlerParam<'_> {
    /// The declared type as written, without whitespace.
    pub fn annotation(&self) -> String {
        let ty = self.ty;
        quote!(#ty).to_string().replace(' ', "")
    }
}

/// Typed parameters of a function; `None` if it takes `self`.
pub(crate) fn handler_params<'a>(
    inputs: impl IntoIterator<Item = &'a FnArg>,
) -> Option<Vec<HandlerParam<'a>>> {
    inputs
        .into_iter()
        .map(|arg| match arg {
            FnArg::Receiver(_) => None,
            FnArg::Typed(pat_type) => Some(HandlerParam {
                name: param_name(&pat_type.pat),
                ty: &pat_type.ty,
            }),
        })
        .collect()
}

fn param_name(pat: &Pat) -> String {
    match pat {
        Pat::Ident(ident) => ident.ident.to_string(),
        _ => "_".to_string(),
    }
}
