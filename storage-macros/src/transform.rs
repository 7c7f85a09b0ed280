// SPDX-License-Identifier: GPL-3.0-only

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{FnArg, ItemFn, Pat};

use crate::emit::emit_method_with_caller;

/// Name of the parameter tagged `#[zbus(<role>)]`, or conventionally named after it
fn find_parameter(method: &ItemFn, role: &str) -> Option<String> {
    method.sig.inputs.iter().find_map(|arg| {
        let FnArg::Typed(pat_type) = arg else {
            return None;
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return None;
        };
        let param_name = pat_ident.ident.to_string();

        let tagged = pat_type.attrs.iter().any(|attr| {
            attr.path().is_ident("zbus")
                && matches!(&attr.meta, syn::Meta::List(list) if list.tokens.to_string() == role)
        });
        let conventional = param_name.trim_start_matches('_') == role;

        (tagged || conventional).then_some(param_name)
    })
}

pub(crate) fn transform_method(variable: &str, method: &ItemFn) -> TokenStream2 {
    if method.sig.asyncness.is_none() {
        return quote! {
            compile_error!("#[with_caller] only supports async methods");
        };
    }

    match (
        find_parameter(method, "connection"),
        find_parameter(method, "header"),
    ) {
        (Some(connection), Some(header)) => {
            emit_method_with_caller(variable, method, &connection, &header)
        }
        _ => quote! {
            compile_error!("#[with_caller] requires #[zbus(connection)] and #[zbus(header)] parameters");
        },
    }
}
