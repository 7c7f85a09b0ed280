// SPDX-License-Identifier: GPL-3.0-only

use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn};

pub(crate) fn emit_method_with_caller(
    variable: &str,
    method: &ItemFn,
    connection_name: &str,
    header_name: &str,
) -> TokenStream2 {
    let attrs = &method.attrs;
    let vis = &method.vis;
    let sig = &method.sig;
    let method_name = &sig.ident;
    let original_block = &method.block;

    let variable = Ident::new(variable, Span::call_site());
    let connection_ident = Ident::new(connection_name, Span::call_site());
    let header_ident = Ident::new(header_name, Span::call_site());

    let inputs: Vec<_> = sig.inputs.iter().collect();
    let generics = &sig.generics;
    let output = &sig.output;

    quote! {
        #(#attrs)*
        #[allow(clippy::too_many_arguments)]
        #vis async fn #method_name #generics ( #(#inputs),* ) #output {
            let #variable = match async {
                let __sender = #header_ident
                    .sender()
                    .ok_or_else(|| zbus::fdo::Error::Failed("No sender in message header".to_string()))?
                    .as_str()
                    .to_string();

                let __dbus_proxy = zbus::fdo::DBusProxy::new(#connection_ident).await
                    .map_err(|e| zbus::fdo::Error::Failed(format!("D-Bus connection error: {}", e)))?;

                let __bus_name: zbus::names::BusName = __sender.clone()
                    .try_into()
                    .map_err(|e| zbus::fdo::Error::Failed(format!("Invalid bus name: {}", e)))?;

                let __caller_uid = __dbus_proxy
                    .get_connection_unix_user(__bus_name.clone()).await
                    .map_err(|e| zbus::fdo::Error::Failed(format!("Failed to get caller UID: {}", e)))?;

                let __caller_pid = __dbus_proxy
                    .get_connection_unix_process_id(__bus_name).await
                    .map_err(|e| zbus::fdo::Error::Failed(format!("Failed to get caller PID: {}", e)))?;

                tracing::debug!("Caller {} has UID {} and PID {}", __sender, __caller_uid, __caller_pid);

                Ok::<_, zbus::fdo::Error>(storage_types::CallerInfo::new(
                    __caller_uid,
                    __caller_pid,
                    storage_sys::username_for_uid(__caller_uid),
                    __sender,
                ))
            }
            .await
            {
                Ok(caller) => caller,
                Err(e) => return Err(::core::convert::From::from(e)),
            };

            #original_block
        }
    }
}
