// SPDX-License-Identifier: GPL-3.0-only

//! Procedural macros for storaged D-Bus methods
//!
//! `#[with_caller]` resolves the peer that sent a method call into a
//! `storage_types::CallerInfo` before the method body runs, so the body can
//! hand it to the authorization layer.
//!
//! # Usage
//!
//! The method MUST be async and have `#[zbus(connection)]` and
//! `#[zbus(header)]` parameters. Its error type must implement
//! `From<zbus::fdo::Error>`:
//!
//! ```rust,ignore
//! #[interface(name = "org.storaged.Storaged.Manager.ZRAM")]
//! impl ZramManager {
//!     #[with_caller]
//!     async fn create_devices(
//!         &self,
//!         #[zbus(connection)] connection: &Connection,
//!         #[zbus(header)] header: Header<'_>,
//!         sizes: Vec<u64>,
//!     ) -> Result<Vec<OwnedObjectPath>, WireError> {
//!         tracing::info!("Creating zram devices for UID {}", caller.uid);
//!     }
//! }
//! ```
//!
//! `#[with_caller(name = "requester")]` binds the variable under another name.

mod emit;
mod parse;
mod transform;

use proc_macro::TokenStream;
use syn::{ItemFn, parse_macro_input};

use parse::WithCallerArgs;
use transform::transform_method;

/// Bind `caller: CallerInfo` (uid, pid, username and unique bus name of the
/// sender) at the top of a D-Bus method body.
#[proc_macro_attribute]
pub fn with_caller(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as WithCallerArgs);
    let method = parse_macro_input!(item as ItemFn);

    transform_method(&args.name, &method).into()
}
