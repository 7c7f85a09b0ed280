// SPDX-License-Identifier: GPL-3.0-only

pub mod errors;
pub mod wire;

pub use errors::{IscsiErrorKind, StorageError, StorageErrorKind};
