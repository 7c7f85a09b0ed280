// SPDX-License-Identifier: GPL-3.0-only

pub mod client;
pub mod protocol;
pub mod traits;

pub use protocol::{IscsiErrorKind, StorageError, StorageErrorKind, wire};
pub use traits::{
    Authority, AuthorizationResult, BcacheOps, BlockLib, BtrfsOps, DeviceSource, IscsiOps,
    LoopOps, LvmOps, VdoOps, ZramOps,
};

/// Well-known bus name of the daemon
pub const BUS_NAME: &str = "org.storaged.Storaged";

/// Prefix shared by every exported interface name
pub const INTERFACE_PREFIX: &str = "org.storaged.Storaged";
