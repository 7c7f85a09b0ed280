// SPDX-License-Identifier: GPL-3.0-only

pub mod authority;
pub mod bcache;
pub mod blocklib;
pub mod btrfs;
pub mod device_source;
pub mod iscsi;
pub mod loop_device;
pub mod lvm;
pub mod vdo;
pub mod zram;

pub use authority::{Authority, AuthorizationResult};
pub use bcache::BcacheOps;
pub use blocklib::BlockLib;
pub use btrfs::BtrfsOps;
pub use device_source::DeviceSource;
pub use iscsi::IscsiOps;
pub use loop_device::LoopOps;
pub use lvm::LvmOps;
pub use vdo::VdoOps;
pub use zram::ZramOps;
