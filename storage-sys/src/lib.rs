// SPDX-License-Identifier: GPL-3.0-only

//! Low-level host access for storaged
//!
//! This crate talks to the kernel and to command-line tools directly:
//! - sysfs and udev database device enumeration
//! - the udev netlink event monitor
//! - atomic configuration file writes
//! - wrappers around `btrfs`, `lvm`, `make-bcache`, `vdo`, `iscsiadm`, `losetup`
//!
//! Most operations require elevated privileges and should only be called
//! from the daemon.

pub mod command;
pub mod config_files;
pub mod error;
pub mod sysfs;
pub mod tools;
pub mod uevent_monitor;
pub mod unix_user;

pub use config_files::{remove_if_exists, write_atomic};
pub use error::{Result, SysError};
pub use sysfs::SysfsDeviceSource;
pub use uevent_monitor::UeventMonitor;
pub use unix_user::username_for_uid;
