// SPDX-License-Identifier: GPL-3.0-only

//! Canonical data types for the storaged daemon
//!
//! This crate holds the plain data that crosses crate boundaries:
//!
//! - **storage-sys** builds [`Device`] snapshots from sysfs and the udev database
//! - **storage-service** routes [`Uevent`]s to modules and exports objects under
//!   [`ObjectPath`]s carrying [`PropertyBag`]s
//! - **storage-cli** renders the same property bags for humans
//!
//! Nothing in here knows about D-Bus; the service converts property values to
//! wire variants at the edge.

pub mod bcache;
pub mod btrfs;
pub mod caller;
pub mod common;
pub mod device;
pub mod iscsi;
pub mod loop_device;
pub mod lvm;
pub mod object_path;
pub mod options;
pub mod property;
pub mod uevent;
pub mod vdo;
pub mod zram;

pub use bcache::BcacheStats;
pub use btrfs::{BtrfsInfo, BtrfsRaidLevel};
pub use caller::CallerInfo;
pub use common::bytes_to_pretty;
pub use device::{Device, DeviceBuilder};
pub use iscsi::{IscsiNode, IscsiSessionInfo, session_id_from_syspath};
pub use loop_device::LoopInfo;
pub use lvm::{PhysicalVolumeInfo, VolumeGroupInfo, split_dm_name};
pub use object_path::{InvalidObjectPath, OBJECT_ROOT, ObjectPath, escape_segment};
pub use options::{OptionBag, OptionError, OptionValue, known_options};
pub use property::{PropertyBag, PropertyValue, property_delta};
pub use uevent::{ParseActionError, Uevent, UeventAction};
pub use vdo::VdoInfo;
pub use zram::{
    ZRAM_CONF_NAME, ZramDeviceConfig, ZramStats, modprobe_options, modules_load_directive,
};
