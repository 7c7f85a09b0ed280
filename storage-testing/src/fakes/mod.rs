// SPDX-License-Identifier: GPL-3.0-only

//! In-memory collaborators

mod authority;
mod blocklib;
mod source;

pub use authority::{AuthorityCheck, FakeAuthority};
pub use blocklib::FakeBlockLib;
pub use source::ChannelDeviceSource;
