// SPDX-License-Identifier: GPL-3.0-only

//! Test bench for the storaged core
//!
//! [`harness::TestDaemon`] assembles a daemon over in-memory collaborators:
//! a device source fed through a channel, a block library whose state tests
//! edit directly, and an authority with a fixed verdict. Scenarios live under
//! `tests/`.

pub mod errors;
pub mod fakes;
pub mod fixtures;
pub mod harness;
pub mod probe;
pub mod recorder;

pub use errors::{Result, TestingError};
pub use harness::{RunningTestDaemon, TestDaemon};
pub use recorder::Recorder;
