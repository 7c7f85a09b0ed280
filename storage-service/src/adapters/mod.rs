// SPDX-License-Identifier: GPL-3.0-only

//! Concrete collaborators the daemon runs with

pub mod tools;

pub use tools::ToolsBlockLib;
