// SPDX-License-Identifier: GPL-3.0-only

pub mod loop_pool;
pub mod release;
pub mod retained;
pub mod volume_group;
