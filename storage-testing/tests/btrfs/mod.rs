// SPDX-License-Identifier: GPL-3.0-only

pub mod appear_disappear;
pub mod create_volume;
pub mod presence_flip;
