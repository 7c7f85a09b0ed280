// SPDX-License-Identifier: GPL-3.0-only

//! Loop device state from `/sys/block/loopN/loop`

use std::path::Path;

use storage_types::LoopInfo;

use super::{device_name, read_attribute};
use crate::Result;

const SYS_BLOCK: &str = "/sys/block";

pub fn info(device: &str) -> Result<LoopInfo> {
    read_info(Path::new(SYS_BLOCK), device)
}

pub(crate) fn read_info(sys_block: &Path, device: &str) -> Result<LoopInfo> {
    let name = device_name(device);
    let loop_dir = sys_block.join(name).join("loop");
    // Unbound loop devices have no `loop` directory
    let backing_file = read_attribute(&loop_dir.join("backing_file"))
        .ok()
        .filter(|file| !file.is_empty());
    let autoclear = read_attribute(&loop_dir.join("autoclear")).is_ok_and(|value| value == "1");

    Ok(LoopInfo {
        device: format!("/dev/{name}"),
        backing_file,
        autoclear,
    })
}
