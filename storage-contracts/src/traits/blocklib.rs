// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use crate::traits::{BcacheOps, BtrfsOps, IscsiOps, LoopOps, LvmOps, VdoOps, ZramOps};

/// The block-device library, one adapter per technology.
///
/// Every call may block on I/O: request tasks run them on the blocking pool,
/// and interface updates only use the cheap query calls.
#[derive(Clone)]
pub struct BlockLib {
    pub btrfs: Arc<dyn BtrfsOps>,
    pub zram: Arc<dyn ZramOps>,
    pub lvm: Arc<dyn LvmOps>,
    pub bcache: Arc<dyn BcacheOps>,
    pub vdo: Arc<dyn VdoOps>,
    pub iscsi: Arc<dyn IscsiOps>,
    pub loops: Arc<dyn LoopOps>,
}
