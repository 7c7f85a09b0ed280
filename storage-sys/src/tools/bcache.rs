// SPDX-License-Identifier: GPL-3.0-only

//! bcache devices through `make-bcache` and `/sys/block/bcacheN/bcache`

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use storage_types::BcacheStats;
use tracing::debug;

use super::{device_name, read_attribute, read_u64_attribute, selected_choice};
use crate::command::run;
use crate::{Result, SysError};

const SYS_BLOCK: &str = "/sys/block";
const REGISTER_POLL_INTERVAL: Duration = Duration::from_millis(100);
const REGISTER_POLL_ATTEMPTS: u32 = 50;

/// Parse bcache's human-readable sizes (`512`, `4.0k`, `1.5M`)
pub(crate) fn parse_human_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (number, multiplier) = match value.chars().last()? {
        'k' | 'K' => (&value[..value.len() - 1], 1u64 << 10),
        'M' => (&value[..value.len() - 1], 1 << 20),
        'G' => (&value[..value.len() - 1], 1 << 30),
        'T' => (&value[..value.len() - 1], 1 << 40),
        _ => (value, 1),
    };
    let number: f64 = number.parse().ok()?;
    Some((number * multiplier as f64) as u64)
}

pub fn stats(device: &str) -> Result<BcacheStats> {
    read_stats(&Path::new(SYS_BLOCK).join(device_name(device)))
}

pub(crate) fn read_stats(dir: &Path) -> Result<BcacheStats> {
    let bcache = dir.join("bcache");
    let totals = bcache.join("stats_total");
    let cache = bcache.join("cache");

    let mode = read_attribute(&bcache.join("cache_mode"))?;
    let cache_size = read_u64_attribute(&cache.join("cache0").join("nbuckets"))
        .ok()
        .zip(
            read_attribute(&cache.join("bucket_size"))
                .ok()
                .and_then(|size| parse_human_size(&size)),
        )
        .map(|(buckets, bucket_size)| buckets * bucket_size)
        .unwrap_or(0);
    let available_percent = read_u64_attribute(&cache.join("cache_available_percent"))
        .unwrap_or(100)
        .min(100);

    Ok(BcacheStats {
        state: read_attribute(&bcache.join("state"))?,
        mode: selected_choice(&mode).unwrap_or(&mode).to_string(),
        block_size: read_u64_attribute(&dir.join("queue").join("logical_block_size"))
            .unwrap_or(512),
        cache_size,
        cache_used: cache_size * (100 - available_percent) / 100,
        hits: read_u64_attribute(&totals.join("cache_hits")).unwrap_or(0),
        misses: read_u64_attribute(&totals.join("cache_misses")).unwrap_or(0),
        bypass_hits: read_u64_attribute(&totals.join("cache_bypass_hits")).unwrap_or(0),
        bypass_misses: read_u64_attribute(&totals.join("cache_bypass_misses")).unwrap_or(0),
    })
}

/// Format `cache_device` as cache for `backing_device` and return the new `/dev/bcacheN`
pub fn create(backing_device: &str, cache_device: &str) -> Result<String> {
    if !cfg!(feature = "bcache-tools") {
        return Err(SysError::Disabled("bcache"));
    }

    run("make-bcache", &["-B", backing_device, "-C", cache_device])?;

    // Registration is asynchronous: wait for the backing device to grow a bcache link
    let link = Path::new(SYS_BLOCK)
        .join(device_name(backing_device))
        .join("bcache")
        .join("dev");
    for _ in 0..REGISTER_POLL_ATTEMPTS {
        if let Ok(target) = fs::read_link(&link)
            && let Some(name) = target.file_name()
        {
            let device = format!("/dev/{}", name.to_string_lossy());
            debug!("{backing_device} registered as {device}");
            return Ok(device);
        }
        thread::sleep(REGISTER_POLL_INTERVAL);
    }

    Err(SysError::OperationFailed(format!(
        "{backing_device} did not register as a bcache device"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(parse_human_size("512"), Some(512));
        assert_eq!(parse_human_size("4.0k"), Some(4096));
        assert_eq!(parse_human_size("1.5M"), Some(3 << 19));
        assert_eq!(parse_human_size("lots"), None);
    }

    #[test]
    fn reads_bcache_statistics() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("bcache0");
        let write = |relative: &str, contents: &str| {
            let path = dir.join(relative);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, contents).expect("write");
        };
        write("bcache/state", "clean\n");
        write("bcache/cache_mode", "writethrough [writeback] writearound none\n");
        write("bcache/stats_total/cache_hits", "90\n");
        write("bcache/stats_total/cache_misses", "10\n");
        write("bcache/cache/bucket_size", "512.0k\n");
        write("bcache/cache/cache0/nbuckets", "1024\n");
        write("bcache/cache/cache_available_percent", "75\n");
        write("queue/logical_block_size", "4096\n");

        let stats = read_stats(&dir).expect("stats");

        assert_eq!(stats.state, "clean");
        assert_eq!(stats.mode, "writeback");
        assert_eq!(stats.block_size, 4096);
        assert_eq!(stats.cache_size, 512 << 20);
        assert_eq!(stats.cache_used, 128 << 20);
        assert_eq!(stats.hits, 90);
        assert_eq!(stats.bypass_hits, 0);
    }
}
