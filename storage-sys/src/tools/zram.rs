// SPDX-License-Identifier: GPL-3.0-only

//! zram devices through the kernel module and its sysfs knobs

use std::fs;
use std::path::Path;

use storage_types::ZramStats;
use tracing::{debug, info};

use super::{read_attribute, read_u64_attribute, selected_choice};
use crate::command::run;
use crate::{Result, SysError};

const SYS_BLOCK: &str = "/sys/block";
const PROC_SWAPS: &str = "/proc/swaps";

/// Load the zram module with one device per size and configure each device
pub fn create_devices(sizes: &[u64], num_streams: &[u64]) -> Result<()> {
    if !cfg!(feature = "zram-tools") {
        return Err(SysError::Disabled("zram"));
    }
    if sizes.is_empty() {
        return Err(SysError::OperationFailed(
            "At least one device size is required".to_string(),
        ));
    }
    if !num_streams.is_empty() && num_streams.len() != sizes.len() {
        return Err(SysError::OperationFailed(format!(
            "Got {} sizes but {} stream counts",
            sizes.len(),
            num_streams.len()
        )));
    }

    let num_devices = format!("num_devices={}", sizes.len());
    run("modprobe", &["zram", &num_devices])?;
    configure_devices(Path::new(SYS_BLOCK), sizes, num_streams)?;
    info!("Created {} zram devices", sizes.len());
    Ok(())
}

/// Write stream counts and disk sizes for `zram0..N-1` below `sys_block`
pub(crate) fn configure_devices(sys_block: &Path, sizes: &[u64], num_streams: &[u64]) -> Result<()> {
    for (index, size) in sizes.iter().enumerate() {
        let dir = sys_block.join(format!("zram{index}"));
        if !dir.exists() {
            return Err(SysError::DeviceNotFound(format!("zram{index}")));
        }
        // Stream count must be set before disksize initialises the device
        if let Some(streams) = num_streams.get(index).filter(|streams| **streams > 0) {
            fs::write(dir.join("max_comp_streams"), streams.to_string())?;
        }
        fs::write(dir.join("disksize"), size.to_string())?;
        debug!("Configured zram{index} with {size} bytes");
    }
    Ok(())
}

/// Reset every zram device and unload the module
pub fn destroy_devices() -> Result<()> {
    if !cfg!(feature = "zram-tools") {
        return Err(SysError::Disabled("zram"));
    }

    for entry in fs::read_dir(SYS_BLOCK)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with("zram") {
            fs::write(entry.path().join("reset"), "1")?;
        }
    }
    run("modprobe", &["-r", "zram"])
}

pub fn stats(device: &str) -> Result<ZramStats> {
    let name = super::device_name(device);
    let swaps = fs::read_to_string(PROC_SWAPS).unwrap_or_default();
    read_stats(&Path::new(SYS_BLOCK).join(name), &format!("/dev/{name}"), &swaps)
}

pub(crate) fn read_stats(dir: &Path, device_file: &str, swaps: &str) -> Result<ZramStats> {
    // mm_stat: orig_data_size compr_data_size mem_used_total ...
    let mm_stat: Vec<u64> = read_attribute(&dir.join("mm_stat"))?
        .split_whitespace()
        .filter_map(|value| value.parse().ok())
        .collect();
    // stat: read I/Os, read merges, read sectors, read ticks, write I/Os, ...
    let io_stat: Vec<u64> = read_attribute(&dir.join("stat"))?
        .split_whitespace()
        .filter_map(|value| value.parse().ok())
        .collect();
    let comp_algorithm = read_attribute(&dir.join("comp_algorithm"))?;

    Ok(ZramStats {
        disksize: read_u64_attribute(&dir.join("disksize"))?,
        num_reads: io_stat.first().copied().unwrap_or(0),
        num_writes: io_stat.get(4).copied().unwrap_or(0),
        comp_algorithm: selected_choice(&comp_algorithm)
            .unwrap_or(&comp_algorithm)
            .to_string(),
        max_comp_streams: read_u64_attribute(&dir.join("max_comp_streams")).unwrap_or(0),
        orig_data_size: mm_stat.first().copied().unwrap_or(0),
        compr_data_size: mm_stat.get(1).copied().unwrap_or(0),
        mem_used_total: mm_stat.get(2).copied().unwrap_or(0),
        active: swaps
            .lines()
            .skip(1)
            .any(|line| line.split_whitespace().next() == Some(device_file)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zram_dir(root: &Path, name: &str) -> std::path::PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn configures_streams_before_size() {
        let root = tempfile::tempdir().expect("tempdir");
        let zram0 = zram_dir(root.path(), "zram0");
        let zram1 = zram_dir(root.path(), "zram1");

        configure_devices(root.path(), &[64 << 20, 128 << 20], &[4, 0]).expect("configure");

        assert_eq!(fs::read_to_string(zram0.join("disksize")).expect("read"), "67108864");
        assert_eq!(fs::read_to_string(zram0.join("max_comp_streams")).expect("read"), "4");
        assert_eq!(fs::read_to_string(zram1.join("disksize")).expect("read"), "134217728");
        assert!(!zram1.join("max_comp_streams").exists());
    }

    #[test]
    fn missing_device_directory_is_reported() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = configure_devices(root.path(), &[1024], &[]).unwrap_err();
        assert!(matches!(err, SysError::DeviceNotFound(name) if name == "zram0"));
    }

    #[test]
    fn reads_statistics_and_swap_state() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = zram_dir(root.path(), "zram0");
        fs::write(dir.join("disksize"), "67108864\n").expect("write");
        fs::write(dir.join("mm_stat"), "4096 1024 8192 0 8192 0 0 0 0\n").expect("write");
        fs::write(dir.join("stat"), "12 0 96 0 34 0 272 0 0 0 0 0 0 0 0 0 0\n").expect("write");
        fs::write(dir.join("comp_algorithm"), "lzo lzo-rle [zstd]\n").expect("write");
        fs::write(dir.join("max_comp_streams"), "4\n").expect("write");
        let swaps = "Filename\tType\tSize\tUsed\tPriority\n/dev/zram0 partition 65532 0 100\n";

        let stats = read_stats(&dir, "/dev/zram0", swaps).expect("stats");

        assert_eq!(stats.disksize, 64 << 20);
        assert_eq!(stats.num_reads, 12);
        assert_eq!(stats.num_writes, 34);
        assert_eq!(stats.comp_algorithm, "zstd");
        assert_eq!(stats.orig_data_size, 4096);
        assert_eq!(stats.compr_data_size, 1024);
        assert_eq!(stats.mem_used_total, 8192);
        assert!(stats.active);
    }
}
