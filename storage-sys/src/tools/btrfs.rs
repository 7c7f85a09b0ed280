// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{BtrfsInfo, BtrfsRaidLevel};

use crate::command::{parse_first_u64, run, run_capture};
use crate::{Result, SysError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct BtrfsShow {
    label: Option<String>,
    uuid: String,
    total_devices: u64,
    used_bytes: u64,
}

fn parse_btrfs_show(output: &str) -> Vec<BtrfsShow> {
    let mut filesystems = Vec::new();
    let mut current: Option<BtrfsShow> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("Label:") {
            if let Some(previous) = current.take() {
                filesystems.push(previous);
            }

            let label = line
                .split("Label:")
                .nth(1)
                .and_then(|rest| rest.split("uuid:").next())
                .map(str::trim)
                .map(|value| value.trim_matches('\''))
                .filter(|value| !value.is_empty() && *value != "none")
                .map(ToString::to_string);

            let uuid = line
                .split("uuid:")
                .nth(1)
                .map(str::trim)
                .unwrap_or_default()
                .to_string();

            current = Some(BtrfsShow {
                label,
                uuid,
                total_devices: 0,
                used_bytes: 0,
            });
            continue;
        }

        if let Some(current_fs) = current.as_mut()
            && line.starts_with("Total devices")
        {
            current_fs.total_devices = parse_first_u64(line).unwrap_or(0);
            if let Some(used_fragment) = line.split("FS bytes used").nth(1) {
                current_fs.used_bytes = parse_first_u64(used_fragment).unwrap_or(0);
            }
        }
    }

    if let Some(last) = current {
        filesystems.push(last);
    }

    filesystems
}

/// Label, UUID and usage of the filesystem containing `device`
pub fn filesystem_info(device: &str) -> Result<BtrfsInfo> {
    if !cfg!(feature = "btrfs-tools") {
        return Err(SysError::Disabled("btrfs"));
    }

    let output = run_capture("btrfs", &["filesystem", "show", "--raw", device])?;
    let show = parse_btrfs_show(&output)
        .into_iter()
        .next()
        .ok_or_else(|| SysError::parse("btrfs filesystem show", format!("no filesystem on {device}")))?;

    Ok(BtrfsInfo {
        label: show.label.unwrap_or_default(),
        uuid: show.uuid,
        num_devices: show.total_devices,
        used: show.used_bytes,
    })
}

/// Arguments for `mkfs.btrfs`
fn mkfs_args<'a>(
    devices: &'a [String],
    label: Option<&'a str>,
    data_level: Option<BtrfsRaidLevel>,
    md_level: Option<BtrfsRaidLevel>,
) -> Vec<&'a str> {
    let mut args = Vec::new();
    if let Some(label) = label {
        args.extend(["-L", label]);
    }
    if let Some(level) = data_level {
        args.extend(["-d", level.as_str()]);
    }
    if let Some(level) = md_level {
        args.extend(["-m", level.as_str()]);
    }
    args.extend(devices.iter().map(String::as_str));
    args
}

pub fn create_volume(
    devices: &[String],
    label: Option<&str>,
    data_level: Option<BtrfsRaidLevel>,
    md_level: Option<BtrfsRaidLevel>,
) -> Result<()> {
    if !cfg!(feature = "btrfs-tools") {
        return Err(SysError::Disabled("btrfs"));
    }
    if devices.is_empty() {
        return Err(SysError::OperationFailed(
            "At least one device is required".to_string(),
        ));
    }

    run("mkfs.btrfs", &mkfs_args(devices, label, data_level, md_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_btrfs_show_output() {
        let parsed = parse_btrfs_show(
            "Label: 'rootfs'  uuid: 1111-2222\n\tTotal devices 2 FS bytes used 1024\n\tdevid    1 size 4096 used 1024 path /dev/sda2\n\tdevid    2 size 4096 used 0 path /dev/sdb2\n",
        );

        assert_eq!(
            parsed,
            vec![BtrfsShow {
                label: Some("rootfs".to_string()),
                uuid: "1111-2222".to_string(),
                total_devices: 2,
                used_bytes: 1024,
            }]
        );
    }

    #[test]
    fn unlabeled_filesystem_has_no_label() {
        let parsed = parse_btrfs_show("Label: none  uuid: abcd\n\tTotal devices 1 FS bytes used 0\n");
        assert_eq!(parsed[0].label, None);
    }

    #[test]
    fn mkfs_arguments_follow_requested_levels() {
        let devices = vec!["/dev/sdb".to_string(), "/dev/sdc".to_string()];
        let args = mkfs_args(
            &devices,
            Some("pool"),
            Some(BtrfsRaidLevel::Raid1),
            None,
        );
        assert_eq!(args, ["-L", "pool", "-d", "raid1", "/dev/sdb", "/dev/sdc"]);
    }
}
