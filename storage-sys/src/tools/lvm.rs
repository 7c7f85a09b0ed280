// SPDX-License-Identifier: GPL-3.0-only

//! LVM2 queries through the JSON report format of `pvs`/`vgs`

use serde::Deserialize;
use storage_types::{PhysicalVolumeInfo, VolumeGroupInfo};

use crate::command::{run, run_capture};
use crate::{Result, SysError};

#[derive(Debug, Deserialize)]
struct Report<T> {
    report: Vec<ReportSection<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ReportSection<T> {
    #[serde(default, alias = "pv", alias = "vg")]
    rows: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PvRow {
    pv_name: String,
    #[serde(default)]
    vg_name: String,
    #[serde(default)]
    vg_uuid: String,
}

#[derive(Debug, Deserialize)]
struct VgRow {
    vg_name: String,
    vg_uuid: String,
    vg_size: String,
    vg_free: String,
    pv_count: String,
    lv_count: String,
}

fn rows<T: for<'de> Deserialize<'de>>(output: &str, what: &str) -> Result<Vec<T>> {
    let report: Report<T> =
        serde_json::from_str(output).map_err(|e| SysError::parse(what, e.to_string()))?;
    Ok(report
        .report
        .into_iter()
        .flat_map(|section| section.rows)
        .collect())
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SysError::parse(what, value.to_string()))
}

fn parse_pvs(output: &str) -> Result<Vec<PhysicalVolumeInfo>> {
    Ok(rows::<PvRow>(output, "pvs report")?
        .into_iter()
        .map(|row| PhysicalVolumeInfo {
            device: row.pv_name,
            vg_name: non_empty(row.vg_name),
            vg_uuid: non_empty(row.vg_uuid),
        })
        .collect())
}

fn parse_vgs(output: &str) -> Result<Vec<VolumeGroupInfo>> {
    rows::<VgRow>(output, "vgs report")?
        .into_iter()
        .map(|row| {
            Ok(VolumeGroupInfo {
                size: number(&row.vg_size, "vg_size")?,
                free: number(&row.vg_free, "vg_free")?,
                pv_count: number(&row.pv_count, "pv_count")?,
                lv_count: number(&row.lv_count, "lv_count")?,
                name: row.vg_name,
                uuid: row.vg_uuid,
            })
        })
        .collect()
}

const REPORT_ARGS: [&str; 5] = ["--reportformat", "json", "--units", "b", "--nosuffix"];

fn ensure_enabled() -> Result<()> {
    if cfg!(feature = "lvm-tools") {
        Ok(())
    } else {
        Err(SysError::Disabled("lvm2"))
    }
}

pub fn pv_info(device: &str) -> Result<PhysicalVolumeInfo> {
    ensure_enabled()?;
    let mut args = REPORT_ARGS.to_vec();
    args.extend(["-o", "pv_name,vg_name,vg_uuid", device]);
    parse_pvs(&run_capture("pvs", &args)?)?
        .into_iter()
        .next()
        .ok_or_else(|| SysError::DeviceNotFound(device.to_string()))
}

pub fn vg_info(vg_name: &str) -> Result<VolumeGroupInfo> {
    ensure_enabled()?;
    let mut args = REPORT_ARGS.to_vec();
    args.extend([
        "-o",
        "vg_name,vg_uuid,vg_size,vg_free,pv_count,lv_count",
        vg_name,
    ]);
    parse_vgs(&run_capture("vgs", &args)?)?
        .into_iter()
        .next()
        .ok_or_else(|| SysError::DeviceNotFound(vg_name.to_string()))
}

pub fn vg_create(vg_name: &str, devices: &[String]) -> Result<()> {
    ensure_enabled()?;
    if devices.is_empty() {
        return Err(SysError::OperationFailed(
            "A volume group needs at least one physical volume".to_string(),
        ));
    }
    let mut args = vec![vg_name];
    args.extend(devices.iter().map(String::as_str));
    run("vgcreate", &args)
}
