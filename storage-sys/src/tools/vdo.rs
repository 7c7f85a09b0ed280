// SPDX-License-Identifier: GPL-3.0-only

//! VDO volume status from `vdo status`

use storage_types::VdoInfo;

use crate::command::run_capture;
use crate::{Result, SysError};

/// Lower-cased `key: value` pairs from the YAML-ish status document
fn status_fields(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

fn parse_status(name: &str, output: &str) -> Result<VdoInfo> {
    let fields = status_fields(output);
    let field = |key: &str| {
        fields
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    };
    let size = |key: &str| -> Result<u64> {
        match field(key) {
            Some(value) => value
                .trim_end_matches(['B', 'b'])
                .trim()
                .parse()
                .map_err(|_| SysError::parse(key, value)),
            None => Ok(0),
        }
    };
    let enabled = |key: &str| field(key).is_some_and(|value| value.eq_ignore_ascii_case("enabled"));
    let block_size = size("block size")?.max(1);

    Ok(VdoInfo {
        name: name.to_string(),
        operating_mode: field("operating mode").unwrap_or("unknown").to_string(),
        compression_state: field("compression state")
            .or_else(|| field("compression"))
            .unwrap_or("unknown")
            .to_string(),
        index_state: field("index status").unwrap_or("unknown").to_string(),
        used_size: size("data blocks used")? * block_size,
        logical_size: size("logical size")?,
        physical_size: size("physical size")?,
        compression: enabled("compression"),
        deduplication: enabled("deduplication"),
    })
}

pub fn info(name: &str) -> Result<VdoInfo> {
    if !cfg!(feature = "vdo-tools") {
        return Err(SysError::Disabled("vdo"));
    }
    let name_arg = format!("--name={name}");
    parse_status(name, &run_capture("vdo", &["status", &name_arg])?)
}
