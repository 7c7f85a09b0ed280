// SPDX-License-Identifier: GPL-3.0-only

//! Formatting helpers shared by the daemon logs and the CLI

use num_format::{Locale, ToFormattedString};

/// Convert bytes to human-readable format (e.g., "1.50 GB")
pub fn bytes_to_pretty(bytes: u64, add_bytes: bool) -> String {
    const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

    let mut steps = 0;
    let mut val = bytes as f64;
    while val > 1024. && steps < UNITS.len() - 1 {
        val /= 1024.;
        steps += 1;
    }

    if add_bytes {
        format!(
            "{:.2} {} ({} bytes)",
            val,
            UNITS[steps],
            bytes.to_formatted_string(&Locale::en)
        )
    } else {
        format!("{:.2} {}", val, UNITS[steps])
    }
}

#[cfg(test)]
mod tests {
    use super::bytes_to_pretty;

    #[test]
    fn small_values_stay_in_bytes() {
        assert_eq!(bytes_to_pretty(512, false), "512.00 B");
    }

    #[test]
    fn gigabytes_include_grouped_byte_count() {
        assert_eq!(
            bytes_to_pretty(64 * 1024 * 1024, true),
            "64.00 MB (67,108,864 bytes)"
        );
    }
}
