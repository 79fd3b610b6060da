// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::checksum::{self, ChecksumField};
use crate::Error;
use brikuu_layout::{ImageLayout, RegionPolicy};
use log::{debug as okay, info, trace, warn};
use std::io::Write as _;

macro_rules! error {
    ($failed:ident, $($arg:tt)*) => {
        $failed = true;
        log::error!($($arg)*);
    }
}

/// Initializes a logger that pretty-prints logging from `verify_image`
///
/// Each record is one line of the verify report. `okay!` (debug) marks a
/// region or length check that held and prints as `OKAY`; `error!` marks a
/// violation that makes `verify_image` fail and prints as `ERROR`; `WARN` is
/// used for findings that do not fail verification, such as a missing CRC32
/// field. Info lines are section headings and trace lines (`verbose` only)
/// carry the layout and a hex dump of the header.
pub fn init_verify_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .format(|buf, record| {
            let mut level_style = buf.style();

            level_style.set_color(match record.level() {
                log::Level::Info => env_logger::fmt::Color::Cyan,
                log::Level::Trace => env_logger::fmt::Color::Blue,
                log::Level::Warn => env_logger::fmt::Color::Yellow,
                log::Level::Error => env_logger::fmt::Color::Red,
                log::Level::Debug => env_logger::fmt::Color::Green,
            });

            writeln!(
                buf,
                "{: <5} | {}",
                level_style.value(match record.level() {
                    log::Level::Info | log::Level::Trace => "",
                    log::Level::Warn => "WARN",
                    log::Level::Error => "ERROR",
                    log::Level::Debug => "OKAY",
                }),
                record.args().to_string().replace('\n', "\n      | ")
            )
        })
        .filter(
            None,
            if verbose {
                log::LevelFilter::Trace
            } else {
                log::LevelFilter::Debug
            },
        )
        .init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    /// Consistent CRC32 field in the scan window, if there is one
    pub checksum: Option<ChecksumField>,
}

/// Checks that `degraded` is a valid degradation of `original` under
/// `layout`.
///
/// Every violated property is logged; if any was found this returns
/// [`Error::VerificationFailed`]. The absence of a CRC32 field is reported
/// but is not a failure.
pub fn verify_image(
    original: &[u8],
    degraded: &[u8],
    layout: &ImageLayout,
) -> Result<VerifyReport, Error> {
    let mut failed = false;
    layout.validate()?;

    info!("=== Layout ===");
    trace!("{layout:#x?}");
    if original.len() != degraded.len() {
        error!(
            failed,
            "Image length changed: original is {} bytes, degraded is {} bytes",
            original.len(),
            degraded.len()
        );
    } else {
        okay!("Image length preserved ({} bytes)", degraded.len());
    }

    let Some(regions) = layout.regions(degraded.len()) else {
        error!(
            failed,
            "Degraded image is {} bytes; the layout needs at least {}",
            degraded.len(),
            layout.min_image_len()
        );
        return finish(failed, None);
    };

    info!("=== Regions ===");
    for region in regions {
        let bytes = &degraded[region.range()];
        match region.policy {
            RegionPolicy::Preserve => {
                trace!("header: {}", hex::encode(&bytes[..bytes.len().min(32)]));
                match original.get(region.range()) {
                    Some(expected) if expected == bytes => {
                        okay!("Header {:#x}..{:#x} matches original", region.start, region.end)
                    }
                    Some(expected) => {
                        let first = expected
                            .iter()
                            .zip(bytes)
                            .position(|(a, b)| a != b)
                            .unwrap_or(0);
                        error!(
                            failed,
                            "Header differs from original, first at offset {:#x}",
                            region.start + first
                        );
                    }
                    None => {
                        error!(failed, "Original image is shorter than the header");
                    }
                }
            }
            RegionPolicy::Zero => match bytes.iter().position(|&b| b != 0) {
                None => okay!(
                    "Boot region {:#x}..{:#x} is all zero",
                    region.start,
                    region.end
                ),
                Some(i) => {
                    error!(
                        failed,
                        "Boot region has non-zero byte {:#04x} at offset {:#x}",
                        bytes[i],
                        region.start + i
                    );
                }
            },
            RegionPolicy::Random => {
                if let Some(expected) = original.get(region.range()) {
                    if !bytes.is_empty() && expected == bytes {
                        warn!("Random region is identical to the original");
                    }
                }
                trace!("{} region: {} bytes", region.policy, region.len());
            }
        }
    }

    info!("=== CRC32 ===");
    let found = checksum::locate(degraded, layout.checksum_scan_size);
    match found {
        Some(field) => okay!(
            "CRC32 field at offset 0x{:04X} matches ({:08x})",
            field.offset,
            field.value
        ),
        None => warn!(
            "No CRC32 field in the first {} bytes",
            layout.scan_window(degraded.len()).len()
        ),
    }

    finish(failed, found)
}

fn finish(failed: bool, checksum: Option<ChecksumField>) -> Result<VerifyReport, Error> {
    if failed {
        Err(Error::VerificationFailed)
    } else {
        Ok(VerifyReport { checksum })
    }
}
