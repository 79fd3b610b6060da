// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::checksum::{self, ChecksumField};
use crate::transform;
use crate::Error;
use brikuu_layout::ImageLayout;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Directory the degraded image is written to, relative to the working
/// directory
pub const OUTPUT_DIR: &str = "brikuu";

/// File name of the degraded image
pub const OUTPUT_NAME: &str = "resilience_failover_test.dev";

/// Everything a run needs to know, built once at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegradeConfig {
    pub layout: ImageLayout,
    pub output_dir: PathBuf,
    pub output_name: String,
}

impl Default for DegradeConfig {
    fn default() -> Self {
        DegradeConfig {
            layout: ImageLayout::default(),
            output_dir: PathBuf::from(OUTPUT_DIR),
            output_name: OUTPUT_NAME.to_string(),
        }
    }
}

impl DegradeConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegradeReport {
    pub output_path: PathBuf,
    pub size: usize,
    pub checksum: Option<ChecksumField>,
}

/// Degrades the firmware image at `src` and writes the result to
/// `cfg.output_path()`.
///
/// Nothing is written, and the output directory is not created, unless the
/// image was successfully transformed.
pub fn degrade_file(src: &Path, cfg: &DegradeConfig) -> Result<DegradeReport, Error> {
    if !src.is_file() {
        return Err(Error::InputNotFound(src.to_path_buf()));
    }

    info!("Reading original firmware");
    let original = std::fs::read(src)?;
    debug!("read {} bytes from {}", original.len(), src.display());

    let mut image = transform::transform(&original, &cfg.layout)?;
    let checksum = checksum::locate_and_patch(&mut image, cfg.layout.checksum_scan_size);

    std::fs::create_dir_all(&cfg.output_dir)?;
    let output_path = cfg.output_path();
    std::fs::write(&output_path, &image)?;
    debug!("wrote {} bytes to {}", image.len(), output_path.display());

    Ok(DegradeReport {
        output_path,
        size: image.len(),
        checksum,
    })
}
