// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod checksum;
pub mod degrade;
pub mod transform;
pub mod verify;

pub use brikuu_layout::ImageLayout;
pub use checksum::ChecksumField;
pub use degrade::{degrade_file, DegradeConfig, DegradeReport};

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("input file not found: {0:?}")]
    InputNotFound(PathBuf),

    #[error("firmware too small ({actual} bytes) for nullification region; need at least {required} bytes")]
    InsufficientSize { actual: usize, required: usize },

    #[error("invalid image layout: {0}")]
    Layout(#[from] brikuu_layout::LayoutError),

    #[error("verification failed; see log for details")]
    VerificationFailed,

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
