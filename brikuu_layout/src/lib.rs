// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Region layout of a degraded firmware image
//!
//! A degraded image is split into three contiguous regions, in offset order:
//!
//! ```text
//! 0x00000 +------------------+
//!         | header (kept)    |
//! 0x00200 +------------------+
//!         | boot region (0)  |
//! 0x20000 +------------------+
//!         | random fill      |
//!     len +------------------+
//! ```
//!
//! The CRC32 field, if the image has one, is searched for in the first
//! `checksum_scan_size` bytes.

use std::ops::Range;
use strum_macros::Display;

/// Length of the header that is copied verbatim
pub const HEADER_SIZE: usize = 0x200;

/// Start of the zeroed boot region
pub const NULL_START: usize = 0x200;

/// End of the zeroed boot region; also the minimum image size
pub const NULL_END: usize = 0x20000;

/// Number of leading bytes searched for a CRC32 field
pub const CHECKSUM_SCAN_SZ: usize = 1024;

/// Width of the CRC32 field
pub const CHECKSUM_FIELD_SIZE: usize = 4;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("header ends at {header_size:#x} but the boot region starts at {null_start:#x}")]
    Discontiguous {
        header_size: usize,
        null_start: usize,
    },

    #[error("boot region end {null_end:#x} is before its start {null_start:#x}")]
    InvertedBootRegion { null_start: usize, null_end: usize },

    #[error("checksum scan window of {0} bytes cannot hold a 4-byte field")]
    ScanWindowTooSmall(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RegionPolicy {
    /// Copied from the original image
    Preserve,
    /// Filled with 0x00
    Zero,
    /// Filled with random bytes
    Random,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub policy: RegionPolicy,
}

impl Region {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Offsets that drive the image transformation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageLayout {
    pub header_size: usize,
    pub null_start: usize,
    pub null_end: usize,
    pub checksum_scan_size: usize,
}

impl Default for ImageLayout {
    fn default() -> Self {
        ImageLayout {
            header_size: HEADER_SIZE,
            null_start: NULL_START,
            null_end: NULL_END,
            checksum_scan_size: CHECKSUM_SCAN_SZ,
        }
    }
}

impl ImageLayout {
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.header_size != self.null_start {
            return Err(LayoutError::Discontiguous {
                header_size: self.header_size,
                null_start: self.null_start,
            });
        }
        if self.null_end < self.null_start {
            return Err(LayoutError::InvertedBootRegion {
                null_start: self.null_start,
                null_end: self.null_end,
            });
        }
        if self.checksum_scan_size < CHECKSUM_FIELD_SIZE {
            return Err(LayoutError::ScanWindowTooSmall(self.checksum_scan_size));
        }
        Ok(())
    }

    /// Smallest image this layout can be applied to
    pub fn min_image_len(&self) -> usize {
        self.null_end
    }

    /// Returns the preserve / zero / random regions for an image of
    /// `image_len` bytes, or `None` if the image is shorter than the boot
    /// region end.
    pub fn regions(&self, image_len: usize) -> Option<[Region; 3]> {
        if image_len < self.min_image_len() {
            return None;
        }
        Some([
            Region {
                start: 0,
                end: self.header_size,
                policy: RegionPolicy::Preserve,
            },
            Region {
                start: self.null_start,
                end: self.null_end,
                policy: RegionPolicy::Zero,
            },
            Region {
                start: self.null_end,
                end: image_len,
                policy: RegionPolicy::Random,
            },
        ])
    }

    /// Byte range searched for the CRC32 field in an image of `image_len` bytes
    pub fn scan_window(&self, image_len: usize) -> Range<usize> {
        0..self.checksum_scan_size.min(image_len)
    }
}
