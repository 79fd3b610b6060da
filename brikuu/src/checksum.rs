// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locating and repairing an embedded CRC32 field
//!
//! Nothing in the image says where its checksum lives, so every 4-byte
//! aligned offset in the scan window is tried in turn. An offset is taken to
//! be the checksum field when the little-endian word stored there equals the
//! CRC32 of the whole image with those four bytes zeroed.
//!
//! The first offset that satisfies this wins. On high-entropy data an earlier
//! offset can match by coincidence; no attempt is made to detect that.

use brikuu_layout::CHECKSUM_FIELD_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use crc_any::CRCu32;
use log::{info, trace, warn};

/// A checksum field found in an image
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChecksumField {
    pub offset: usize,
    pub value: u32,
}

/// IEEE 802.3 CRC32, the same one zlib computes
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = CRCu32::crc32();
    crc.digest(bytes);
    crc.get_crc()
}

/// CRC32 of `image` as if the field at `offset` held zero. The image itself is
/// neither modified nor copied.
///
/// `offset + 4` must be within the image.
pub fn crc32_with_field_zeroed(image: &[u8], offset: usize) -> u32 {
    let field = offset..offset + CHECKSUM_FIELD_SIZE;
    let mut crc = CRCu32::crc32();
    crc.digest(&image[..field.start]);
    crc.digest(&[0u8; CHECKSUM_FIELD_SIZE]);
    crc.digest(&image[field.end..]);
    crc.get_crc()
}

/// Returns `true` if the word at `offset` is the CRC32 of the image with that
/// word zeroed.
pub fn would_match(image: &[u8], offset: usize) -> bool {
    match offset.checked_add(CHECKSUM_FIELD_SIZE) {
        Some(end) if end <= image.len() => {
            let stored = LittleEndian::read_u32(&image[offset..end]);
            stored == crc32_with_field_zeroed(image, offset)
        }
        _ => false,
    }
}

/// Candidate offsets for a window of `window` bytes: every multiple of 4
/// whose whole field fits in the window, lowest first.
fn candidates(window: usize) -> impl Iterator<Item = usize> {
    (0..window.saturating_sub(CHECKSUM_FIELD_SIZE - 1)).step_by(CHECKSUM_FIELD_SIZE)
}

/// Scans the first `scan_size` bytes of `image` for a checksum field without
/// modifying it.
pub fn locate(image: &[u8], scan_size: usize) -> Option<ChecksumField> {
    let window = scan_size.min(image.len());
    for offset in candidates(window) {
        if would_match(image, offset) {
            let value = LittleEndian::read_u32(&image[offset..offset + CHECKSUM_FIELD_SIZE]);
            return Some(ChecksumField { offset, value });
        }
        trace!("no CRC32 match at {offset:#06x}");
    }
    None
}

/// Finds the checksum field in the first `scan_size` bytes and rewrites it
/// with the CRC32 of the image with the field zeroed.
///
/// Only the four bytes of the field are written, and only when a field is
/// found; `None` leaves the image untouched.
pub fn locate_and_patch(image: &mut [u8], scan_size: usize) -> Option<ChecksumField> {
    info!("Scanning for CRC32 field");
    let Some(found) = locate(image, scan_size) else {
        warn!("No CRC32 field identified (may still flash if unchecked)");
        return None;
    };

    let field = found.offset..found.offset + CHECKSUM_FIELD_SIZE;
    let value = crc32_with_field_zeroed(image, found.offset);
    LittleEndian::write_u32(&mut image[field], value);
    info!("CRC32 field identified at offset 0x{:04X}", found.offset);

    Some(ChecksumField {
        offset: found.offset,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brikuu_layout::CHECKSUM_SCAN_SZ;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    /// Random image of `len` bytes with a consistent CRC32 field at `offset`
    fn image_with_field(len: usize, offset: usize, seed: u64) -> Vec<u8> {
        let mut image = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut image);
        let crc = crc32_with_field_zeroed(&image, offset);
        LittleEndian::write_u32(&mut image[offset..offset + 4], crc);
        image
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn zeroed_crc_matches_explicit_copy() {
        let mut image = vec![0u8; 64];
        StdRng::seed_from_u64(7).fill_bytes(&mut image);

        let mut copy = image.clone();
        copy[8..12].fill(0);
        assert_eq!(crc32_with_field_zeroed(&image, 8), crc32(&copy));
    }

    #[test]
    fn would_match_out_of_bounds() {
        let image = [0u8; 8];
        assert!(!would_match(&image, 5));
        assert!(!would_match(&image, 8));
        assert!(!would_match(&image, usize::MAX));
    }

    #[test]
    fn candidate_offsets() {
        assert_eq!(candidates(0).count(), 0);
        assert_eq!(candidates(3).count(), 0);
        assert_eq!(candidates(4).collect::<Vec<_>>(), vec![0]);
        assert_eq!(candidates(11).collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(candidates(12).collect::<Vec<_>>(), vec![0, 4, 8]);

        let all: Vec<_> = candidates(CHECKSUM_SCAN_SZ).collect();
        assert_eq!(all.len(), 256);
        assert_eq!(all.last(), Some(&1020));
    }

    #[test]
    fn patches_known_field() {
        for offset in [0, 0x10, 0x80, 0xfc] {
            let mut image = image_with_field(0x20100, offset, offset as u64);
            let before = image.clone();

            let found = locate_and_patch(&mut image, CHECKSUM_SCAN_SZ).unwrap();
            assert_eq!(found.offset, offset);
            assert_eq!(found.value, crc32_with_field_zeroed(&image, offset));
            assert_eq!(
                LittleEndian::read_u32(&image[offset..offset + 4]),
                found.value
            );
            assert_eq!(image, before);
        }
    }

    #[test]
    fn field_at_end_of_window() {
        let mut image = image_with_field(0x2000, 1020, 3);
        let found = locate_and_patch(&mut image, CHECKSUM_SCAN_SZ).unwrap();
        assert_eq!(found.offset, 1020);
    }

    #[test]
    fn field_outside_window_is_ignored() {
        let mut image = image_with_field(0x2000, 1024, 4);
        let before = image.clone();
        assert_eq!(locate_and_patch(&mut image, CHECKSUM_SCAN_SZ), None);
        assert_eq!(image, before);
    }

    #[test]
    fn unaligned_field_is_ignored() {
        let mut image = image_with_field(0x1000, 0x22, 5);
        assert_eq!(locate(&image, CHECKSUM_SCAN_SZ), None);
        assert_eq!(locate_and_patch(&mut image, CHECKSUM_SCAN_SZ), None);
    }

    #[test]
    fn window_clamped_to_short_image() {
        let mut image = image_with_field(16, 12, 6);
        let found = locate_and_patch(&mut image, CHECKSUM_SCAN_SZ).unwrap();
        assert_eq!(found.offset, 12);
    }

    #[test]
    fn window_bounds_the_scan() {
        let image = image_with_field(0x1000, 0x40, 8);
        let found = locate(&image, CHECKSUM_SCAN_SZ).unwrap();
        assert_eq!(found.offset, 0x40);
        assert_eq!(locate(&image, 0x40), None);
        assert_eq!(locate(&image, 0x44).map(|f| f.offset), Some(0x40));
    }

    #[test]
    fn random_data_has_no_field() {
        // Each candidate matches with probability 2^-32, so a miss over 256
        // candidates is overwhelmingly likely.
        let mut image = vec![0u8; 0x8000];
        rand::thread_rng().fill_bytes(&mut image);
        let before = image.clone();

        assert_eq!(locate_and_patch(&mut image, CHECKSUM_SCAN_SZ), None);
        assert_eq!(image, before);
    }

    #[test]
    fn patch_is_idempotent() {
        let mut image = image_with_field(0x20100, 0x24, 9);
        let first = locate_and_patch(&mut image, CHECKSUM_SCAN_SZ).unwrap();
        let after_first = image.clone();
        let second = locate_and_patch(&mut image, CHECKSUM_SCAN_SZ).unwrap();

        assert_eq!(first, second);
        assert_eq!(image, after_first);
    }
}
