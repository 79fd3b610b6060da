// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Error;
use brikuu_layout::{ImageLayout, RegionPolicy};
use log::{debug, info};
use rand::RngCore;

/// Builds the degraded image: header kept, boot region zeroed, everything
/// after it replaced with fresh entropy from the thread-local generator.
///
/// The random tail differs on every call.
pub fn transform(original: &[u8], layout: &ImageLayout) -> Result<Vec<u8>, Error> {
    transform_with_rng(original, layout, &mut rand::thread_rng())
}

/// Same as [`transform`], drawing the random tail from `rng`
pub fn transform_with_rng<R: RngCore + ?Sized>(
    original: &[u8],
    layout: &ImageLayout,
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    layout.validate()?;

    let regions = layout
        .regions(original.len())
        .ok_or(Error::InsufficientSize {
            actual: original.len(),
            required: layout.min_image_len(),
        })?;

    let mut out = Vec::with_capacity(original.len());
    for region in regions {
        match region.policy {
            RegionPolicy::Preserve => {
                info!(
                    "Preserving header ({:#05x}-{:#05x})",
                    region.start,
                    region.end.saturating_sub(1)
                );
                out.extend_from_slice(&original[region.range()]);
            }
            RegionPolicy::Zero => {
                info!(
                    "Nullifying boot region ({:#05x}-{:#07x})",
                    region.start, region.end
                );
                out.resize(region.end, 0);
            }
            RegionPolicy::Random => {
                info!("Filling remaining space with entropy");
                out.resize(region.end, 0);
                rng.fill_bytes(&mut out[region.range()]);
            }
        }
        debug!(
            "{} region {:#x}..{:#x} ({} bytes)",
            region.policy,
            region.start,
            region.end,
            region.len()
        );
    }

    Ok(out)
}
