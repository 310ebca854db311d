//! Solder mask openings and silkscreen clipping.
//!
//! Both folds run on the render worker and poll cancellation once per
//! object (per object pair for the silk clipper, whose inner loop is where
//! the time goes).

use log::info;
use std::time::Instant;

use crate::cancel::{CancelToken, Progress};
use crate::error::Result;
use crate::geometry::Rect;
use crate::region::PlanarRegion;
use crate::stream::{GraphicsStream, Polarity};

/// Substrate area left uncovered by the mask layer.
///
/// Dark mask objects are mask material and subtract; Clear objects are
/// explicit openings and add back. A result equal to the substrate means
/// the layer removed nothing and callers should draw no mask at all.
pub fn build_mask(
    substrate: &PlanarRegion,
    mask: &GraphicsStream,
    cancel: &CancelToken,
    progress: Progress,
) -> Result<PlanarRegion> {
    let start = Instant::now();
    info!("constructing solder mask from {} objects", mask.len());

    let total = mask.len().max(1) as f64;
    let mut openings = substrate.clone();
    for (count, object) in mask.iter().enumerate() {
        cancel.check()?;
        openings = match object.polarity {
            Polarity::Dark => openings.subtract(&object.shape),
            Polarity::Clear => openings.union(&object.shape),
        };
        progress((count + 1) as f64 / total);
    }

    info!("solder mask completed in {} ms", start.elapsed().as_millis());
    Ok(openings)
}

/// Visible silkscreen: each legend object minus every mask object whose
/// bounding box touches it.
///
/// Returns one region per legend object, in stream order.
pub fn clip_silk(
    legend: &GraphicsStream,
    mask: Option<&GraphicsStream>,
    cancel: &CancelToken,
    progress: Progress,
) -> Result<Vec<PlanarRegion>> {
    let start = Instant::now();
    let Some(mask) = mask.filter(|m| !m.is_empty()) else {
        return Ok(legend.iter().map(|o| o.shape.clone()).collect());
    };
    info!("clipping {} legend objects against {} mask objects", legend.len(), mask.len());

    let mask_boxes: Vec<Option<Rect>> = mask.iter().map(|o| o.bounds()).collect();
    let total = (legend.len() * mask.len()).max(1) as f64;
    let mut done = 0usize;

    let mut clipped = Vec::with_capacity(legend.len());
    for object in legend.iter() {
        let mut visible = object.shape.clone();
        let legend_box = object.bounds();
        for (mask_object, mask_box) in mask.iter().zip(&mask_boxes) {
            cancel.check()?;
            if let (Some(a), Some(b)) = (legend_box, mask_box) {
                if a.intersects(b) {
                    visible = visible.subtract(&mask_object.shape);
                }
            }
            done += 1;
            progress(done as f64 / total);
        }
        clipped.push(visible);
    }

    info!("silkscreen clipping completed in {} ms", start.elapsed().as_millis());
    Ok(clipped)
}
