//! Separable resampling kernel used by scaling.
//!
//! Each axis is resampled independently in normalized floating point:
//! - a shrinking axis averages the exact source area each output pixel covers
//! - a growing axis interpolates linearly between the two nearest centers
//!
//! The horizontal pass runs first into an `f32` scratch buffer, the vertical
//! pass then rounds into the output subpixel type.

use image::Pixel;

use crate::sample::{Buffer, Sample};

/// Source samples contributing to one output position along an axis.
#[derive(Debug, Clone, PartialEq)]
struct Contribution {
    start: usize,
    weights: Vec<f32>,
}

/// Weights mapping `src_len` positions onto `dst_len` positions.
fn axis_contributions(src_len: u32, dst_len: u32) -> Vec<Contribution> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len as usize - 1;

    (0..dst_len)
        .map(|i| {
            if dst_len < src_len {
                // Area average over [lo, hi) in source space
                let lo = i as f64 * scale;
                let hi = lo + scale;
                let start = lo.floor() as usize;
                let end = (hi.ceil() as usize).min(src_len as usize);
                let weights = (start..end)
                    .map(|j| {
                        let covered = hi.min(j as f64 + 1.0) - lo.max(j as f64);
                        (covered.max(0.0) / scale) as f32
                    })
                    .collect();
                Contribution { start, weights }
            } else {
                // Align pixel centers, clamp at the edges
                let center = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, last as f64);
                let j0 = center.floor() as usize;
                let j1 = (j0 + 1).min(last);
                let t = (center - j0 as f64) as f32;
                if j1 == j0 || t == 0.0 {
                    Contribution {
                        start: j0,
                        weights: vec![1.0],
                    }
                } else {
                    Contribution {
                        start: j0,
                        weights: vec![1.0 - t, t],
                    }
                }
            }
        })
        .collect()
}

/// Resample a buffer to exactly `width` x `height`.
///
/// Every component, alpha included, goes through the same kernel.
pub(crate) fn resample<P>(src: &Buffer<P>, width: u32, height: u32) -> Buffer<P>
where
    P: Pixel,
    P::Subpixel: Sample,
{
    let channels = P::CHANNEL_COUNT as usize;
    let (src_w, src_h) = src.dimensions();
    let columns = axis_contributions(src_w, width);
    let rows = axis_contributions(src_h, height);
    let samples: &[P::Subpixel] = src.as_raw();

    let (dst_w, src_w, src_h) = (width as usize, src_w as usize, src_h as usize);

    // Horizontal pass: src_h rows of dst_w pixels
    let mut horizontal = vec![0f32; src_h * dst_w * channels];
    for y in 0..src_h {
        let row = &samples[y * src_w * channels..(y + 1) * src_w * channels];
        let out_row = &mut horizontal[y * dst_w * channels..(y + 1) * dst_w * channels];
        for (x, contribution) in columns.iter().enumerate() {
            for c in 0..channels {
                let mut acc = 0.0;
                for (k, weight) in contribution.weights.iter().enumerate() {
                    acc += row[(contribution.start + k) * channels + c].as_f32() * weight;
                }
                out_row[x * channels + c] = acc;
            }
        }
    }

    // Vertical pass into the output
    let mut out = Buffer::<P>::new(width, height);
    let dst: &mut [P::Subpixel] = &mut out;
    let stride = dst_w * channels;
    for (y, contribution) in rows.iter().enumerate() {
        let out_row = &mut dst[y * stride..(y + 1) * stride];
        for (i, value) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, weight) in contribution.weights.iter().enumerate() {
                acc += horizontal[(contribution.start + k) * stride + i] * weight;
            }
            *value = <P::Subpixel as Sample>::from_f32(acc);
        }
    }

    out
}
