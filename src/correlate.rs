//! Fast Pearson correlation of one observed curve against many stored
//! candidates.
//!
//! [`FastCorrelation`] pays the alignment cost once: the observed grid is
//! intersected with the canonical grid on integer ticks, the matched
//! positions become a reusable selector into every candidate row, and the
//! observed-side sums are precomputed. Each candidate then costs a single
//! pass over the overlap instead of an interpolation over the whole grid.
//!
//! All curve arithmetic runs in the storage precision (f32). A constant
//! curve on either side yields NaN, which is passed through to the caller
//! rather than raised.

use crate::error::{PdfError, PdfResult};
use crate::grid::{self, Bounds};

/// Precomputed index mapping from a canonical-grid row to the matched
/// observed points.
///
/// Evenly spaced matches, the common case, compress to a strided slice;
/// anything else keeps the explicit index list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Slice {
        start: usize,
        end: usize,
        step: usize,
    },
    Indices(Vec<usize>),
}

impl Selector {
    fn from_positions(positions: Vec<usize>) -> Self {
        if positions.len() < 2 {
            let start = positions[0];
            return Selector::Slice {
                start,
                end: start + 1,
                step: 1,
            };
        }
        let step = positions[1] - positions[0];
        let evenly = positions.windows(2).all(|w| w[1] - w[0] == step);
        if evenly {
            Selector::Slice {
                start: positions[0],
                end: positions[positions.len() - 1] + 1,
                step,
            }
        } else {
            Selector::Indices(positions)
        }
    }

    /// Number of selected positions.
    pub fn len(&self) -> usize {
        match self {
            Selector::Slice { start, end, step } => (end - start).div_ceil(*step),
            Selector::Indices(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateful correlator built once per observed curve and reused across
/// candidates sharing the canonical grid.
#[derive(Debug, Clone)]
pub struct FastCorrelation {
    bounds: Bounds,
    ncod: usize,
    csel: Selector,
    gobs1: Vec<f32>,
    rn: f32,
    s1_gobs: f32,
    den_gobs: f32,
}

impl FastCorrelation {
    /// Aligns the observed curve `(robs, gobs)` with the canonical grid
    /// `rcod` and precomputes the observed-side correlation terms.
    ///
    /// Both grids must be strictly ascending and sampled on multiples of
    /// the canonical step. Fails with [`PdfError::NoOverlap`] when the
    /// window or the tick intersection is empty.
    pub fn new(
        robs: &[f64],
        gobs: &[f32],
        rcod: &[f64],
        rmin: Option<f64>,
        rmax: Option<f64>,
    ) -> PdfResult<Self> {
        if robs.len() != gobs.len() {
            return Err(PdfError::GridMismatch {
                reason: format!(
                    "observed curve has {} r values but {} g values",
                    robs.len(),
                    gobs.len()
                ),
            });
        }
        let bounds = grid::calc_bounds(robs, rcod, rmin, rmax)?;
        let rstep = grid::grid_step(rcod)?;
        let iobs = grid::quantize(robs, rstep)?;
        let icod = grid::quantize(rcod, rstep)?;
        if !iobs.windows(2).all(|w| w[0] < w[1]) {
            return Err(PdfError::GridMismatch {
                reason: "observed grid must be strictly ascending".to_string(),
            });
        }

        // Intersect the canonical window with the observed ticks; both
        // sides are ascending so a two-pointer merge suffices.
        let window = &icod[bounds.clo..bounds.chi];
        let mut gobs1 = Vec::new();
        let mut positions = Vec::new();
        let (mut j, mut k) = (0usize, 0usize);
        while j < window.len() && k < iobs.len() {
            match window[j].cmp(&iobs[k]) {
                std::cmp::Ordering::Less => j += 1,
                std::cmp::Ordering::Greater => k += 1,
                std::cmp::Ordering::Equal => {
                    gobs1.push(gobs[k]);
                    positions.push(bounds.clo + j);
                    j += 1;
                    k += 1;
                }
            }
        }
        if gobs1.is_empty() {
            return Err(PdfError::NoOverlap {
                lb: bounds.rmin,
                ub: bounds.rmax,
            });
        }

        let csel = Selector::from_positions(positions);
        debug_assert_eq!(csel.len(), gobs1.len());
        let rn = 1.0f32 / gobs1.len() as f32;
        let s1_gobs: f32 = gobs1.iter().sum();
        let s2_gobs: f32 = gobs1.iter().map(|&g| g * g).sum();
        let den_gobs = s2_gobs - rn * s1_gobs * s1_gobs;

        Ok(Self {
            bounds,
            ncod: rcod.len(),
            csel,
            gobs1,
            rn,
            s1_gobs,
            den_gobs,
        })
    }

    /// The effective window on the canonical grid.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of overlapping points the correlation runs over.
    pub fn overlap_len(&self) -> usize {
        self.gobs1.len()
    }

    /// Pearson correlation of a candidate row against the observed curve.
    ///
    /// `gcod` must span the full canonical grid. Returns NaN when either
    /// curve has zero variance over the overlap.
    pub fn correlate(&self, gcod: &[f32]) -> PdfResult<f32> {
        if gcod.len() != self.ncod {
            return Err(PdfError::GridMismatch {
                reason: format!(
                    "candidate row has {} points, canonical grid has {}",
                    gcod.len(),
                    self.ncod
                ),
            });
        }
        let (s1, s2, cross) = match &self.csel {
            Selector::Slice { start, end, step } => {
                self.accumulate(gcod[*start..*end].iter().step_by(*step).copied())
            }
            Selector::Indices(idx) => self.accumulate(idx.iter().map(|&i| gcod[i])),
        };
        let den_gcod = s2 - s1 * s1 * self.rn;
        let nom = cross - s1 * self.s1_gobs * self.rn;
        let den = self.den_gobs * den_gcod;
        // Zero variance on either side leaves nothing to normalize by.
        if den <= 0.0 {
            return Ok(f32::NAN);
        }
        Ok(nom / den.sqrt())
    }

    fn accumulate(&self, selected: impl Iterator<Item = f32>) -> (f32, f32, f32) {
        let mut s1 = 0.0f32;
        let mut s2 = 0.0f32;
        let mut cross = 0.0f32;
        for (gc, &go) in selected.zip(&self.gobs1) {
            s1 += gc;
            s2 += gc * gc;
            cross += gc * go;
        }
        (s1, s2, cross)
    }
}
