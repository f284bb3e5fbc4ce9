//! Radial grid arithmetic: overlap bounds, tick quantization, and grid
//! construction.
//!
//! Every store shares one canonical grid with a uniform step (0.01 by
//! convention). Comparisons between grids work on integer tick indices,
//! `round(r / rstep)`, which makes alignment exact instead of depending on
//! floating-point equality.
//!
//! Index convention: `clo` is inclusive and `chi` exclusive for curve
//! selection, while `Bounds::rmin`/`Bounds::rmax` report `rcod[clo]` and
//! `rcod[chi]` as the effective search window.

use crate::error::{PdfError, PdfResult};

/// Tolerance for matching radial values against grid ticks.
pub const EPS: f64 = 1e-5;

/// Canonical grid step in length units.
pub const DEFAULT_RSTEP: f64 = 0.01;

/// Overlap window between an observed grid and the canonical grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// First canonical-grid index inside the window (inclusive).
    pub clo: usize,
    /// Last canonical-grid index of the window (exclusive for selection).
    pub chi: usize,
    /// Effective lower bound, `rcod[clo]`.
    pub rmin: f64,
    /// Effective upper bound, `rcod[chi]`.
    pub rmax: f64,
}

/// Returns the uniform step of an ascending grid.
///
/// Only the leading step is inspected; full uniformity is enforced where
/// curves are quantized or written.
pub fn grid_step(r: &[f64]) -> PdfResult<f64> {
    if r.len() < 2 {
        return Err(PdfError::GridMismatch {
            reason: format!("grid must have at least 2 points, got {}", r.len()),
        });
    }
    let rstep = r[1] - r[0];
    if rstep <= 0.0 {
        return Err(PdfError::GridMismatch {
            reason: format!("grid must be ascending, leading step is {rstep}"),
        });
    }
    Ok(rstep)
}

/// Computes the overlapping index range between `robs` and the canonical
/// grid `rcod`, optionally narrowed by user bounds.
///
/// Fails with [`PdfError::NoOverlap`] when the grids share no window.
pub fn calc_bounds(
    robs: &[f64],
    rcod: &[f64],
    rmin: Option<f64>,
    rmax: Option<f64>,
) -> PdfResult<Bounds> {
    let rstep = grid_step(rcod)?;
    if robs.is_empty() {
        return Err(PdfError::GridMismatch {
            reason: "observed grid is empty".to_string(),
        });
    }
    let mut lb = robs[0].max(rcod[0]);
    if let Some(rmin) = rmin {
        lb = lb.max(rmin);
    }
    let mut ub = robs[robs.len() - 1].min(rcod[rcod.len() - 1]);
    if let Some(rmax) = rmax {
        ub = ub.min(rmax);
    }
    if lb > ub {
        return Err(PdfError::NoOverlap { lb, ub });
    }
    // Tick indices relative to the canonical grid origin.
    let clo = (((lb - rcod[0] + EPS) / rstep).floor() as isize).max(0) as usize;
    let chi = ((((ub - rcod[0]) / rstep).round() as isize).max(0) as usize).min(rcod.len() - 1);
    if clo > chi {
        return Err(PdfError::NoOverlap { lb, ub });
    }
    Ok(Bounds {
        clo,
        chi,
        rmin: rcod[clo],
        rmax: rcod[chi],
    })
}

/// Quantizes grid values to integer multiples of `rstep`.
///
/// Fails with [`PdfError::StepMismatch`] when any value is farther than
/// [`EPS`] from its nearest tick, which proves the grid does not share the
/// canonical step.
pub fn quantize(r: &[f64], rstep: f64) -> PdfResult<Vec<i64>> {
    let mut ticks = Vec::with_capacity(r.len());
    for &x in r {
        let i = (x / rstep).round() as i64;
        let residual = (x - i as f64 * rstep).abs();
        if residual >= EPS {
            return Err(PdfError::StepMismatch {
                r: x,
                rstep,
                residual,
            });
        }
        ticks.push(i);
    }
    Ok(ticks)
}

/// Builds a uniform grid covering `[rmin, rmax]` with step `rstep`.
pub fn uniform_grid(rmin: f64, rmax: f64, rstep: f64) -> Vec<f64> {
    let n = grid_len(rmin, rmax, rstep);
    (0..n).map(|i| rmin + i as f64 * rstep).collect()
}

/// Number of points in a uniform grid over `[rmin, rmax]` with step `rstep`.
pub fn grid_len(rmin: f64, rmax: f64, rstep: f64) -> usize {
    (((rmax - rmin) / rstep).round() as usize) + 1
}

/// Checks that `r` matches the canonical grid `rcod` point for point.
///
/// Used by stores on write to reject curves sampled on a different grid.
pub fn validate_same_grid(r: &[f64], rcod: &[f64]) -> PdfResult<()> {
    if r.len() != rcod.len() {
        return Err(PdfError::GridMismatch {
            reason: format!(
                "curve grid has {} points, canonical grid has {}",
                r.len(),
                rcod.len()
            ),
        });
    }
    for (i, (&a, &b)) in r.iter().zip(rcod).enumerate() {
        if (a - b).abs() >= EPS {
            return Err(PdfError::GridMismatch {
                reason: format!("curve grid deviates at index {i}: {a} vs canonical {b}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgrid() -> Vec<f64> {
        uniform_grid(0.0, 10.0, DEFAULT_RSTEP)
    }

    #[test]
    fn test_uniform_grid_shape() {
        let r = rgrid();
        assert_eq!(r.len(), 1001);
        assert_eq!(r[0], 0.0);
        assert!((r[1000] - 10.0).abs() < EPS);
    }

    #[test]
    fn test_full_overlap() {
        let rcod = rgrid();
        let b = calc_bounds(&rcod, &rcod, None, None).unwrap();
        assert_eq!(b.clo, 0);
        assert_eq!(b.chi, 1000);
        assert_eq!(b.rmin, 0.0);
        assert!((b.rmax - 10.0).abs() < EPS);
    }

    #[test]
    fn test_user_bounds_narrow_the_window() {
        let rcod = rgrid();
        let robs = uniform_grid(1.0, 8.0, DEFAULT_RSTEP);
        let b = calc_bounds(&robs, &rcod, Some(2.0), Some(5.0)).unwrap();
        assert_eq!(b.clo, 200);
        assert_eq!(b.chi, 500);
        assert!((b.rmin - 2.0).abs() < EPS);
        assert!((b.rmax - 5.0).abs() < EPS);
    }

    #[test]
    fn test_idempotent_and_in_range() {
        let rcod = rgrid();
        let robs = uniform_grid(0.5, 7.3, 0.02);
        let b1 = calc_bounds(&robs, &rcod, None, Some(6.0)).unwrap();
        let b2 = calc_bounds(&robs, &rcod, None, Some(6.0)).unwrap();
        assert_eq!(b1, b2);
        assert!(b1.clo <= b1.chi);
        assert!(b1.chi < rcod.len());
    }

    #[test]
    fn test_no_overlap() {
        let rcod = uniform_grid(0.0, 5.0, DEFAULT_RSTEP);
        let robs = uniform_grid(6.0, 9.0, DEFAULT_RSTEP);
        assert!(matches!(
            calc_bounds(&robs, &rcod, None, None),
            Err(PdfError::NoOverlap { .. })
        ));
    }

    #[test]
    fn test_offset_grid_origin() {
        let rcod = uniform_grid(1.0, 5.0, DEFAULT_RSTEP);
        let b = calc_bounds(&rcod, &rcod, None, None).unwrap();
        assert_eq!(b.clo, 0);
        assert_eq!(b.chi, rcod.len() - 1);
        assert!((b.rmin - 1.0).abs() < EPS);
    }

    #[test]
    fn test_quantize_rejects_off_step_grid() {
        let ok = quantize(&[0.0, 0.01, 0.02], DEFAULT_RSTEP).unwrap();
        assert_eq!(ok, vec![0, 1, 2]);
        assert!(matches!(
            quantize(&[0.005], DEFAULT_RSTEP),
            Err(PdfError::StepMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_same_grid() {
        let rcod = rgrid();
        assert!(validate_same_grid(&rcod, &rcod).is_ok());
        let mut off = rgrid();
        off[500] += 0.003;
        assert!(validate_same_grid(&off, &rcod).is_err());
        assert!(validate_same_grid(&rcod[..1000], &rcod).is_err());
    }
}
