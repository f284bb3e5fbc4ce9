//! Curve storage backends.
//!
//! One capability set, two interchangeable backends: the hierarchical
//! single-container store (read/write) and the flat descriptor + mmap
//! matrix store (read-only, built offline). Unsupported operations fail
//! with an explicit [`PdfError::Unsupported`] instead of a backend-specific
//! surprise.

pub mod flat;
pub mod hierarchical;

pub use flat::{FlatStore, FlatStoreWriter};
pub use hierarchical::HierarchicalStore;

use crate::calculator::CalculatorConfig;
use crate::error::{PdfError, PdfResult};
use crate::types::CodId;
use std::str::FromStr;
use std::sync::Arc;

/// Lazy, finite, restartable sequence of stored curves in storage order.
pub type CurveIter<'a> = Box<dyn Iterator<Item = PdfResult<(CodId, Vec<f32>)>> + 'a>;

/// Common contract of the curve storage backends.
pub trait CurveStore {
    /// Persists the calculator configuration and (re)writes the canonical
    /// grid. Existing curve entries become stale when the grid changes;
    /// that is a caller responsibility.
    fn write_config(&mut self, config: &CalculatorConfig, rgrid: &[f64]) -> PdfResult<()>;

    /// Stores `g` under `id`, overwriting any previous entry. Fails when
    /// `r` does not match the canonical grid.
    fn write_pdf(&mut self, id: CodId, r: &[f64], g: &[f32]) -> PdfResult<()>;

    /// Returns the canonical grid and the stored curve for `id`.
    fn read_pdf(&self, id: CodId) -> PdfResult<(Arc<[f64]>, Vec<f32>)>;

    /// The canonical grid, loaded lazily and cached after first access.
    fn rgrid(&self) -> PdfResult<Arc<[f64]>>;

    /// Enumerates every stored entry; a fresh call restarts from the
    /// beginning.
    fn iter_all(&self) -> PdfResult<CurveIter<'_>>;

    /// The persisted calculator configuration, when one was written.
    fn calculator_config(&self) -> PdfResult<Option<CalculatorConfig>>;
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Hierarchical container file.
    Hdf,
    /// Flat descriptor + memory-mapped matrix.
    Flat,
}

impl FromStr for Backend {
    type Err = PdfError;

    fn from_str(s: &str) -> PdfResult<Self> {
        match s {
            "hdf" => Ok(Backend::Hdf),
            "flat" | "raw" => Ok(Backend::Flat),
            other => Err(PdfError::ConfigError {
                reason: format!("unknown storage backend '{other}', expected 'hdf' or 'flat'"),
            }),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::Hdf => "hdf",
            Backend::Flat => "flat",
        })
    }
}
