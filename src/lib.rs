//! Correlation search over bulk-simulated pair distribution functions.
//!
//! A store holds millions of fixed-grid PDF curves keyed by 7-digit COD
//! ids; a search aligns an observed curve with the store's canonical grid
//! once and streams Pearson correlations over the candidates. Two store
//! backends are provided: a hierarchical single-container file (read/write)
//! and a flat memory-mapped matrix (read-only, built offline).

pub mod calculator;
pub mod config;
pub mod correlate;
pub mod error;
pub mod grid;
pub mod metadata;
pub mod search;
pub mod store;
pub mod types;

// Explicit exports for better API clarity
pub use calculator::{CalculatorConfig, CalculatorConfigBuilder, CalculatorKind};
pub use config::Settings;
pub use correlate::{FastCorrelation, Selector};
pub use error::{PdfError, PdfResult};
pub use grid::{Bounds, DEFAULT_RSTEP, EPS, calc_bounds, uniform_grid};
pub use metadata::{ConfigScalar, ConfigTree};
pub use search::{
    Composition, CompositionFilter, ObservedSource, SearchHit, SearchRequest, run_search,
};
pub use store::{Backend, CurveStore, FlatStore, FlatStoreWriter, HierarchicalStore};
pub use types::CodId;
