//! Correlation search driver and candidate streaming.
//!
//! The driver wires one observed curve against a curve store: it builds a
//! single [`FastCorrelation`], pulls candidate curves lazily from the store
//! (all of them, or the subset named by an external composition filter),
//! and emits `(id, correlation)` lines behind a provenance header. Nothing
//! is materialized unless a descending sort is requested.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::correlate::FastCorrelation;
use crate::error::{PdfError, PdfResult};
use crate::store::{CurveIter, CurveStore};
use crate::types::CodId;

/// Normalized elemental fractions of a composition query.
///
/// Parsed from whitespace-separated symbol/count pairs (`"Na 0.5 Cl 0.5"`);
/// a symbol without a following count defaults to 1. Counts are normalized
/// to unit sum, repeated symbols accumulate.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    fractions: Vec<(String, f64)>,
}

impl Composition {
    pub fn parse(text: &str) -> PdfResult<Self> {
        let mut raw: Vec<(String, f64)> = Vec::new();
        let mut tokens = text.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            if token.parse::<f64>().is_ok() {
                return Err(PdfError::ConfigError {
                    reason: format!("composition has a count '{token}' without an element"),
                });
            }
            let count = match tokens.peek().and_then(|t| t.parse::<f64>().ok()) {
                Some(c) => {
                    tokens.next();
                    c
                }
                None => 1.0,
            };
            if count <= 0.0 {
                return Err(PdfError::ConfigError {
                    reason: format!("element {token} has non-positive count {count}"),
                });
            }
            match raw.iter_mut().find(|(s, _)| s == token) {
                Some((_, c)) => *c += count,
                None => raw.push((token.to_string(), count)),
            }
        }
        if raw.is_empty() {
            return Err(PdfError::ConfigError {
                reason: "empty composition query".to_string(),
            });
        }
        let total: f64 = raw.iter().map(|(_, c)| c).sum();
        for (_, c) in &mut raw {
            *c /= total;
        }
        Ok(Self { fractions: raw })
    }

    /// Element symbols with their normalized fractions, in input order.
    pub fn fractions(&self) -> &[(String, f64)] {
        &self.fractions
    }
}

impl std::fmt::Display for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (symbol, fraction) in &self.fractions {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{symbol} {fraction}")?;
            first = false;
        }
        Ok(())
    }
}

/// External composition pre-filter, consumed but not implemented here.
///
/// Implementations map a normalized composition and a tolerance onto a lazy
/// stream of candidate ids; exact match is expected at tolerance zero. The
/// filter's universe may exceed the store's, so ids it yields are allowed
/// to be absent from the store.
pub trait CompositionFilter {
    fn candidates(
        &self,
        query: &Composition,
        tolerance: f64,
    ) -> PdfResult<Box<dyn Iterator<Item = CodId> + '_>>;
}

/// Where the observed curve comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedSource {
    /// Two-column `(r, g)` text file.
    File(PathBuf),
    /// An entry already in the store, referenced as `cod:<id>`.
    Stored(CodId),
}

impl ObservedSource {
    /// Short name used in the output header.
    pub fn display_name(&self) -> String {
        match self {
            ObservedSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ObservedSource::Stored(id) => format!("cod:{id}"),
        }
    }
}

impl FromStr for ObservedSource {
    type Err = PdfError;

    fn from_str(s: &str) -> PdfResult<Self> {
        match s.strip_prefix("cod:") {
            Some(rest) => Ok(ObservedSource::Stored(CodId::parse(rest)?)),
            None => Ok(ObservedSource::File(PathBuf::from(s))),
        }
    }
}

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub observed: ObservedSource,
    pub rmin: Option<f64>,
    pub rmax: Option<f64>,
    /// Inclusive minimum correlation for a match.
    pub ccmin: Option<f32>,
    /// Stoichiometry tolerance handed to the composition filter.
    pub tolerance: f64,
    /// Buffer and sort descending by correlation.
    pub sort: bool,
    pub composition: Option<Composition>,
}

/// One search result line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: CodId,
    pub cc: f32,
}

/// Loads a two-column `(r, g)` text file; `#`-comments and blank lines are
/// skipped.
pub fn load_observed(path: &Path) -> PdfResult<(Vec<f64>, Vec<f32>)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut r = Vec::new();
    let mut g = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parse = |column: &str| -> PdfResult<f64> {
            column.parse().map_err(|_| PdfError::DataParse {
                path: path.to_path_buf(),
                line: lineno + 1,
                reason: format!("'{column}' is not a number"),
            })
        };
        let mut columns = trimmed.split_whitespace();
        let (Some(rcol), Some(gcol)) = (columns.next(), columns.next()) else {
            return Err(PdfError::DataParse {
                path: path.to_path_buf(),
                line: lineno + 1,
                reason: "expected two columns".to_string(),
            });
        };
        r.push(parse(rcol)?);
        g.push(parse(gcol)? as f32);
    }
    if r.is_empty() {
        return Err(PdfError::DataParse {
            path: path.to_path_buf(),
            line: 0,
            reason: "no data rows".to_string(),
        });
    }
    Ok((r, g))
}

/// Candidate stream over entries named by an external id sequence.
///
/// Ids absent from the store are skipped; the filter's universe is
/// maintained independently and may be wider.
pub fn candidates_filtered<'a>(
    store: &'a dyn CurveStore,
    ids: Box<dyn Iterator<Item = CodId> + 'a>,
) -> CurveIter<'a> {
    Box::new(ids.filter_map(move |id| match store.read_pdf(id) {
        Ok((_, g)) => Some(Ok((id, g))),
        Err(PdfError::EntryNotFound { .. }) => {
            debug!(%id, "candidate not in store, skipped");
            None
        }
        Err(e) => Some(Err(e)),
    }))
}

/// Lazily correlates candidates, dropping all-zero curves (degenerate
/// simulations) and applying the inclusive `ccmin` filter.
///
/// NaN correlations from zero-variance curves pass through unless `ccmin`
/// is set, in which case they fail the comparison and are filtered.
pub fn correlate_stream<'a>(
    fc: &'a FastCorrelation,
    candidates: CurveIter<'a>,
    ccmin: Option<f32>,
) -> impl Iterator<Item = PdfResult<SearchHit>> + 'a {
    candidates.filter_map(move |item| match item {
        Err(e) => Some(Err(e)),
        Ok((id, g)) => {
            if g.iter().all(|&x| x == 0.0) {
                debug!(%id, "all-zero curve, skipped");
                return None;
            }
            match fc.correlate(&g) {
                Err(e) => Some(Err(e)),
                Ok(cc) => match ccmin {
                    // NaN never reaches the threshold.
                    Some(min) if cc.is_nan() || cc < min => None,
                    _ => Some(Ok(SearchHit { id, cc })),
                },
            }
        }
    })
}

/// Orders hits descending by correlation, NaN values last.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| match (a.cc.is_nan(), b.cc.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => b.cc.total_cmp(&a.cc),
    });
}

/// Runs one search and writes header plus result lines to `out`.
pub fn run_search(
    store: &dyn CurveStore,
    request: &SearchRequest,
    filter: Option<&dyn CompositionFilter>,
    out: &mut dyn Write,
) -> PdfResult<()> {
    let rcod = store.rgrid()?;
    let (robs, gobs) = match &request.observed {
        ObservedSource::File(path) => load_observed(path)?,
        ObservedSource::Stored(id) => {
            let (r, g) = store.read_pdf(*id)?;
            (r.to_vec(), g)
        }
    };
    let fc = FastCorrelation::new(&robs, &gobs, &rcod, request.rmin, request.rmax)?;
    let bounds = fc.bounds();
    debug!(
        overlap = fc.overlap_len(),
        rmin = bounds.rmin,
        rmax = bounds.rmax,
        "correlator ready"
    );

    writeln!(out, "#T codpdf search")?;
    writeln!(out, "#C searchpdf = {}", request.observed.display_name())?;
    match &request.composition {
        Some(comp) => writeln!(out, "#C composition = {comp}")?,
        None => writeln!(out, "#C composition = *")?,
    }
    writeln!(out, "#C tolerance = {}", request.tolerance)?;
    writeln!(out, "#C ccmin = {}", request.ccmin.unwrap_or(-1.0))?;
    writeln!(out, "#C rmin = {}", bounds.rmin)?;
    writeln!(out, "#C rmax = {}", bounds.rmax)?;
    writeln!(out, "#S 1")?;
    writeln!(out, "#L codid  correlation")?;

    let candidates: CurveIter<'_> = match &request.composition {
        None => store.iter_all()?,
        Some(comp) => {
            let filter = filter.ok_or_else(|| PdfError::ConfigError {
                reason: "composition search requires an external composition index".to_string(),
            })?;
            candidates_filtered(store, filter.candidates(comp, request.tolerance)?)
        }
    };

    let hits = correlate_stream(&fc, candidates, request.ccmin);
    let mut emitted = 0usize;
    if request.sort {
        // Sorting is the one place the result set is materialized.
        let mut buffered: Vec<SearchHit> = hits.collect::<PdfResult<_>>()?;
        sort_hits(&mut buffered);
        for hit in buffered {
            writeln!(out, "{} {}", hit.id, hit.cc)?;
            emitted += 1;
        }
    } else {
        for hit in hits {
            let hit = hit?;
            writeln!(out, "{} {}", hit.id, hit.cc)?;
            emitted += 1;
        }
    }
    info!(results = emitted, "search finished");
    Ok(())
}
