//! Flat curve store: descriptor sidecar plus a dense memory-mapped matrix.
//!
//! Three files share one base name:
//! - `<base>.toml` — descriptor: grid bounds and step, matrix shape,
//!   element type, free-form calculator parameters
//! - `<base>.ids` — one little-endian u32 COD id per matrix row
//! - `<base>.mat` — row-major f32 LE matrix, one curve per row
//!
//! The matrix is memory-mapped read-only, so opening a store with millions
//! of rows costs no bulk I/O and concurrent readers share the mapping
//! safely. This backend is read-only at the [`CurveStore`] level; stores
//! are produced offline by [`FlatStoreWriter`].

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculator::CalculatorConfig;
use crate::error::{PdfError, PdfResult};
use crate::grid;
use crate::metadata::ConfigTree;
use crate::store::{CurveIter, CurveStore};
use crate::types::CodId;

const BACKEND: &str = "flat";
const ELEMENT_TYPE: &str = "f32";
const BYTES_PER_ELEMENT: usize = 4;

/// Grid section of the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GridSpec {
    rmin: f64,
    rmax: f64,
    rstep: f64,
}

/// Matrix section of the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatrixSpec {
    rows: usize,
    cols: usize,
    dtype: String,
}

/// Sidecar descriptor persisted as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Descriptor {
    grid: GridSpec,
    matrix: MatrixSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calculator: Option<toml::Table>,
}

fn sibling(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Read-only curve store over a descriptor, id array, and mmapped matrix.
#[derive(Debug)]
pub struct FlatStore {
    base: PathBuf,
    descriptor: Descriptor,
    ids: Vec<CodId>,
    rows: HashMap<CodId, usize>,
    mmap: Mmap,
    grid_cache: RwLock<Option<Arc<[f64]>>>,
}

impl FlatStore {
    /// Opens the store at `base`, validating descriptor, id array, and
    /// matrix shape against each other.
    pub fn open(base: impl AsRef<Path>) -> PdfResult<Self> {
        let base = base.as_ref().to_path_buf();
        let descriptor_path = sibling(&base, "toml");
        let descriptor: Descriptor =
            toml::from_str(&std::fs::read_to_string(&descriptor_path)?)?;
        if descriptor.matrix.dtype != ELEMENT_TYPE {
            return Err(PdfError::InvalidFormat {
                path: descriptor_path,
                reason: format!(
                    "unsupported element type '{}', expected '{ELEMENT_TYPE}'",
                    descriptor.matrix.dtype
                ),
            });
        }
        let g = &descriptor.grid;
        let derived_len = grid::grid_len(g.rmin, g.rmax, g.rstep);
        if derived_len != descriptor.matrix.cols {
            return Err(PdfError::InvalidFormat {
                path: descriptor_path,
                reason: format!(
                    "derived grid has {derived_len} points but matrix rows are {} wide",
                    descriptor.matrix.cols
                ),
            });
        }

        let ids_path = sibling(&base, "ids");
        let id_bytes = std::fs::read(&ids_path)?;
        if id_bytes.len() != descriptor.matrix.rows * 4 {
            return Err(PdfError::InvalidFormat {
                path: ids_path,
                reason: format!(
                    "id array holds {} bytes for {} rows",
                    id_bytes.len(),
                    descriptor.matrix.rows
                ),
            });
        }
        let mut ids = Vec::with_capacity(descriptor.matrix.rows);
        let mut rows = HashMap::with_capacity(descriptor.matrix.rows);
        for (i, chunk) in id_bytes.chunks_exact(4).enumerate() {
            let id = CodId::from_bytes(chunk.try_into().expect("4-byte chunk"))?;
            ids.push(id);
            rows.insert(id, i);
        }

        let matrix_path = sibling(&base, "mat");
        let file = File::open(&matrix_path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let expected = descriptor.matrix.rows * descriptor.matrix.cols * BYTES_PER_ELEMENT;
        if mmap.len() != expected {
            return Err(PdfError::InvalidFormat {
                path: matrix_path,
                reason: format!("matrix is {} bytes, shape requires {expected}", mmap.len()),
            });
        }
        debug!(
            rows = descriptor.matrix.rows,
            cols = descriptor.matrix.cols,
            base = %base.display(),
            "opened flat store"
        );
        Ok(Self {
            base,
            descriptor,
            ids,
            rows,
            mmap,
            grid_cache: RwLock::new(None),
        })
    }

    /// Number of curve rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn row(&self, i: usize) -> Vec<f32> {
        let cols = self.descriptor.matrix.cols;
        let start = i * cols * BYTES_PER_ELEMENT;
        self.mmap[start..start + cols * BYTES_PER_ELEMENT]
            .chunks_exact(BYTES_PER_ELEMENT)
            .map(|c| f32::from_le_bytes(c.try_into().expect("4-byte chunk")))
            .collect()
    }
}

impl CurveStore for FlatStore {
    fn write_config(&mut self, _config: &CalculatorConfig, _rgrid: &[f64]) -> PdfResult<()> {
        Err(PdfError::Unsupported {
            backend: BACKEND,
            operation: "write_config",
        })
    }

    fn write_pdf(&mut self, _id: CodId, _r: &[f64], _g: &[f32]) -> PdfResult<()> {
        Err(PdfError::Unsupported {
            backend: BACKEND,
            operation: "write_pdf",
        })
    }

    fn read_pdf(&self, id: CodId) -> PdfResult<(Arc<[f64]>, Vec<f32>)> {
        let &row = self
            .rows
            .get(&id)
            .ok_or_else(|| PdfError::EntryNotFound { id: id.to_string() })?;
        Ok((self.rgrid()?, self.row(row)))
    }

    fn rgrid(&self) -> PdfResult<Arc<[f64]>> {
        if let Some(grid) = self.grid_cache.read().as_ref() {
            return Ok(Arc::clone(grid));
        }
        let g = &self.descriptor.grid;
        let grid: Arc<[f64]> = grid::uniform_grid(g.rmin, g.rmax, g.rstep).into();
        *self.grid_cache.write() = Some(Arc::clone(&grid));
        Ok(grid)
    }

    fn iter_all(&self) -> PdfResult<CurveIter<'_>> {
        Ok(Box::new(
            self.ids
                .iter()
                .enumerate()
                .map(move |(i, &id)| Ok((id, self.row(i)))),
        ))
    }

    fn calculator_config(&self) -> PdfResult<Option<CalculatorConfig>> {
        match &self.descriptor.calculator {
            None => Ok(None),
            Some(table) if table.is_empty() => Ok(None),
            Some(table) => {
                let tree = ConfigTree::from(toml::Value::Table(table.clone()));
                CalculatorConfig::from_tree(&tree).map(Some)
            }
        }
    }
}

/// Streaming builder for flat stores.
///
/// Rows are appended to the matrix and id files as they arrive, so a store
/// can be built from a source larger than memory; `finish` writes the
/// descriptor last.
pub struct FlatStoreWriter {
    base: PathBuf,
    grid: GridSpec,
    cols: usize,
    calculator: Option<toml::Table>,
    ids: Vec<CodId>,
    seen: HashSet<CodId>,
    matrix: BufWriter<File>,
}

impl FlatStoreWriter {
    /// Starts a new store at `base` with the given canonical grid.
    pub fn create(
        base: impl AsRef<Path>,
        rgrid: &[f64],
        calculator: Option<&CalculatorConfig>,
    ) -> PdfResult<Self> {
        let base = base.as_ref().to_path_buf();
        let rstep = grid::grid_step(rgrid)?;
        let grid = GridSpec {
            rmin: rgrid[0],
            rmax: rgrid[rgrid.len() - 1],
            rstep,
        };
        let calculator = calculator.map(|cfg| match toml::Value::from(cfg.to_tree()) {
            toml::Value::Table(table) => table,
            _ => unreachable!("calculator tree serializes to a mapping"),
        });
        let matrix = BufWriter::new(File::create(sibling(&base, "mat"))?);
        Ok(Self {
            base,
            grid,
            cols: rgrid.len(),
            calculator,
            ids: Vec::new(),
            seen: HashSet::new(),
            matrix,
        })
    }

    /// Appends one curve row. Ids must be unique and rows must span the
    /// full grid.
    pub fn append(&mut self, id: CodId, g: &[f32]) -> PdfResult<()> {
        if g.len() != self.cols {
            return Err(PdfError::GridMismatch {
                reason: format!("row has {} points, grid has {}", g.len(), self.cols),
            });
        }
        if !self.seen.insert(id) {
            return Err(PdfError::ConfigError {
                reason: format!("duplicate id {id} in flat store build"),
            });
        }
        for &x in g {
            self.matrix.write_all(&x.to_le_bytes())?;
        }
        self.ids.push(id);
        Ok(())
    }

    /// Flushes the matrix and writes the id array and descriptor.
    pub fn finish(mut self) -> PdfResult<()> {
        self.matrix.flush()?;
        drop(self.matrix);

        let mut id_bytes = Vec::with_capacity(self.ids.len() * 4);
        for id in &self.ids {
            id_bytes.extend_from_slice(&id.to_bytes());
        }
        std::fs::write(sibling(&self.base, "ids"), id_bytes)?;

        let descriptor = Descriptor {
            grid: self.grid,
            matrix: MatrixSpec {
                rows: self.ids.len(),
                cols: self.cols,
                dtype: ELEMENT_TYPE.to_string(),
            },
            calculator: self.calculator,
        };
        std::fs::write(sibling(&self.base, "toml"), toml::to_string(&descriptor)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::CalculatorKind;
    use crate::grid::{DEFAULT_RSTEP, EPS, uniform_grid};
    use tempfile::TempDir;

    fn build_store(dir: &TempDir) -> PathBuf {
        let base = dir.path().join("codpdfs");
        let rgrid = uniform_grid(0.0, 10.0, DEFAULT_RSTEP);
        let mut cfg = CalculatorConfig::new(CalculatorKind::DebyePdfCalculator);
        cfg.params.insert("qmax".to_string(), 24.0);
        let mut writer = FlatStoreWriter::create(&base, &rgrid, Some(&cfg)).unwrap();
        for i in 0..3u32 {
            let id = CodId::new(1000001 + i).unwrap();
            let g: Vec<f32> = (0..rgrid.len()).map(|j| (i * 7 + j as u32) as f32).collect();
            writer.append(id, &g).unwrap();
        }
        writer.finish().unwrap();
        base
    }

    #[test]
    fn test_build_open_read() {
        let dir = TempDir::new().unwrap();
        let base = build_store(&dir);
        let store = FlatStore::open(&base).unwrap();
        assert_eq!(store.len(), 3);

        let rgrid = store.rgrid().unwrap();
        assert_eq!(rgrid.len(), 1001);
        assert!((rgrid[1] - rgrid[0] - DEFAULT_RSTEP).abs() < EPS);

        let (_, g) = store.read_pdf(CodId::new(1000002).unwrap()).unwrap();
        assert_eq!(g[0], 7.0);
        assert_eq!(g[5], 12.0);
    }

    #[test]
    fn test_iteration_in_row_order() {
        let dir = TempDir::new().unwrap();
        let store = FlatStore::open(build_store(&dir)).unwrap();
        let ids: Vec<u32> = store
            .iter_all()
            .unwrap()
            .map(|r| r.unwrap().0.get())
            .collect();
        assert_eq!(ids, vec![1000001, 1000002, 1000003]);
    }

    #[test]
    fn test_missing_id() {
        let dir = TempDir::new().unwrap();
        let store = FlatStore::open(build_store(&dir)).unwrap();
        assert!(matches!(
            store.read_pdf(CodId::new(9999999).unwrap()),
            Err(PdfError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_writes_unsupported() {
        let dir = TempDir::new().unwrap();
        let mut store = FlatStore::open(build_store(&dir)).unwrap();
        let rgrid = store.rgrid().unwrap().to_vec();
        let id = CodId::new(1234567).unwrap();
        assert!(matches!(
            store.write_pdf(id, &rgrid, &vec![0.0; rgrid.len()]),
            Err(PdfError::Unsupported { .. })
        ));
        let cfg = CalculatorConfig::new(CalculatorKind::PdfCalculator);
        assert!(matches!(
            store.write_config(&cfg, &rgrid),
            Err(PdfError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_calculator_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FlatStore::open(build_store(&dir)).unwrap();
        let cfg = store.calculator_config().unwrap().unwrap();
        assert_eq!(cfg.kind, CalculatorKind::DebyePdfCalculator);
        assert_eq!(cfg.params.get("qmax"), Some(&24.0));
    }

    #[test]
    fn test_truncated_matrix_rejected() {
        let dir = TempDir::new().unwrap();
        let base = build_store(&dir);
        let mat = sibling(&base, "mat");
        let bytes = std::fs::read(&mat).unwrap();
        std::fs::write(&mat, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            FlatStore::open(&base),
            Err(PdfError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_writer_rejects_bad_rows() {
        let dir = TempDir::new().unwrap();
        let rgrid = uniform_grid(0.0, 1.0, DEFAULT_RSTEP);
        let mut writer =
            FlatStoreWriter::create(dir.path().join("s"), &rgrid, None).unwrap();
        let id = CodId::new(1000001).unwrap();
        writer.append(id, &vec![0.0; rgrid.len()]).unwrap();
        assert!(writer.append(id, &vec![0.0; rgrid.len()]).is_err());
        let other = CodId::new(1000002).unwrap();
        assert!(writer.append(other, &[0.0, 1.0]).is_err());
    }
}
