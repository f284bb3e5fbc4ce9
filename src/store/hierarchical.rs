//! Single-container-file curve store.
//!
//! One file holds everything: the calculator configuration (a tagged
//! metadata tree), the canonical grid, and one curve record per COD id
//! under the fixed `cod<7-digit-id>` entry name.
//!
//! # Container format
//!
//! - Header (8 bytes): magic `CPDF`, format version (u32 LE)
//! - Records, back to back:
//!   - config: tag 1, payload length (u64 LE), JSON-encoded metadata tree
//!   - grid: tag 2, point count (u64 LE), f64 LE values
//!   - curve: tag 3, name length (u16 LE), UTF-8 entry name,
//!     point count (u64 LE), f32 LE values
//!
//! Records are append-only; the latest record for a name wins, which gives
//! overwrite-by-id semantics without rewriting the file. Every mutating
//! call is its own open, append, flush, close transaction, so writes are
//! atomic at entry granularity. Concurrent readers are safe with each
//! other; writer exclusivity is caller discipline.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::calculator::CalculatorConfig;
use crate::error::{PdfError, PdfResult};
use crate::grid;
use crate::metadata::ConfigTree;
use crate::store::{CurveIter, CurveStore};
use crate::types::CodId;

/// Magic bytes identifying a container file.
const MAGIC_BYTES: &[u8; 4] = b"CPDF";

/// Current container format version.
const FORMAT_VERSION: u32 = 1;

const HEADER_SIZE: u64 = 8;

const TAG_CONFIG: u8 = 1;
const TAG_GRID: u8 = 2;
const TAG_CURVE: u8 = 3;

/// Location of a record payload inside the container.
#[derive(Debug, Clone)]
struct Slot {
    name: String,
    /// Offset of the f32 data, past name and count fields.
    offset: u64,
    count: usize,
}

/// Read/write curve store backed by a single container file.
#[derive(Debug)]
pub struct HierarchicalStore {
    path: PathBuf,
    /// Curve slots in first-appearance order; overwrites update in place.
    entries: Vec<Slot>,
    index: HashMap<String, usize>,
    /// Offset and length of the latest config record payload.
    config_slot: Option<(u64, usize)>,
    /// Offset and point count of the latest grid record payload.
    grid_slot: Option<(u64, usize)>,
    grid_cache: RwLock<Option<Arc<[f64]>>>,
}

impl HierarchicalStore {
    /// Creates an empty container, failing if the file already exists.
    pub fn create(path: impl AsRef<Path>) -> PdfResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::create_new(&path)?;
        write_header(&mut file)?;
        file.flush()?;
        Ok(Self {
            path,
            entries: Vec::new(),
            index: HashMap::new(),
            config_slot: None,
            grid_slot: None,
            grid_cache: RwLock::new(None),
        })
    }

    /// Opens an existing container, scanning its record stream once to
    /// build the id index.
    pub fn open(path: impl AsRef<Path>) -> PdfResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(PdfError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("container file not found: {}", path.display()),
            )));
        }
        let mut store = Self {
            path,
            entries: Vec::new(),
            index: HashMap::new(),
            config_slot: None,
            grid_slot: None,
            grid_cache: RwLock::new(None),
        };
        store.scan()?;
        Ok(store)
    }

    /// Opens the container at `path`, creating it when absent.
    pub fn open_or_create(path: impl AsRef<Path>) -> PdfResult<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Number of stored curve entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(&mut self) -> PdfResult<()> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| self.invalid("file too short"))?;
        if &magic != MAGIC_BYTES {
            return Err(self.invalid("bad magic bytes"));
        }
        let version = read_u32(&mut reader)?;
        if version != FORMAT_VERSION {
            return Err(PdfError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }

        let mut pos = HEADER_SIZE;
        loop {
            let mut tag = [0u8; 1];
            match reader.read_exact(&mut tag) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            pos += 1;
            match tag[0] {
                TAG_CONFIG => {
                    let len = read_u64(&mut reader)? as usize;
                    pos += 8;
                    self.config_slot = Some((pos, len));
                    skip(&mut reader, len as u64)?;
                    pos += len as u64;
                }
                TAG_GRID => {
                    let count = read_u64(&mut reader)? as usize;
                    pos += 8;
                    self.grid_slot = Some((pos, count));
                    skip(&mut reader, count as u64 * 8)?;
                    pos += count as u64 * 8;
                }
                TAG_CURVE => {
                    let name_len = read_u16(&mut reader)? as usize;
                    let mut name = vec![0u8; name_len];
                    reader.read_exact(&mut name)?;
                    let name = String::from_utf8(name)
                        .map_err(|_| self.invalid("entry name is not UTF-8"))?;
                    let count = read_u64(&mut reader)? as usize;
                    pos += 2 + name_len as u64 + 8;
                    let slot = Slot {
                        name: name.clone(),
                        offset: pos,
                        count,
                    };
                    match self.index.get(&name) {
                        // Overwrite keeps the original storage position.
                        Some(&i) => self.entries[i] = slot,
                        None => {
                            self.index.insert(name, self.entries.len());
                            self.entries.push(slot);
                        }
                    }
                    skip(&mut reader, count as u64 * 4)?;
                    pos += count as u64 * 4;
                }
                other => {
                    return Err(self.invalid(&format!("unknown record tag {other}")));
                }
            }
        }
        debug!(
            entries = self.entries.len(),
            path = %self.path.display(),
            "scanned container"
        );
        Ok(())
    }

    fn invalid(&self, reason: &str) -> PdfError {
        PdfError::InvalidFormat {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Opens the container for one appending write.
    fn open_append(&self) -> PdfResult<(File, u64)> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let end = file.seek(SeekFrom::End(0))?;
        Ok((file, end))
    }

    fn read_grid(&self) -> PdfResult<Arc<[f64]>> {
        let (offset, count) = self.grid_slot.ok_or(PdfError::MissingGrid)?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; count * 8];
        file.read_exact(&mut bytes)?;
        let grid: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().expect("8-byte chunk")))
            .collect();
        Ok(grid.into())
    }
}

impl CurveStore for HierarchicalStore {
    fn write_config(&mut self, config: &CalculatorConfig, rgrid: &[f64]) -> PdfResult<()> {
        grid::grid_step(rgrid)?;
        let payload = serde_json::to_vec(&config.to_tree())?;

        let (mut file, end) = self.open_append()?;
        let mut buf = Vec::with_capacity(payload.len() + rgrid.len() * 8 + 32);
        buf.push(TAG_CONFIG);
        buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        buf.extend_from_slice(&payload);
        let grid_data_offset = end + buf.len() as u64 + 1 + 8;
        buf.push(TAG_GRID);
        buf.extend_from_slice(&(rgrid.len() as u64).to_le_bytes());
        for &x in rgrid {
            buf.extend_from_slice(&x.to_le_bytes());
        }
        file.write_all(&buf)?;
        file.flush()?;
        drop(file);

        self.config_slot = Some((end + 9, payload.len()));
        self.grid_slot = Some((grid_data_offset, rgrid.len()));
        *self.grid_cache.write() = Some(rgrid.to_vec().into());
        Ok(())
    }

    fn write_pdf(&mut self, id: CodId, r: &[f64], g: &[f32]) -> PdfResult<()> {
        let rcod = self.rgrid()?;
        grid::validate_same_grid(r, &rcod)?;
        if g.len() != r.len() {
            return Err(PdfError::GridMismatch {
                reason: format!("curve has {} g values for {} grid points", g.len(), r.len()),
            });
        }
        let name = id.entry_name();

        let (mut file, end) = self.open_append()?;
        let mut buf = Vec::with_capacity(g.len() * 4 + name.len() + 16);
        buf.push(TAG_CURVE);
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(g.len() as u64).to_le_bytes());
        let data_offset = end + buf.len() as u64;
        for &x in g {
            buf.extend_from_slice(&x.to_le_bytes());
        }
        file.write_all(&buf)?;
        file.flush()?;
        drop(file);

        let slot = Slot {
            name: name.clone(),
            offset: data_offset,
            count: g.len(),
        };
        match self.index.get(&name) {
            Some(&i) => self.entries[i] = slot,
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(slot);
            }
        }
        Ok(())
    }

    fn read_pdf(&self, id: CodId) -> PdfResult<(Arc<[f64]>, Vec<f32>)> {
        let slot = self
            .index
            .get(&id.entry_name())
            .map(|&i| &self.entries[i])
            .ok_or_else(|| PdfError::EntryNotFound { id: id.to_string() })?;
        let mut file = File::open(&self.path)?;
        let g = read_curve_at(&mut file, slot.offset, slot.count)?;
        Ok((self.rgrid()?, g))
    }

    fn rgrid(&self) -> PdfResult<Arc<[f64]>> {
        if let Some(grid) = self.grid_cache.read().as_ref() {
            return Ok(Arc::clone(grid));
        }
        let grid = self.read_grid()?;
        *self.grid_cache.write() = Some(Arc::clone(&grid));
        Ok(grid)
    }

    fn iter_all(&self) -> PdfResult<CurveIter<'_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(ContainerIter {
            file,
            entries: &self.entries,
            next: 0,
        }))
    }

    fn calculator_config(&self) -> PdfResult<Option<CalculatorConfig>> {
        let Some((offset, len)) = self.config_slot else {
            return Ok(None);
        };
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;
        let tree: ConfigTree = serde_json::from_slice(&bytes)?;
        CalculatorConfig::from_tree(&tree).map(Some)
    }
}

/// Pull iterator over container entries; owns its file handle, which is
/// closed when the iterator is dropped, including on early abandonment.
struct ContainerIter<'a> {
    file: File,
    entries: &'a [Slot],
    next: usize,
}

impl Iterator for ContainerIter<'_> {
    type Item = PdfResult<(CodId, Vec<f32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.entries.get(self.next)?;
        self.next += 1;
        let result = CodId::parse(&slot.name).and_then(|id| {
            read_curve_at(&mut self.file, slot.offset, slot.count).map(|g| (id, g))
        });
        Some(result)
    }
}

fn read_curve_at(file: &mut File, offset: u64, count: usize) -> PdfResult<Vec<f32>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = vec![0u8; count * 4];
    file.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().expect("4-byte chunk")))
        .collect())
}

fn write_header(file: &mut File) -> io::Result<()> {
    file.write_all(MAGIC_BYTES)?;
    file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    Ok(())
}

fn read_u16(reader: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn skip(reader: &mut BufReader<File>, len: u64) -> io::Result<()> {
    reader.seek_relative(len as i64)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::CalculatorKind;
    use crate::grid::{DEFAULT_RSTEP, uniform_grid};
    use tempfile::TempDir;

    fn test_config() -> CalculatorConfig {
        let mut cfg = CalculatorConfig::new(CalculatorKind::PdfCalculator);
        cfg.params.insert("qmax".to_string(), 25.0);
        cfg.envelopes = vec!["scale".to_string()];
        cfg
    }

    fn new_store(dir: &TempDir) -> HierarchicalStore {
        let mut store = HierarchicalStore::create(dir.path().join("pdfs.cpdf")).unwrap();
        let rgrid = uniform_grid(0.0, 10.0, DEFAULT_RSTEP);
        store.write_config(&test_config(), &rgrid).unwrap();
        store
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);
        let rgrid = store.rgrid().unwrap();
        let g: Vec<f32> = (0..rgrid.len()).map(|i| (i as f32).sin()).collect();
        let id = CodId::new(1234567).unwrap();
        store.write_pdf(id, &rgrid, &g).unwrap();

        let (r, g2) = store.read_pdf(id).unwrap();
        assert_eq!(r.len(), rgrid.len());
        assert_eq!(g2, g);
    }

    #[test]
    fn test_reopen_sees_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pdfs.cpdf");
        let id = CodId::new(2000001).unwrap();
        let g;
        {
            let mut store = HierarchicalStore::create(&path).unwrap();
            let rgrid = uniform_grid(0.0, 5.0, DEFAULT_RSTEP);
            store.write_config(&test_config(), &rgrid).unwrap();
            g = vec![0.25f32; rgrid.len()];
            store.write_pdf(id, &rgrid, &g).unwrap();
        }
        let store = HierarchicalStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        let (_, g2) = store.read_pdf(id).unwrap();
        assert_eq!(g2, g);
        let cfg = store.calculator_config().unwrap().unwrap();
        assert_eq!(cfg, test_config());
    }

    #[test]
    fn test_overwrite_keeps_storage_order() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);
        let rgrid = store.rgrid().unwrap();
        let a = CodId::new(1000001).unwrap();
        let b = CodId::new(1000002).unwrap();
        store.write_pdf(a, &rgrid, &vec![1.0; rgrid.len()]).unwrap();
        store.write_pdf(b, &rgrid, &vec![2.0; rgrid.len()]).unwrap();
        store.write_pdf(a, &rgrid, &vec![3.0; rgrid.len()]).unwrap();

        let items: Vec<_> = store
            .iter_all()
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, a);
        assert_eq!(items[0].1[0], 3.0);
        assert_eq!(items[1].0, b);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);
        let rgrid = store.rgrid().unwrap();
        for i in 0..3 {
            let id = CodId::new(1000001 + i).unwrap();
            store.write_pdf(id, &rgrid, &vec![i as f32; rgrid.len()]).unwrap();
        }
        let first: Vec<_> = store.iter_all().unwrap().take(1).collect();
        assert_eq!(first.len(), 1);
        let full: Vec<_> = store.iter_all().unwrap().collect();
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn test_mismatched_grid_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);
        let wrong = uniform_grid(0.0, 10.0, 0.02);
        let id = CodId::new(1234567).unwrap();
        assert!(matches!(
            store.write_pdf(id, &wrong, &vec![0.0; wrong.len()]),
            Err(PdfError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_entry_and_missing_grid() {
        let dir = TempDir::new().unwrap();
        let store = HierarchicalStore::create(dir.path().join("empty.cpdf")).unwrap();
        assert!(matches!(store.rgrid(), Err(PdfError::MissingGrid)));
        let populated = new_store(&dir);
        assert!(matches!(
            populated.read_pdf(CodId::new(7777777).unwrap()),
            Err(PdfError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_config_rewrite_replaces_grid() {
        let dir = TempDir::new().unwrap();
        let mut store = new_store(&dir);
        assert_eq!(store.rgrid().unwrap().len(), 1001);
        let shorter = uniform_grid(0.0, 5.0, DEFAULT_RSTEP);
        store.write_config(&test_config(), &shorter).unwrap();
        assert_eq!(store.rgrid().unwrap().len(), 501);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.cpdf");
        std::fs::write(&path, b"not a container at all").unwrap();
        assert!(matches!(
            HierarchicalStore::open(&path),
            Err(PdfError::InvalidFormat { .. })
        ));
    }
}
