#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

use codpdf::calculator::{CalculatorConfig, CalculatorKind};
use codpdf::grid::{DEFAULT_RSTEP, uniform_grid};
use codpdf::store::{CurveStore, HierarchicalStore};
use codpdf::types::CodId;

/// Hierarchical store in a temp directory, prefilled with the canonical
/// [0, 10] grid at the default step.
pub struct TestStore {
    pub dir: TempDir,
    pub store: HierarchicalStore,
    pub rgrid: Vec<f64>,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut store =
            HierarchicalStore::create(dir.path().join("pdfs.cpdf")).expect("create store");
        let rgrid = uniform_grid(0.0, 10.0, DEFAULT_RSTEP);
        let mut cfg = CalculatorConfig::new(CalculatorKind::PdfCalculator);
        cfg.params.insert("qmax".to_string(), 25.0);
        store.write_config(&cfg, &rgrid).expect("write config");
        Self { dir, store, rgrid }
    }

    pub fn add_curve(&mut self, id: u32, g: &[f32]) -> CodId {
        let id = CodId::new(id).expect("valid id");
        let rgrid = self.rgrid.clone();
        self.store.write_pdf(id, &rgrid, g).expect("write pdf");
        id
    }

    /// Writes a two-column observed data file and returns its path.
    pub fn write_observed(&self, name: &str, r: &[f64], g: &[f32]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut text = String::from("# codpdf test data\n");
        for (x, y) in r.iter().zip(g) {
            text.push_str(&format!("{x} {y}\n"));
        }
        std::fs::write(&path, text).expect("write observed file");
        path
    }
}

/// Unit-height Gaussian peak sampled on `r`.
pub fn gaussian(r: &[f64], center: f64, width: f64) -> Vec<f32> {
    r.iter()
        .map(|&x| (-((x - center) / width).powi(2)).exp() as f32)
        .collect()
}

/// Deterministic flat-noise curve in [-1, 1].
pub fn noise(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / (1u64 << 30) as f32) - 1.0
        })
        .collect()
}

/// Parses result lines from search output, skipping the header block.
pub fn result_lines(output: &str) -> Vec<(String, f32)> {
    output
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(|line| {
            let mut cols = line.split_whitespace();
            let id = cols.next().expect("id column").to_string();
            let cc: f32 = cols.next().expect("cc column").parse().expect("cc value");
            (id, cc)
        })
        .collect()
}
