//! Layered settings for the search tool.
//!
//! Values come from defaults, then an optional `codpdf.toml` file, then
//! `CODPDF_`-prefixed environment variables (double underscore separates
//! nested levels, e.g. `CODPDF_HDF_STORE=/data/pdfs.cpdf`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::calculator::CalculatorConfig;
use crate::error::{PdfError, PdfResult};
use crate::metadata::ConfigTree;

pub const CONFIG_FILE_NAME: &str = "codpdf.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the hierarchical container file
    #[serde(default = "default_hdf_store")]
    pub hdf_store: PathBuf,

    /// Base path of the flat store files (.toml/.ids/.mat)
    #[serde(default = "default_flat_store")]
    pub flat_store: PathBuf,

    /// Calculator configuration used when (re)initializing a store
    #[serde(default)]
    pub calculator: toml::Table,
}

fn default_version() -> u32 {
    1
}

fn default_hdf_store() -> PathBuf {
    PathBuf::from("codpdf.cpdf")
}

fn default_flat_store() -> PathBuf {
    PathBuf::from("codpdf-raw")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            hdf_store: default_hdf_store(),
            flat_store: default_flat_store(),
            calculator: toml::Table::new(),
        }
    }
}

impl Settings {
    /// Loads settings with the default > file > environment layering.
    pub fn load(config_path: Option<&Path>) -> PdfResult<Self> {
        let figment = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match config_path {
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => figment.merge(Toml::file(CONFIG_FILE_NAME)),
        };
        figment
            .merge(Env::prefixed("CODPDF_").split("__"))
            .extract()
            .map_err(|e| PdfError::ConfigError {
                reason: e.to_string(),
            })
    }

    /// The calculator configuration from settings, if one is present.
    pub fn calculator_config(&self) -> PdfResult<Option<CalculatorConfig>> {
        if self.calculator.is_empty() {
            return Ok(None);
        }
        let tree = ConfigTree::from(toml::Value::Table(self.calculator.clone()));
        CalculatorConfig::from_tree(&tree).map(Some)
    }

    /// Serializes the active settings as TOML.
    pub fn to_toml(&self) -> PdfResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
