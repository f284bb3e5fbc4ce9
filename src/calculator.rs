//! Typed description of the PDF calculator that produced a store.
//!
//! The calculator itself is an external physics engine; the store only
//! keeps its configuration as provenance metadata. Instead of injecting
//! arbitrary key/value pairs into an engine object, the configuration is an
//! explicit structure validated against a fixed field list, built from a
//! [`ConfigTree`] by a builder that reports unknown keys rather than
//! silently dropping them.

use crate::error::{PdfError, PdfResult};
use crate::metadata::{ConfigScalar, ConfigTree};
use std::collections::BTreeMap;
use tracing::debug;

/// Conversion factor between a Gaussian sigma and its FWHM.
const GAUSS_SIGMA_TO_FWHM: f64 = 2.354820045030949; // 2 * sqrt(2 * ln 2)

/// Numeric attributes that are derived quantities on the engine side and
/// must not be fed back into it.
const EXCLUDED_PARAMS: &[&str] = &["slope"];

/// Component selectors the engine exposes as typed attributes.
const TYPED_ATTRS: &[&str] = &[
    "baseline",
    "peakprofile",
    "peakwidthmodel",
    "scatteringfactortable",
    "evaluatortype",
];

/// Supported calculator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculatorKind {
    PdfCalculator,
    DebyePdfCalculator,
}

impl CalculatorKind {
    /// Engine-side class name.
    pub fn name(self) -> &'static str {
        match self {
            CalculatorKind::PdfCalculator => "PDFCalculator",
            CalculatorKind::DebyePdfCalculator => "DebyePDFCalculator",
        }
    }

    pub fn from_name(name: &str) -> PdfResult<Self> {
        match name {
            "PDFCalculator" => Ok(CalculatorKind::PdfCalculator),
            "DebyePDFCalculator" => Ok(CalculatorKind::DebyePdfCalculator),
            other => Err(PdfError::ConfigError {
                reason: format!("invalid calculator type '{other}'"),
            }),
        }
    }
}

/// Calculator configuration persisted alongside a curve store.
///
/// The numeric `params` map is opaque to the search core; it only
/// round-trips through the store metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorConfig {
    pub kind: CalculatorKind,
    pub versions: BTreeMap<String, String>,
    pub baseline: Option<String>,
    pub peakprofile: Option<String>,
    pub peakwidthmodel: Option<String>,
    pub scatteringfactortable: Option<String>,
    pub evaluatortype: Option<String>,
    pub envelopes: Vec<String>,
    pub params: BTreeMap<String, f64>,
}

impl CalculatorConfig {
    pub fn new(kind: CalculatorKind) -> Self {
        Self {
            kind,
            versions: BTreeMap::new(),
            baseline: None,
            peakprofile: None,
            peakwidthmodel: None,
            scatteringfactortable: None,
            evaluatortype: None,
            envelopes: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Builds from a metadata tree, logging unknown keys at debug level.
    pub fn from_tree(tree: &ConfigTree) -> PdfResult<Self> {
        Ok(CalculatorConfigBuilder::from_tree(tree)?.build())
    }

    /// Serializes back into a metadata tree.
    ///
    /// When the peak-width model is `constant`, the derived `uisowidth`
    /// parameter is emitted alongside `width` for engine-side convenience.
    pub fn to_tree(&self) -> ConfigTree {
        let mut root = BTreeMap::new();
        root.insert("class".to_string(), ConfigTree::text(self.kind.name()));
        if !self.versions.is_empty() {
            let versions = self
                .versions
                .iter()
                .map(|(k, v)| (k.clone(), ConfigTree::text(v.clone())))
                .collect();
            root.insert("version".to_string(), ConfigTree::Mapping(versions));
        }
        let typed = [
            ("baseline", &self.baseline),
            ("peakprofile", &self.peakprofile),
            ("peakwidthmodel", &self.peakwidthmodel),
            ("scatteringfactortable", &self.scatteringfactortable),
            ("evaluatortype", &self.evaluatortype),
        ];
        for (name, value) in typed {
            if let Some(v) = value {
                root.insert(name.to_string(), ConfigTree::text(v.clone()));
            }
        }
        if !self.envelopes.is_empty() {
            let items = self.envelopes.iter().cloned().map(ConfigTree::text).collect();
            root.insert("envelopes".to_string(), ConfigTree::Sequence(items));
        }
        for (name, &value) in &self.params {
            root.insert(name.clone(), ConfigTree::float(value));
        }
        if self.peakwidthmodel.as_deref() == Some("constant")
            && let Some(&width) = self.params.get("width")
        {
            root.insert("uisowidth".to_string(), ConfigTree::float(fwhm_to_uiso(width)));
        }
        ConfigTree::Mapping(root)
    }
}

/// Builder that consumes a metadata tree and tracks the keys it could not
/// place.
#[derive(Debug)]
pub struct CalculatorConfigBuilder {
    config: CalculatorConfig,
    unknown: Vec<String>,
}

impl CalculatorConfigBuilder {
    pub fn from_tree(tree: &ConfigTree) -> PdfResult<Self> {
        let ConfigTree::Mapping(map) = tree else {
            return Err(PdfError::ConfigError {
                reason: "calculator configuration must be a mapping".to_string(),
            });
        };
        let class = map
            .get("class")
            .and_then(ConfigTree::as_str)
            .ok_or_else(|| PdfError::ConfigError {
                reason: "calculator configuration has no 'class' entry".to_string(),
            })?;
        let mut config = CalculatorConfig::new(CalculatorKind::from_name(class)?);
        let mut unknown = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                "class" => {}
                "version" => {
                    if let ConfigTree::Mapping(versions) = value {
                        for (component, v) in versions {
                            let text = match v {
                                ConfigTree::Scalar(ConfigScalar::Text(s)) => s.clone(),
                                other => other
                                    .as_f64()
                                    .map(|x| x.to_string())
                                    .unwrap_or_default(),
                            };
                            config.versions.insert(component.clone(), text);
                        }
                    } else {
                        unknown.push(key.clone());
                    }
                }
                "envelopes" => match value {
                    ConfigTree::Sequence(items) => {
                        config.envelopes = items
                            .iter()
                            .filter_map(|t| t.as_str().map(str::to_string))
                            .collect();
                    }
                    _ => unknown.push(key.clone()),
                },
                // Translate the derived uisowidth into the engine width.
                "uisowidth" => match value.as_f64() {
                    Some(uiso) => {
                        config.params.insert("width".to_string(), uiso_to_fwhm(uiso));
                    }
                    None => unknown.push(key.clone()),
                },
                name if TYPED_ATTRS.contains(&name) => match value.as_str() {
                    Some(text) => {
                        let slot = match name {
                            "baseline" => &mut config.baseline,
                            "peakprofile" => &mut config.peakprofile,
                            "peakwidthmodel" => &mut config.peakwidthmodel,
                            "scatteringfactortable" => &mut config.scatteringfactortable,
                            _ => &mut config.evaluatortype,
                        };
                        *slot = Some(text.to_string());
                    }
                    None => unknown.push(key.clone()),
                },
                name if EXCLUDED_PARAMS.contains(&name) => unknown.push(key.clone()),
                name => match value.as_f64() {
                    Some(x) => {
                        config.params.insert(name.to_string(), x);
                    }
                    None => unknown.push(key.clone()),
                },
            }
        }
        Ok(Self { config, unknown })
    }

    /// Keys the builder could not map onto the fixed field list.
    pub fn unknown_keys(&self) -> &[String] {
        &self.unknown
    }

    pub fn build(self) -> CalculatorConfig {
        if !self.unknown.is_empty() {
            debug!("unused configuration items: {}", self.unknown.join(", "));
        }
        self.config
    }
}

/// FWHM of a radial-distribution Gaussian for atoms with equal isotropic
/// displacements `uiso` (in length-units squared).
pub fn uiso_to_fwhm(uiso: f64) -> f64 {
    GAUSS_SIGMA_TO_FWHM * (2.0 * uiso).sqrt()
}

/// Isotropic displacement that produces a Gaussian peak of the given FWHM.
pub fn fwhm_to_uiso(fwhm: f64) -> f64 {
    let rmsd = fwhm / GAUSS_SIGMA_TO_FWHM;
    0.5 * rmsd * rmsd
}
