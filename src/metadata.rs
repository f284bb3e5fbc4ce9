//! Tagged-variant metadata tree for calculator configuration.
//!
//! Calculator parameters form a nested hierarchy of mappings, sequences and
//! scalars. [`ConfigTree`] persists that hierarchy with the container kind
//! of every node recorded, so mappings, sequences and scalars round-trip
//! faithfully regardless of which store backend holds the bytes. The serde
//! representation is the externally tagged enum encoding; the hierarchical
//! container embeds it as a JSON record, the flat store descriptor carries
//! the same data as a TOML table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Leaf value of a metadata tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigScalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Nested metadata value: scalar, sequence, or mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigTree {
    Scalar(ConfigScalar),
    Sequence(Vec<ConfigTree>),
    Mapping(BTreeMap<String, ConfigTree>),
}

impl ConfigTree {
    /// An empty mapping node.
    pub fn empty_mapping() -> Self {
        ConfigTree::Mapping(BTreeMap::new())
    }

    pub fn text(value: impl Into<String>) -> Self {
        ConfigTree::Scalar(ConfigScalar::Text(value.into()))
    }

    pub fn float(value: f64) -> Self {
        ConfigTree::Scalar(ConfigScalar::Float(value))
    }

    pub fn int(value: i64) -> Self {
        ConfigTree::Scalar(ConfigScalar::Int(value))
    }

    /// Child lookup on a mapping node; `None` for other node kinds.
    pub fn get(&self, key: &str) -> Option<&ConfigTree> {
        match self {
            ConfigTree::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigTree::Scalar(ConfigScalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of a scalar node; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigTree::Scalar(ConfigScalar::Float(x)) => Some(*x),
            ConfigTree::Scalar(ConfigScalar::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<toml::Value> for ConfigTree {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigTree::Scalar(ConfigScalar::Text(s)),
            toml::Value::Integer(i) => ConfigTree::Scalar(ConfigScalar::Int(i)),
            toml::Value::Float(x) => ConfigTree::Scalar(ConfigScalar::Float(x)),
            toml::Value::Boolean(b) => ConfigTree::Scalar(ConfigScalar::Bool(b)),
            // TOML datetimes have no scalar slot of their own; keep the text.
            toml::Value::Datetime(dt) => ConfigTree::Scalar(ConfigScalar::Text(dt.to_string())),
            toml::Value::Array(items) => {
                ConfigTree::Sequence(items.into_iter().map(ConfigTree::from).collect())
            }
            toml::Value::Table(table) => ConfigTree::Mapping(
                table
                    .into_iter()
                    .map(|(k, v)| (k, ConfigTree::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigTree> for toml::Value {
    fn from(tree: ConfigTree) -> Self {
        match tree {
            ConfigTree::Scalar(ConfigScalar::Null) => toml::Value::String(String::new()),
            ConfigTree::Scalar(ConfigScalar::Bool(b)) => toml::Value::Boolean(b),
            ConfigTree::Scalar(ConfigScalar::Int(i)) => toml::Value::Integer(i),
            ConfigTree::Scalar(ConfigScalar::Float(x)) => toml::Value::Float(x),
            ConfigTree::Scalar(ConfigScalar::Text(s)) => toml::Value::String(s),
            ConfigTree::Sequence(items) => {
                toml::Value::Array(items.into_iter().map(toml::Value::from).collect())
            }
            ConfigTree::Mapping(map) => toml::Value::Table(
                map.into_iter()
                    .map(|(k, v)| (k, toml::Value::from(v)))
                    .collect(),
            ),
        }
    }
}
