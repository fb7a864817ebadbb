//! Query seam over the Engineering Facility Database (EFD).
//!
//! The EFD is the time-series store of record for control-system telemetry,
//! commands, and acknowledgements. The report pipeline only ever reads from
//! it, through the narrow [`EfdReader`] trait: ordered samples of one topic
//! within one window, plus topic discovery. The concrete reader lives in
//! [`influx`]; tests use an in-memory fake.
//!
//! Enum translation is data, not code: an [`EnumRegistry`] maps
//! `(namespace, type name, raw value)` to a label, loaded from a TOML file
//! at startup.

pub mod influx;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use jiff::Timestamp;
use serde_json::Value;

use crate::config::EnumBinding;
use crate::model::{Entity, TimeWindow};

/// Errors from EFD queries and enum resolution.
#[derive(Debug, thiserror::Error)]
pub enum EfdError {
    #[error("query for {topic} failed: {reason}")]
    QueryFailed { topic: String, reason: String },

    #[error("malformed record in {topic}: {reason}")]
    MalformedRecord { topic: String, reason: String },

    #[error("no enum table for {key}")]
    UnknownEnum { key: String },

    #[error("no member of {key} matches value {value}")]
    UnknownEnumValue { key: String, value: String },
}

/// One record returned by a time-series query.
#[derive(Debug, Clone)]
pub struct Row {
    pub timestamp: Timestamp,
    pub fields: BTreeMap<String, Value>,
}

/// Read-only access to one EFD instance.
///
/// The store is append-only for historical windows, so queries are idempotent:
/// repeating one within a run yields the same rows. Implementations must
/// return rows in ascending timestamp order.
pub trait EfdReader {
    /// All topic names known to this EFD instance, in a stable order.
    fn topics(&self) -> Result<Vec<String>, EfdError>;

    /// Samples of the entity's `topic` (short name) within the window,
    /// ascending by time. An empty `fields` slice selects all fields.
    ///
    /// Records of an indexed entity are filtered to its index.
    fn select_time_series(
        &self,
        entity: &Entity,
        topic: &str,
        fields: &[&str],
        window: TimeWindow,
    ) -> Result<Vec<Row>, EfdError>;
}

/// Translation tables for enumerated attribute values.
///
/// Loaded from a TOML file with one table per enum, keyed by
/// `"<namespace>.<TypeName>"` and mapping raw integer values to member names:
///
/// ```toml
/// ["lsst.ts.salobj.State"]
/// 1 = "DISABLED"
/// 2 = "ENABLED"
/// ```
#[derive(Debug, Default)]
pub struct EnumRegistry {
    tables: BTreeMap<String, BTreeMap<i64, String>>,
}

impl EnumRegistry {
    /// Load a registry from a TOML table file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_toml(&contents)
            .map_err(|e| format!("invalid enum tables at {}: {e}", path.display()))
    }

    /// Parse a registry from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let raw: BTreeMap<String, BTreeMap<String, String>> =
            toml::from_str(text).map_err(|e| e.to_string())?;

        let mut tables = BTreeMap::new();
        for (key, members) in raw {
            let mut table = BTreeMap::new();
            for (value, label) in members {
                let value: i64 = value
                    .parse()
                    .map_err(|_| format!("non-integer member value '{value}' in {key}"))?;
                table.insert(value, label);
            }
            tables.insert(key, table);
        }
        Ok(Self { tables })
    }

    /// Resolve a raw attribute value to its enum member name.
    ///
    /// Fails when no table matches the binding or no member matches the value.
    /// Whether that is fatal is the caller's policy, not decided here.
    pub fn resolve(&self, binding: &EnumBinding, raw: &Value) -> Result<String, EfdError> {
        let key = binding.key();
        let table = self
            .tables
            .get(&key)
            .ok_or_else(|| EfdError::UnknownEnum { key: key.clone() })?;

        let unknown = || EfdError::UnknownEnumValue {
            key: key.clone(),
            value: raw.to_string(),
        };
        let value = raw.as_i64().ok_or_else(&unknown)?;
        table.get(&value).cloned().ok_or_else(&unknown)
    }
}
