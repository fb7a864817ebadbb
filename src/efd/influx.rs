//! EFD reader backed by the `influx` command-line client.
//!
//! Connection details are resolved from a per-instance profile at
//! `~/.efd-report/<efd-name>.toml`:
//!
//! ```toml
//! host = "usdf-rsp.example.org"
//! port = 8086          # optional, defaults to 8086
//! database = "efd"     # optional, defaults to "efd"
//! ```
//!
//! Each query shells out to `influx -format json -execute <query>` and parses
//! the JSON response. The retention policy is always `autogen`.

use std::collections::BTreeMap;
use std::fs;
use std::process::Command;

use serde::Deserialize;
use serde_json::Value;

use super::{EfdError, EfdReader, Row};
use crate::model::{Entity, TimeWindow};

/// Connection profile for one EFD instance.
#[derive(Debug, Deserialize)]
struct Profile {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_database")]
    database: String,
}

fn default_port() -> u16 {
    8086
}

fn default_database() -> String {
    "efd".to_string()
}

/// An [`EfdReader`] that queries InfluxDB through the `influx` CLI.
pub struct InfluxReader {
    profile: Profile,
}

impl InfluxReader {
    /// Connect to a named EFD instance by loading its profile.
    pub fn connect(efd_name: &str) -> Result<Self, String> {
        let home = dirs::home_dir().ok_or("could not determine home directory")?;
        let path = home.join(".efd-report").join(format!("{efd_name}.toml"));

        if !path.exists() {
            return Err(format!(
                "no connection profile for EFD instance '{efd_name}'; \
                 expected a file at {} with at minimum:\n\n\
                 host = \"<influxdb host>\"",
                path.display()
            ));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let profile: Profile = toml::from_str(&contents)
            .map_err(|e| format!("invalid profile at {}: {e}", path.display()))?;

        Ok(Self { profile })
    }

    /// Run one InfluxQL statement and return the parsed series, if any.
    fn execute(&self, query: &str, topic: &str) -> Result<Vec<InfluxSeries>, EfdError> {
        let failed = |reason: String| EfdError::QueryFailed {
            topic: topic.to_string(),
            reason,
        };

        let output = Command::new("influx")
            .args([
                "-host",
                &self.profile.host,
                "-port",
                &self.profile.port.to_string(),
                "-database",
                &self.profile.database,
                "-format",
                "json",
                "-execute",
                query,
            ])
            .output()
            .map_err(|e| failed(format!("could not run influx: {e}")))?;

        if !output.status.success() {
            return Err(failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let response: InfluxResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| failed(format!("unparseable response: {e}")))?;

        let mut series = Vec::new();
        for result in response.results {
            if let Some(error) = result.error {
                return Err(failed(error));
            }
            series.extend(result.series);
        }
        Ok(series)
    }
}

impl EfdReader for InfluxReader {
    fn topics(&self) -> Result<Vec<String>, EfdError> {
        let series = self.execute("SHOW MEASUREMENTS", "measurements")?;

        // One series with one name column per row.
        let mut topics = Vec::new();
        for s in series {
            for row in s.values {
                if let Some(Value::String(name)) = row.first() {
                    topics.push(name.clone());
                }
            }
        }
        Ok(topics)
    }

    fn select_time_series(
        &self,
        entity: &Entity,
        topic: &str,
        fields: &[&str],
        window: TimeWindow,
    ) -> Result<Vec<Row>, EfdError> {
        let full_name = entity.topic(topic);
        let selected = if fields.is_empty() {
            "*".to_string()
        } else {
            let quoted: Vec<String> = fields.iter().map(|f| format!("\"{f}\"")).collect();
            quoted.join(", ")
        };

        let mut query = format!(
            "SELECT {selected} FROM \"{}\".\"autogen\".\"{full_name}\" \
             WHERE time >= '{}' AND time <= '{}'",
            self.profile.database, window.start, window.end,
        );
        if let Some(index) = entity.index {
            query.push_str(&format!(" AND salIndex = {index}"));
        }

        let series = self.execute(&query, &full_name)?;
        let mut rows = Vec::new();
        for s in series {
            rows.extend(parse_series(&full_name, s)?);
        }
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }
}

/// Convert one JSON series into rows, pulling the timestamp out of the
/// `time` column and keeping the remaining non-null fields.
fn parse_series(topic: &str, series: InfluxSeries) -> Result<Vec<Row>, EfdError> {
    let malformed = |reason: String| EfdError::MalformedRecord {
        topic: topic.to_string(),
        reason,
    };

    let time_column = series
        .columns
        .iter()
        .position(|c| c == "time")
        .ok_or_else(|| malformed("no time column".to_string()))?;

    let mut rows = Vec::new();
    for values in series.values {
        let timestamp = values
            .get(time_column)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing timestamp".to_string()))?
            .parse()
            .map_err(|e| malformed(format!("bad timestamp: {e}")))?;

        let mut fields = BTreeMap::new();
        for (column, value) in series.columns.iter().zip(values) {
            if column != "time" && !value.is_null() {
                fields.insert(column.clone(), value);
            }
        }
        rows.push(Row { timestamp, fields });
    }
    Ok(rows)
}

// ── JSON shapes returned by `influx -format json` ──

#[derive(Deserialize)]
struct InfluxResponse {
    #[serde(default)]
    results: Vec<InfluxResult>,
}

#[derive(Deserialize)]
struct InfluxResult {
    #[serde(default)]
    series: Vec<InfluxSeries>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct InfluxSeries {
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn series(columns: &[&str], values: Vec<Vec<Value>>) -> InfluxSeries {
        InfluxSeries {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            values,
        }
    }

    #[test]
    fn parses_rows_with_time_column() {
        let s = series(
            &["time", "summaryState", "priority"],
            vec![vec![json!("2022-09-14T08:09:09Z"), json!(3), json!(0)]],
        );

        let rows = parse_series("lsst.sal.ATAOS.logevent_summaryState", s).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].timestamp,
            "2022-09-14T08:09:09Z".parse::<jiff::Timestamp>().unwrap()
        );
        assert_eq!(rows[0].fields["summaryState"], json!(3));
        assert_eq!(rows[0].fields["priority"], json!(0));
    }

    #[test]
    fn null_fields_are_dropped() {
        let s = series(
            &["time", "result"],
            vec![vec![json!("2022-09-14T08:09:07Z"), Value::Null]],
        );

        let rows = parse_series("lsst.sal.ATAOS.ackcmd", s).unwrap();
        assert!(rows[0].fields.is_empty());
    }

    #[test]
    fn missing_time_column_is_malformed() {
        let s = series(&["summaryState"], vec![vec![json!(3)]]);
        let err = parse_series("lsst.sal.ATAOS.logevent_summaryState", s).unwrap_err();
        assert!(matches!(err, EfdError::MalformedRecord { .. }));
    }

    #[test]
    fn response_errors_surface_from_json() {
        let text = r#"{"results":[{"error":"database not found: efd"}]}"#;
        let response: InfluxResponse = serde_json::from_str(text).unwrap();
        assert_eq!(
            response.results[0].error.as_deref(),
            Some("database not found: efd")
        );
    }
}
