//! Historical Dataset Replay Adapter
//!
//! Parses the station's historical export (CSV) into `SystemState` rows for
//! `state_at`, the forecaster's inflow series, and the cost agent's price
//! window. Column order varies between export tools, so the header is
//! matched by name with the aliases seen in the field; parsing is
//! quote-aware because some exports wrap timestamps.
//!
//! The kernel reads this table and never writes it.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{PriceScenario, SystemState};

// ============================================================================
// Record Splitting
// ============================================================================

/// Split one CSV record into fields. Double-quoted values survive embedded
/// commas (some export tools wrap timestamps), and `""` inside a quoted
/// field is an escaped quote.
fn split_record(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if quoted {
            if ch != '"' {
                field.push(ch);
            } else if chars.get(i + 1) == Some(&'"') {
                field.push('"');
                i += 1;
            } else {
                quoted = false;
            }
        } else {
            match ch {
                '"' => quoted = true,
                ',' => fields.push(std::mem::take(&mut field)),
                _ => field.push(ch),
            }
        }
        i += 1;
    }
    fields.push(field);
    fields
}

// ============================================================================
// Configuration and Errors
// ============================================================================

/// Configuration for dataset loading behaviour.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Drop rows with unparseable required fields instead of failing the load
    pub skip_invalid_rows: bool,
    /// Replace NaN numeric fields with 0.0 instead of dropping the row
    pub nan_to_zero: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            skip_invalid_rows: true,
            nan_to_zero: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset {path} has no header row")]
    EmptyFile { path: String },
    #[error("dataset {path} is missing required column '{column}'")]
    MissingColumn { path: String, column: String },
    #[error("row {row} is invalid: {reason}")]
    InvalidRow { row: usize, reason: String },
    #[error("index {index} out of range (dataset has {len} rows)")]
    IndexOutOfRange { index: usize, len: usize },
}

// ============================================================================
// Dataset
// ============================================================================

/// One parsed historical sample at 15-min cadence.
#[derive(Debug, Clone)]
struct Row {
    timestamp: DateTime<Utc>,
    l1_m: f64,
    v_m3: f64,
    f1_m3_per_15min: f64,
    f2_m3h: f64,
    price_eur_kwh: f64,
}

/// Historical table bound at startup, indexed by integer row number.
#[derive(Debug)]
pub struct HistoricalDataset {
    rows: Vec<Row>,
    scenario: PriceScenario,
}

/// Header aliases per logical column, first match wins.
const COLUMN_ALIASES: [(&str, &[&str]); 6] = [
    ("timestamp", &["timestamp", "time", "datetime"]),
    ("l1", &["l1_m", "l1", "level_m", "tunnel_level_m"]),
    ("volume", &["v_m3", "volume_m3", "tunnel_volume_m3"]),
    ("inflow", &["f1_m3_per_15min", "f1", "inflow_m3_15min", "inflow"]),
    ("outflow", &["f2_m3h", "f2", "outflow_m3h", "outflow"]),
    (
        "price",
        &["electricity_price_eur_kwh", "price_eur_kwh", "price", "spot_price"],
    ),
];

fn find_column(header: &[String], logical: &str, aliases: &[&str]) -> Option<usize> {
    header.iter().position(|h| {
        let name = h.trim().to_lowercase();
        aliases.iter().any(|a| name == *a) || name == logical
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    // Epoch seconds, as written by the SCADA export
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

impl HistoricalDataset {
    /// Load a CSV export. `scenario` is stamped onto every `SystemState`
    /// this dataset produces.
    pub fn load(
        path: &Path,
        config: DatasetConfig,
        scenario: PriceScenario,
    ) -> Result<Self, DatasetError> {
        let path_display = path.display().to_string();
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path_display.clone(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();

        let header_line = lines
            .next()
            .transpose()
            .map_err(|source| DatasetError::Io {
                path: path_display.clone(),
                source,
            })?
            .ok_or_else(|| DatasetError::EmptyFile {
                path: path_display.clone(),
            })?;
        let header = split_record(&header_line);

        let mut indices = [0usize; 6];
        for (slot, (logical, aliases)) in COLUMN_ALIASES.iter().enumerate() {
            indices[slot] = find_column(&header, logical, aliases).ok_or_else(|| {
                DatasetError::MissingColumn {
                    path: path_display.clone(),
                    column: (*logical).to_string(),
                }
            })?;
        }
        let [ts_idx, l1_idx, v_idx, f1_idx, f2_idx, price_idx] = indices;

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (line_no, line) in lines.enumerate() {
            let line = line.map_err(|source| DatasetError::Io {
                path: path_display.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_record(&line);
            let row_no = line_no + 2; // 1-based, after header

            match parse_row(&fields, ts_idx, l1_idx, v_idx, f1_idx, f2_idx, price_idx, &config) {
                Ok(row) => rows.push(row),
                Err(reason) if config.skip_invalid_rows => {
                    skipped += 1;
                    warn!(row = row_no, reason = %reason, "Skipping invalid dataset row");
                }
                Err(reason) => {
                    return Err(DatasetError::InvalidRow {
                        row: row_no,
                        reason,
                    })
                }
            }
        }

        info!(
            path = %path_display,
            rows = rows.len(),
            skipped,
            "Loaded historical dataset"
        );
        Ok(Self { rows, scenario })
    }

    /// Dataset over explicit samples, for tests and tooling.
    pub fn from_samples(
        samples: Vec<(DateTime<Utc>, f64, f64, f64, f64, f64)>,
        scenario: PriceScenario,
    ) -> Self {
        let rows = samples
            .into_iter()
            .map(|(timestamp, l1_m, v_m3, f1, f2, price)| Row {
                timestamp,
                l1_m,
                v_m3,
                f1_m3_per_15min: f1,
                f2_m3h: f2,
                price_eur_kwh: price,
            })
            .collect();
        Self { rows, scenario }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The `state_at(index)` operation of the kernel surface.
    pub fn state_at(&self, index: usize) -> Result<SystemState, DatasetError> {
        let row = self.rows.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.rows.len(),
        })?;
        Ok(SystemState {
            timestamp: row.timestamp,
            l1_m: row.l1_m,
            v_m3: row.v_m3,
            f1_m3_per_15min: row.f1_m3_per_15min,
            f2_m3h: row.f2_m3h,
            electricity_price_eur_kwh: row.price_eur_kwh,
            price_scenario: self.scenario,
            history_index: index,
        })
    }

    /// Full inflow series for the forecaster.
    pub fn inflow_series(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.f1_m3_per_15min).collect()
    }

    /// Spot prices for the next `steps` ticks starting at `index` (the
    /// day-ahead window is known). Padded with the last available price
    /// near the end of the table.
    pub fn price_window(&self, index: usize, steps: usize) -> Vec<f64> {
        let mut window = Vec::with_capacity(steps);
        let last = self
            .rows
            .last()
            .map(|r| r.price_eur_kwh)
            .unwrap_or_default();
        for offset in 0..steps {
            let price = self
                .rows
                .get(index + offset)
                .map(|r| r.price_eur_kwh)
                .unwrap_or(last);
            window.push(price);
        }
        window
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_row(
    fields: &[String],
    ts_idx: usize,
    l1_idx: usize,
    v_idx: usize,
    f1_idx: usize,
    f2_idx: usize,
    price_idx: usize,
    config: &DatasetConfig,
) -> Result<Row, String> {
    let get = |idx: usize| -> &str { fields.get(idx).map(String::as_str).unwrap_or("") };

    let timestamp =
        parse_timestamp(get(ts_idx)).ok_or_else(|| format!("bad timestamp '{}'", get(ts_idx)))?;

    let number = |idx: usize, name: &str| -> Result<f64, String> {
        let raw = get(idx).trim();
        if raw.is_empty() {
            return if config.nan_to_zero {
                Ok(0.0)
            } else {
                Err(format!("empty {name}"))
            };
        }
        let value: f64 = raw.parse().map_err(|_| format!("bad {name} '{raw}'"))?;
        if value.is_nan() {
            if config.nan_to_zero {
                Ok(0.0)
            } else {
                Err(format!("NaN {name}"))
            }
        } else {
            Ok(value)
        }
    };

    Ok(Row {
        timestamp,
        l1_m: number(l1_idx, "level")?,
        v_m3: number(v_idx, "volume")?,
        f1_m3_per_15min: number(f1_idx, "inflow")?,
        f2_m3h: number(f2_idx, "outflow")?,
        price_eur_kwh: number(price_idx, "price")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_split_record_quoting() {
        assert_eq!(split_record("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(
            split_record("\"2024-03-01 12:00\",1.82"),
            vec!["2024-03-01 12:00", "1.82"]
        );
        assert_eq!(
            split_record("\"one, two\",\"say \"\"hi\"\"\",3"),
            vec!["one, two", "say \"hi\"", "3"]
        );
        assert_eq!(split_record(""), vec![""]);
        assert_eq!(split_record("a,"), vec!["a", ""]);
    }

    #[test]
    fn test_loads_canonical_header() {
        let file = write_csv(
            "timestamp,l1_m,v_m3,f1_m3_per_15min,f2_m3h,price_eur_kwh\n\
             2024-03-01 12:00:00,1.82,5405,1708,6980,0.14\n\
             2024-03-01 12:15:00,1.90,5640,1650,6980,0.15\n",
        );
        let ds = HistoricalDataset::load(
            file.path(),
            DatasetConfig::default(),
            PriceScenario::Normal,
        )
        .unwrap();
        assert_eq!(ds.len(), 2);
        let state = ds.state_at(0).unwrap();
        assert!((state.l1_m - 1.82).abs() < 1e-9);
        assert!((state.electricity_price_eur_kwh - 0.14).abs() < 1e-9);
        assert_eq!(state.history_index, 0);
    }

    #[test]
    fn test_alias_header_and_quotes() {
        let file = write_csv(
            "\"time\",level_m,volume_m3,inflow,outflow,price\n\
             \"2024-03-01T12:00\",2.5,7500,1200,5000,0.09\n",
        );
        let ds = HistoricalDataset::load(
            file.path(),
            DatasetConfig::default(),
            PriceScenario::High,
        )
        .unwrap();
        let state = ds.state_at(0).unwrap();
        assert_eq!(state.price_scenario, PriceScenario::High);
        assert!((state.v_m3 - 7_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_rows_skipped() {
        let file = write_csv(
            "timestamp,l1_m,v_m3,f1_m3_per_15min,f2_m3h,price_eur_kwh\n\
             garbage,1.0,1,1,1,1\n\
             2024-03-01 12:00:00,1.82,5405,1708,6980,0.14\n",
        );
        let ds = HistoricalDataset::load(
            file.path(),
            DatasetConfig::default(),
            PriceScenario::Normal,
        )
        .unwrap();
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_missing_column_fails() {
        let file = write_csv("timestamp,l1_m,v_m3,f1_m3_per_15min,f2_m3h\n");
        let err = HistoricalDataset::load(
            file.path(),
            DatasetConfig::default(),
            PriceScenario::Normal,
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn { .. }));
    }

    #[test]
    fn test_index_out_of_range() {
        let ds = HistoricalDataset::from_samples(Vec::new(), PriceScenario::Normal);
        assert!(matches!(
            ds.state_at(3),
            Err(DatasetError::IndexOutOfRange { index: 3, len: 0 })
        ));
    }

    #[test]
    fn test_price_window_pads_at_end() {
        let t0 = chrono::Utc::now();
        let samples = (0..4)
            .map(|i| {
                (
                    t0 + chrono::Duration::minutes(15 * i),
                    2.0,
                    6_000.0,
                    1_000.0,
                    4_000.0,
                    0.10 + i as f64 * 0.01,
                )
            })
            .collect();
        let ds = HistoricalDataset::from_samples(samples, PriceScenario::Normal);
        let window = ds.price_window(2, 4);
        assert_eq!(window.len(), 4);
        assert!((window[0] - 0.12).abs() < 1e-9);
        assert!((window[1] - 0.13).abs() < 1e-9);
        // Past the end of the table: padded with the last price
        assert!((window[2] - 0.13).abs() < 1e-9);
        assert!((window[3] - 0.13).abs() < 1e-9);
    }
}
