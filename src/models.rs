use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub athlete_id: String,
    pub team: String,
    pub sport: Option<String>,
    pub metric: String,
    pub value: Option<f64>,
    pub timestamp: NaiveDateTime,
}

impl Measurement {
    /// Null or recorded-as-zero, the two cases the quality audit treats as missing.
    pub fn is_missing_or_zero(&self) -> bool {
        self.value.map_or(true, |value| value == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideSession {
    pub timestamp: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

/// Session-indexed table. `columns` always holds `timestamp` followed by the
/// requested metrics, even when `rows` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub athlete_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<WideSession>,
}

impl WideTable {
    pub fn metrics(&self) -> &[String] {
        &self.columns[1..]
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertValue {
    Number(f64),
    Pair { left: f64, right: f64 },
}

impl fmt::Display for AlertValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertValue::Number(value) => write!(f, "{value}"),
            AlertValue::Pair { left, right } => write!(f, "{left:.2}/{right:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub athlete_id: String,
    pub team: String,
    pub metric: Option<String>,
    pub reason: String,
    pub value: Option<AlertValue>,
    pub reference_date: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingnessRow {
    pub metric: String,
    pub null_count: usize,
    pub zero_count: usize,
    pub total_rows: usize,
    pub missing_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageRow {
    pub team: String,
    pub sport: Option<String>,
    pub total_athletes: usize,
    pub athletes_sufficient: usize,
    pub pct_sufficient: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecencyRow {
    pub athlete_id: String,
    pub team: String,
    pub last_measured: NaiveDateTime,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SufficiencyRow {
    pub athlete_id: String,
    pub metric_counts: Vec<(String, usize)>,
    pub sufficient: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub total_athletes: usize,
    pub median_rows_per_athlete: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentDiffRow {
    pub athlete_id: String,
    pub team: String,
    pub metric: String,
    pub value: f64,
    pub team_mean: f64,
    pub pct_diff: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AthleteSummary {
    pub team: String,
    pub athlete_id: String,
    pub metric: String,
    pub avg_pct_diff: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZScoreRow {
    pub athlete_id: String,
    pub team: String,
    pub metric: String,
    pub value: f64,
    pub z_score: f64,
}
