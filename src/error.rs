use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("{name} must not be negative (got {value})")]
    NegativeWindow { name: &'static str, value: i64 },
    #[error("{name} of {value} days is too large to represent")]
    WindowOutOfRange { name: &'static str, value: i64 },
    #[error("at least one metric must be selected")]
    NoMetrics,
    #[error("bilateral pair `{0}` must be written as LEFT:RIGHT")]
    MalformedPair(String),
    #[error("bilateral pair uses `{0}` for both sides")]
    DegeneratePair(String),
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("cannot read {table}: {reason}")]
    Unreadable { table: String, reason: String },
    #[error("required column `{column}` is missing from {table}")]
    MissingColumn { table: String, column: &'static str },
    #[error("row {row}: cannot parse timestamp `{raw}`")]
    BadTimestamp { row: usize, raw: String },
    #[error("row {row}: cannot parse value `{raw}`")]
    BadValue { row: usize, raw: String },
    #[error("measurement for athlete `{athlete_id}` on `{metric}` has non-finite value {value}")]
    NonFiniteValue {
        athlete_id: String,
        metric: String,
        value: f64,
    },
}

#[derive(Error, Debug)]
#[error("flag rule `{rule}` failed")]
pub struct FlagError {
    pub rule: String,
    #[source]
    pub source: SchemaError,
}
