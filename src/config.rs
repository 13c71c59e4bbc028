use chrono::TimeDelta;
use clap::{Args, ValueEnum};

use crate::error::ConfigError;

pub const DEFAULT_METRICS: [&str; 6] = [
    "Jump Height (m)",
    "Peak Propulsive Power (W)",
    "distance_total",
    "accel_load_accum",
    "MaxForce_left",
    "MaxForce_right",
];

pub const DEFAULT_PAIR: &str = "MaxForce_left:MaxForce_right";

/// Reference point for the recency audit cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecencyReference {
    /// Latest timestamp in the filtered dataset.
    Dataset,
    WallClock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CohortGrouping {
    Team,
    TeamSport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BilateralPair {
    pub left: String,
    pub right: String,
}

impl BilateralPair {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (left, right) = raw
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedPair(raw.to_string()))?;
        let (left, right) = (left.trim(), right.trim());
        if left.is_empty() || right.is_empty() {
            return Err(ConfigError::MalformedPair(raw.to_string()));
        }
        if left == right {
            return Err(ConfigError::DegeneratePair(left.to_string()));
        }
        Ok(Self {
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.left, self.right)
    }
}

/// Options shared by every analysis command.
#[derive(Debug, Clone, Args)]
pub struct AnalysisArgs {
    /// Read measurements from a long-form CSV instead of DATABASE_URL
    #[arg(long)]
    pub input: Option<std::path::PathBuf>,
    /// Ordered metric names; order drives wide-format column order
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_METRICS.map(String::from))]
    pub metrics: Vec<String>,
    #[arg(long, default_value_t = 0.10)]
    pub decline_threshold: f64,
    #[arg(long, default_value_t = 30)]
    pub inactivity_days: i64,
    #[arg(long, default_value_t = 2.0)]
    pub team_norm_sd: f64,
    #[arg(long, default_value_t = 0.10)]
    pub asymmetry_threshold: f64,
    #[arg(long, default_value_t = 5)]
    pub min_measurements: usize,
    #[arg(long, default_value_t = 180)]
    pub recency_window_days: i64,
    #[arg(long, value_enum, default_value_t = RecencyReference::Dataset)]
    pub recency_reference: RecencyReference,
    #[arg(long, value_enum, default_value_t = CohortGrouping::Team)]
    pub cohort: CohortGrouping,
    /// Bilateral metric pair as LEFT:RIGHT (repeatable)
    #[arg(long = "pair", default_values_t = [DEFAULT_PAIR.to_string()])]
    pub pairs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub selected_metrics: Vec<String>,
    pub decline_threshold: f64,
    pub inactivity_days: i64,
    pub team_norm_sd: f64,
    pub asymmetry_threshold: f64,
    pub min_measurements: usize,
    pub recency_window_days: i64,
    pub recency_reference: RecencyReference,
    pub cohort: CohortGrouping,
    pub bilateral_pairs: Vec<BilateralPair>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            selected_metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
            decline_threshold: 0.10,
            inactivity_days: 30,
            team_norm_sd: 2.0,
            asymmetry_threshold: 0.10,
            min_measurements: 5,
            recency_window_days: 180,
            recency_reference: RecencyReference::Dataset,
            cohort: CohortGrouping::Team,
            bilateral_pairs: vec![BilateralPair {
                left: "MaxForce_left".to_string(),
                right: "MaxForce_right".to_string(),
            }],
        }
    }
}

impl AnalysisConfig {
    /// Metrics to fetch: the selected list plus any bilateral side not already in it.
    pub fn fetch_metrics(&self) -> Vec<String> {
        let mut metrics = self.selected_metrics.clone();
        for pair in &self.bilateral_pairs {
            for side in [&pair.left, &pair.right] {
                if !metrics.contains(side) {
                    metrics.push(side.clone());
                }
            }
        }
        metrics
    }
}

impl TryFrom<&AnalysisArgs> for AnalysisConfig {
    type Error = ConfigError;

    fn try_from(args: &AnalysisArgs) -> Result<Self, Self::Error> {
        let selected_metrics: Vec<String> = args
            .metrics
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if selected_metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }

        let decline_threshold = threshold("decline_threshold", args.decline_threshold)?;
        let team_norm_sd = threshold("team_norm_sd", args.team_norm_sd)?;
        let asymmetry_threshold = threshold("asymmetry_threshold", args.asymmetry_threshold)?;
        let inactivity_days = window("inactivity_days", args.inactivity_days)?;
        let recency_window_days = window("recency_window_days", args.recency_window_days)?;

        let bilateral_pairs = args
            .pairs
            .iter()
            .map(|raw| BilateralPair::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            selected_metrics,
            decline_threshold,
            inactivity_days,
            team_norm_sd,
            asymmetry_threshold,
            min_measurements: args.min_measurements,
            recency_window_days,
            recency_reference: args.recency_reference,
            cohort: args.cohort,
            bilateral_pairs,
        })
    }
}

fn threshold(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

fn window(name: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::NegativeWindow { name, value });
    }
    match TimeDelta::try_days(value) {
        Some(_) => Ok(value),
        None => Err(ConfigError::WindowOutOfRange { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args() -> AnalysisArgs {
        AnalysisArgs {
            input: None,
            metrics: DEFAULT_METRICS.map(String::from).to_vec(),
            decline_threshold: 0.10,
            inactivity_days: 30,
            team_norm_sd: 2.0,
            asymmetry_threshold: 0.10,
            min_measurements: 5,
            recency_window_days: 180,
            recency_reference: RecencyReference::Dataset,
            cohort: CohortGrouping::Team,
            pairs: vec![DEFAULT_PAIR.to_string()],
        }
    }

    #[test]
    fn default_args_match_default_config() {
        let config = AnalysisConfig::try_from(&default_args()).unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn rejects_negative_threshold() {
        let mut args = default_args();
        args.decline_threshold = -0.1;
        assert!(matches!(
            AnalysisConfig::try_from(&args),
            Err(ConfigError::InvalidThreshold { name: "decline_threshold", .. })
        ));
    }

    #[test]
    fn rejects_windows_beyond_calendar_range() {
        let mut args = default_args();
        args.inactivity_days = i64::MAX;
        assert!(matches!(
            AnalysisConfig::try_from(&args),
            Err(ConfigError::WindowOutOfRange { name: "inactivity_days", value: i64::MAX })
        ));

        let mut args = default_args();
        args.recency_window_days = i64::MAX / 2;
        assert!(matches!(
            AnalysisConfig::try_from(&args),
            Err(ConfigError::WindowOutOfRange { name: "recency_window_days", .. })
        ));

        let mut args = default_args();
        args.inactivity_days = 3650;
        assert!(AnalysisConfig::try_from(&args).is_ok());
    }

    #[test]
    fn rejects_empty_metric_list() {
        let mut args = default_args();
        args.metrics = vec![" ".to_string()];
        assert!(matches!(
            AnalysisConfig::try_from(&args),
            Err(ConfigError::NoMetrics)
        ));
    }

    #[test]
    fn pair_parsing_validates_sides() {
        let pair = BilateralPair::parse("leftMaxForce : rightMaxForce").unwrap();
        assert_eq!(pair.left, "leftMaxForce");
        assert_eq!(pair.right, "rightMaxForce");
        assert_eq!(pair.label(), "leftMaxForce/rightMaxForce");
        assert!(matches!(
            BilateralPair::parse("force"),
            Err(ConfigError::MalformedPair(_))
        ));
        assert!(matches!(
            BilateralPair::parse("force:force"),
            Err(ConfigError::DegeneratePair(_))
        ));
    }

    #[test]
    fn fetch_metrics_adds_missing_pair_sides() {
        let mut config = AnalysisConfig::default();
        config.selected_metrics = vec!["distance_total".to_string()];
        assert_eq!(
            config.fetch_metrics(),
            vec!["distance_total", "MaxForce_left", "MaxForce_right"]
        );
    }
}
