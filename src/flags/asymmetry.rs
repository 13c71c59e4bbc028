use tracing::debug;

use super::{finite_value, percent_label, FlagRule};
use crate::cohort::{group_rows, GroupStats};
use crate::config::BilateralPair;
use crate::error::SchemaError;
use crate::models::{AlertRecord, AlertValue, Measurement};

/// Left/right imbalance on a bilateral metric pair, compared on each side's
/// mean across all of the athlete's measurements.
pub struct AsymmetryRule {
    pair: BilateralPair,
    threshold: f64,
}

impl AsymmetryRule {
    pub fn new(pair: BilateralPair, threshold: f64) -> Self {
        Self { pair, threshold }
    }
}

/// `|left - right| / max(left, right)`, undefined when the larger side is zero.
pub fn relative_difference(left: f64, right: f64) -> Option<f64> {
    let larger = left.max(right);
    if larger == 0.0 {
        return None;
    }
    Some((left - right).abs() / larger)
}

impl FlagRule for AsymmetryRule {
    fn name(&self) -> &'static str {
        "asymmetry"
    }

    fn label(&self) -> String {
        format!("asymmetry({})", self.pair.label())
    }

    fn evaluate(&self, measurements: &[&Measurement]) -> Result<Vec<AlertRecord>, SchemaError> {
        let sides: Vec<&Measurement> = measurements
            .iter()
            .copied()
            .filter(|m| m.metric == self.pair.left || m.metric == self.pair.right)
            .collect();
        for m in &sides {
            finite_value(m)?;
        }

        let mut alerts = Vec::new();
        let side_mean = |rows: &[&Measurement], metric: &str| {
            GroupStats::from_values(rows.iter().filter(|m| m.metric == metric).filter_map(|m| m.value))
                .map(|s| s.mean)
        };

        for (athlete_id, rows) in group_rows(sides.iter().copied(), |m: &Measurement| {
            m.athlete_id.clone()
        }) {
            let (Some(left), Some(right)) = (
                side_mean(rows.as_slice(), self.pair.left.as_str()),
                side_mean(rows.as_slice(), self.pair.right.as_str()),
            ) else {
                debug!(%athlete_id, pair = %self.pair.label(), "missing side, skipping asymmetry check");
                continue;
            };

            let Some(diff) = relative_difference(left, right) else {
                continue;
            };
            let Some(reference_date) = rows.iter().map(|m| m.timestamp).max() else {
                continue;
            };
            if diff > self.threshold {
                alerts.push(AlertRecord {
                    athlete_id,
                    team: rows[0].team.clone(),
                    metric: Some(self.pair.label()),
                    reason: format!("Asymmetry > {}", percent_label(self.threshold)),
                    value: Some(AlertValue::Pair { left, right }),
                    reference_date,
                });
            }
        }

        Ok(alerts)
    }
}
