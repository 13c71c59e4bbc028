use tracing::debug;

use super::{finite_value, FlagRule};
use crate::cohort::{group_rows, CohortStats};
use crate::error::SchemaError;
use crate::models::{AlertRecord, AlertValue, Measurement};

/// Measurements further than `n_sd` population standard deviations from
/// their team's mean for the same metric.
pub struct TeamNormRule {
    n_sd: f64,
}

impl TeamNormRule {
    pub fn new(n_sd: f64) -> Self {
        Self { n_sd }
    }
}

impl FlagRule for TeamNormRule {
    fn name(&self) -> &'static str {
        "team_norm"
    }

    fn evaluate(&self, measurements: &[&Measurement]) -> Result<Vec<AlertRecord>, SchemaError> {
        for m in measurements {
            finite_value(m)?;
        }

        let mut alerts = Vec::new();
        let reason = format!("Outside team norm ±{} SD", self.n_sd);

        for (metric, rows) in group_rows(measurements.iter().copied(), |m: &Measurement| {
            m.metric.clone()
        }) {
            let teams = CohortStats::compute(rows.iter().copied(), |m: &Measurement| m.team.clone());

            for (m, stats) in teams.annotate(rows.iter().copied(), |m: &Measurement| m.team.clone()) {
                let Some(value) = m.value else { continue };
                if stats.std_dev == 0.0 {
                    debug!(%metric, team = %m.team, athlete = %m.athlete_id, "no dispersion, skipping team norm check");
                    continue;
                }
                if stats.is_outlier(value, self.n_sd) {
                    alerts.push(AlertRecord {
                        athlete_id: m.athlete_id.clone(),
                        team: m.team.clone(),
                        metric: Some(metric.clone()),
                        reason: reason.clone(),
                        value: Some(AlertValue::Number(value)),
                        reference_date: m.timestamp,
                    });
                }
            }
        }

        Ok(alerts)
    }
}
