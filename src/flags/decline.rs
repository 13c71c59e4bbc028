use tracing::debug;

use super::{finite_value, percent_label, FlagRule};
use crate::cohort::{group_rows, GroupStats};
use crate::error::SchemaError;
use crate::models::{AlertRecord, AlertValue, Measurement};

const ROLLING_WINDOW: usize = 3;

/// Latest value more than `threshold` below the rolling mean of the last
/// three values (latest included).
pub struct DeclineRule {
    threshold: f64,
}

impl DeclineRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

/// Mean of the trailing `window` values, `None` if the series is shorter.
pub fn rolling_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    GroupStats::from_values(values[values.len() - window..].iter().copied()).map(|s| s.mean)
}

impl FlagRule for DeclineRule {
    fn name(&self) -> &'static str {
        "decline"
    }

    fn evaluate(&self, measurements: &[&Measurement]) -> Result<Vec<AlertRecord>, SchemaError> {
        let mut alerts = Vec::new();

        let series = group_rows(measurements.iter().copied(), |m: &Measurement| {
            (m.athlete_id.clone(), m.metric.clone())
        });

        for ((athlete_id, metric), history) in series {
            let mut points = Vec::with_capacity(history.len());
            for m in history {
                if let Some(value) = finite_value(m)? {
                    points.push((m, value));
                }
            }
            if points.len() < ROLLING_WINDOW {
                continue;
            }

            // stable, so equal timestamps keep input order
            points.sort_by_key(|(m, _)| m.timestamp);
            let values: Vec<f64> = points.iter().map(|(_, value)| *value).collect();

            let Some(mean) = rolling_mean(&values, ROLLING_WINDOW) else {
                continue;
            };
            if mean == 0.0 {
                debug!(%athlete_id, %metric, "zero rolling mean, skipping decline check");
                continue;
            }

            let (latest, latest_value) = points[points.len() - 1];
            let drop_fraction = (mean - latest_value) / mean;
            if drop_fraction > self.threshold {
                alerts.push(AlertRecord {
                    athlete_id,
                    team: latest.team.clone(),
                    metric: Some(metric),
                    reason: format!("Declined > {}", percent_label(self.threshold)),
                    value: Some(AlertValue::Number(latest_value)),
                    reference_date: latest.timestamp,
                });
            }
        }

        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::fixtures::{at, measurement};

    fn series(values: &[f64]) -> Vec<Measurement> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| measurement("a", "T1", "jump", Some(*v), at(2025, 1, i as u32 + 1)))
            .collect()
    }

    fn run(rows: &[Measurement]) -> Vec<AlertRecord> {
        let refs: Vec<&Measurement> = rows.iter().collect();
        DeclineRule::new(0.10).evaluate(&refs).unwrap()
    }

    #[test]
    fn sharp_drop_flags_once() {
        let alerts = run(&series(&[100.0, 100.0, 70.0]));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].value, Some(AlertValue::Number(70.0)));
        assert_eq!(alerts[0].reason, "Declined > 10%");
        assert_eq!(alerts[0].reference_date, at(2025, 1, 3));
    }

    #[test]
    fn small_drop_is_ignored() {
        assert!(run(&series(&[100.0, 100.0, 95.0])).is_empty());
    }

    #[test]
    fn short_history_and_zero_mean_are_skipped() {
        assert!(run(&series(&[100.0, 10.0])).is_empty());
        assert!(run(&series(&[0.0, 0.0, 0.0])).is_empty());
    }

    #[test]
    fn orders_chronologically_before_comparing() {
        let mut rows = series(&[100.0, 100.0, 70.0]);
        rows.reverse();
        let alerts = run(&rows);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].value, Some(AlertValue::Number(70.0)));
    }

    #[test]
    fn only_trailing_window_counts() {
        // trailing window [60, 60, 57] has mean 59, drop ~3.4%
        assert!(run(&series(&[200.0, 200.0, 60.0, 60.0, 57.0])).is_empty());
        assert_eq!(rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3), Some(3.0));
        assert_eq!(rolling_mean(&[1.0, 2.0], 3), None);
    }
}
