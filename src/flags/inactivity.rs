use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use super::FlagRule;
use crate::audit::days_before;
use crate::error::SchemaError;
use crate::models::{AlertRecord, Measurement};

/// Athletes whose latest measurement is strictly older than `now - days`.
pub struct InactivityRule {
    days: i64,
    now: NaiveDateTime,
}

impl InactivityRule {
    pub fn new(days: i64, now: NaiveDateTime) -> Self {
        Self { days, now }
    }
}

impl FlagRule for InactivityRule {
    fn name(&self) -> &'static str {
        "inactivity"
    }

    fn evaluate(&self, measurements: &[&Measurement]) -> Result<Vec<AlertRecord>, SchemaError> {
        let cutoff = days_before(self.now, self.days);
        let mut latest: BTreeMap<&str, &Measurement> = BTreeMap::new();

        for &m in measurements {
            latest
                .entry(m.athlete_id.as_str())
                .and_modify(|current| {
                    if m.timestamp >= current.timestamp {
                        *current = m;
                    }
                })
                .or_insert(m);
        }

        Ok(latest
            .into_values()
            .filter(|m| m.timestamp < cutoff)
            .map(|m| AlertRecord {
                athlete_id: m.athlete_id.clone(),
                team: m.team.clone(),
                metric: None,
                reason: format!("Inactive > {} days", self.days),
                value: None,
                reference_date: m.timestamp,
            })
            .collect())
    }
}
