use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::models::{Measurement, WideSession, WideTable};

/// Pivot one athlete's long-form measurements into a session-indexed table.
///
/// Duplicate `(timestamp, metric)` readings are averaged; null readings do
/// not contribute. Metrics the athlete never recorded stay as empty columns.
pub fn reshape(measurements: &[Measurement], athlete_id: &str, metrics: &[String]) -> WideTable {
    let mut columns = Vec::with_capacity(metrics.len() + 1);
    columns.push("timestamp".to_string());
    columns.extend(metrics.iter().cloned());

    // (sum, count) per metric column, keyed by session
    let mut sessions: BTreeMap<NaiveDateTime, Vec<(f64, usize)>> = BTreeMap::new();

    for m in measurements.iter().filter(|m| m.athlete_id == athlete_id) {
        let Some(column) = metrics.iter().position(|metric| *metric == m.metric) else {
            continue;
        };
        let cells = sessions
            .entry(m.timestamp)
            .or_insert_with(|| vec![(0.0, 0); metrics.len()]);
        if let Some(value) = m.value {
            cells[column].0 += value;
            cells[column].1 += 1;
        }
    }

    let rows = sessions
        .into_iter()
        .map(|(timestamp, cells)| WideSession {
            timestamp,
            values: cells
                .into_iter()
                .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
                .collect(),
        })
        .collect();

    WideTable {
        athlete_id: athlete_id.to_string(),
        columns,
        rows,
    }
}
