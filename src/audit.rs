use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::cohort::group_rows;
use crate::config::{AnalysisConfig, CohortGrouping, RecencyReference};
use crate::models::{
    CoverageRow, DatasetSummary, Measurement, MissingnessRow, RecencyRow, SufficiencyRow,
};

/// Rows the audits operate on: selected metrics, non-blank athlete and team.
pub fn audit_rows<'a>(measurements: &'a [Measurement], metrics: &[String]) -> Vec<&'a Measurement> {
    let wanted: HashSet<&str> = metrics.iter().map(String::as_str).collect();
    measurements
        .iter()
        .filter(|m| wanted.contains(m.metric.as_str()))
        .filter(|m| !m.athlete_id.trim().is_empty() && !m.team.trim().is_empty())
        .collect()
}

/// Null-or-zero share per metric, worst metric first.
pub fn missingness(rows: &[&Measurement]) -> Vec<MissingnessRow> {
    let mut report: Vec<MissingnessRow> = group_rows(rows.iter().copied(), |m: &Measurement| {
        m.metric.clone()
    })
    .into_iter()
    .map(|(metric, members)| {
        let null_count = members.iter().filter(|m| m.value.is_none()).count();
        let zero_count = members.iter().filter(|m| m.value == Some(0.0)).count();
        let total_rows = members.len();
        MissingnessRow {
            metric,
            null_count,
            zero_count,
            total_rows,
            missing_pct: (null_count + zero_count) as f64 / total_rows as f64 * 100.0,
        }
    })
    .collect();

    report.sort_by(|a, b| {
        b.missing_pct
            .total_cmp(&a.missing_pct)
            .then_with(|| a.metric.cmp(&b.metric))
    });
    report
}

/// Share of athletes per cohort with at least `min_measurements` rows summed
/// across every selected metric.
pub fn coverage(
    rows: &[&Measurement],
    grouping: CohortGrouping,
    min_measurements: usize,
) -> Vec<CoverageRow> {
    let mut counts: BTreeMap<(String, Option<String>), BTreeMap<&str, usize>> = BTreeMap::new();

    for m in rows {
        let sport = match grouping {
            CohortGrouping::Team => None,
            CohortGrouping::TeamSport => m.sport.clone(),
        };
        *counts
            .entry((m.team.clone(), sport))
            .or_default()
            .entry(m.athlete_id.as_str())
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((team, sport), athletes)| {
            let total_athletes = athletes.len();
            let athletes_sufficient = athletes
                .values()
                .filter(|&&count| count >= min_measurements)
                .count();
            CoverageRow {
                team,
                sport,
                total_athletes,
                athletes_sufficient,
                pct_sufficient: athletes_sufficient as f64 / total_athletes as f64 * 100.0,
            }
        })
        .collect()
}

/// `days` before `anchor`. Windows reaching past the earliest representable
/// date clamp to it, so nothing falls before the cutoff.
pub fn days_before(anchor: NaiveDateTime, days: i64) -> NaiveDateTime {
    TimeDelta::try_days(days)
        .and_then(|window| anchor.checked_sub_signed(window))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Cutoff for the recency audit. The dataset reference keeps the audit
/// reproducible against historical snapshots; `now` anchors the wall-clock
/// reference.
pub fn recency_cutoff(
    rows: &[&Measurement],
    reference: RecencyReference,
    window_days: i64,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let anchor = match reference {
        RecencyReference::Dataset => rows.iter().map(|m| m.timestamp).max()?,
        RecencyReference::WallClock => now,
    };
    Some(days_before(anchor, window_days))
}

/// Most recent measurement per athlete, marked stale when strictly older
/// than `cutoff`.
pub fn recency(rows: &[&Measurement], cutoff: NaiveDateTime) -> Vec<RecencyRow> {
    let mut latest: BTreeMap<&str, &Measurement> = BTreeMap::new();

    for &m in rows {
        latest
            .entry(m.athlete_id.as_str())
            .and_modify(|current| {
                if m.timestamp >= current.timestamp {
                    *current = m;
                }
            })
            .or_insert(m);
    }

    latest
        .into_values()
        .map(|m| RecencyRow {
            athlete_id: m.athlete_id.clone(),
            team: m.team.clone(),
            last_measured: m.timestamp,
            stale: m.timestamp < cutoff,
        })
        .collect()
}

/// Strict sufficiency: an athlete qualifies only when every selected metric
/// individually reaches `min_measurements`.
pub fn strict_sufficiency(
    rows: &[&Measurement],
    metrics: &[String],
    min_measurements: usize,
) -> Vec<SufficiencyRow> {
    let mut counts: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for m in rows {
        *counts
            .entry(m.athlete_id.as_str())
            .or_default()
            .entry(m.metric.as_str())
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(athlete_id, per_metric)| {
            let metric_counts: Vec<(String, usize)> = metrics
                .iter()
                .map(|metric| {
                    let count = per_metric.get(metric.as_str()).copied().unwrap_or(0);
                    (metric.clone(), count)
                })
                .collect();
            let sufficient = metric_counts
                .iter()
                .all(|(_, count)| *count >= min_measurements);
            SufficiencyRow {
                athlete_id: athlete_id.to_string(),
                metric_counts,
                sufficient,
            }
        })
        .collect()
}

pub fn dataset_summary(rows: &[&Measurement]) -> DatasetSummary {
    let mut per_athlete: BTreeMap<&str, usize> = BTreeMap::new();
    for m in rows {
        *per_athlete.entry(m.athlete_id.as_str()).or_insert(0) += 1;
    }

    let mut sizes: Vec<usize> = per_athlete.values().copied().collect();
    sizes.sort_unstable();
    let median_rows_per_athlete = match sizes.len() {
        0 => 0.0,
        n if n % 2 == 1 => sizes[n / 2] as f64,
        n => (sizes[n / 2 - 1] + sizes[n / 2]) as f64 / 2.0,
    };

    DatasetSummary {
        total_rows: rows.len(),
        total_athletes: per_athlete.len(),
        median_rows_per_athlete,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub summary: DatasetSummary,
    pub missingness: Vec<MissingnessRow>,
    pub coverage: Vec<CoverageRow>,
    pub recency_cutoff: Option<NaiveDateTime>,
    pub recency: Vec<RecencyRow>,
    pub sufficiency: Vec<SufficiencyRow>,
}

impl AuditReport {
    pub fn stale(&self) -> impl Iterator<Item = &RecencyRow> {
        self.recency.iter().filter(|r| r.stale)
    }

    pub fn sufficient_athletes(&self) -> BTreeSet<&str> {
        self.sufficiency
            .iter()
            .filter(|s| s.sufficient)
            .map(|s| s.athlete_id.as_str())
            .collect()
    }
}

pub fn run_audit(
    measurements: &[Measurement],
    config: &AnalysisConfig,
    now: NaiveDateTime,
) -> AuditReport {
    let rows = audit_rows(measurements, &config.selected_metrics);
    let cutoff = recency_cutoff(&rows, config.recency_reference, config.recency_window_days, now);

    AuditReport {
        summary: dataset_summary(&rows),
        missingness: missingness(&rows),
        coverage: coverage(&rows, config.cohort, config.min_measurements),
        recency_cutoff: cutoff,
        recency: cutoff.map(|c| recency(&rows, c)).unwrap_or_default(),
        sufficiency: strict_sufficiency(&rows, &config.selected_metrics, config.min_measurements),
    }
}
