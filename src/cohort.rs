//! Group-by primitives shared by the derived metrics, audit and flag rules.
//!
//! Groups keep first-appearance order so every consumer iterates
//! deterministically without sorting hash maps.

use std::collections::HashMap;
use std::hash::Hash;

use crate::models::{AthleteSummary, Measurement, PercentDiffRow, ZScoreRow};

/// Mean and population standard deviation of a group of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl GroupStats {
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        // Identical values can still leave rounding residue in the variance.
        let std_dev = if values.iter().all(|v| *v == values[0]) {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64).sqrt()
        };
        Some(Self {
            count,
            mean,
            std_dev,
        })
    }

    /// `None` when the mean is zero.
    pub fn pct_diff(&self, value: f64) -> Option<f64> {
        if self.mean == 0.0 {
            return None;
        }
        Some((value - self.mean) / self.mean * 100.0)
    }

    /// A group without dispersion has every member on the mean.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev == 0.0 {
            return 0.0;
        }
        (value - self.mean) / self.std_dev
    }

    pub fn is_outlier(&self, value: f64, n_sd: f64) -> bool {
        if self.std_dev == 0.0 || !self.std_dev.is_finite() {
            return false;
        }
        (value - self.mean).abs() > n_sd * self.std_dev
    }
}

/// Partition `rows` by `key`, preserving first-appearance order of keys and
/// input order within each group.
pub fn group_rows<'a, T, K, F>(rows: impl IntoIterator<Item = &'a T>, key: F) -> Vec<(K, Vec<&'a T>)>
where
    T: 'a,
    K: Hash + Eq + Clone,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&'a T>)> = Vec::new();

    for row in rows {
        let k = key(row);
        match index.get(&k) {
            Some(&position) => groups[position].1.push(row),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![row]));
            }
        }
    }

    groups
}

/// Rows that carry a usable number. Null and non-finite values take no part
/// in group statistics.
fn has_finite_value(m: &Measurement) -> bool {
    m.value.is_some_and(f64::is_finite)
}

/// Per-group statistics over the non-null values of a measurement table.
#[derive(Debug, Clone)]
pub struct CohortStats<K> {
    groups: Vec<(K, GroupStats)>,
    index: HashMap<K, usize>,
}

impl<K> CohortStats<K>
where
    K: Hash + Eq + Clone,
{
    pub fn compute<'a, F>(rows: impl IntoIterator<Item = &'a Measurement>, key: F) -> Self
    where
        F: Fn(&Measurement) -> K,
    {
        let valued = rows.into_iter().filter(|m| has_finite_value(m));
        let mut groups = Vec::new();
        let mut index = HashMap::new();

        for (k, members) in group_rows(valued, key) {
            if let Some(stats) = GroupStats::from_values(members.iter().filter_map(|m| m.value)) {
                index.insert(k.clone(), groups.len());
                groups.push((k, stats));
            }
        }

        Self { groups, index }
    }

    pub fn get(&self, key: &K) -> Option<&GroupStats> {
        self.index.get(key).map(|&position| &self.groups[position].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, GroupStats)> {
        self.groups.iter()
    }

    /// Broadcast each row's group statistics back onto the row. Rows with a
    /// null or non-finite value are not annotated.
    pub fn annotate<'a, F>(
        &self,
        rows: impl IntoIterator<Item = &'a Measurement>,
        key: F,
    ) -> Vec<(&'a Measurement, GroupStats)>
    where
        F: Fn(&Measurement) -> K,
    {
        rows.into_iter()
            .filter(|m| has_finite_value(m))
            .filter_map(|m| self.get(&key(m)).map(|stats| (m, *stats)))
            .collect()
    }
}

pub fn team_metric_key(m: &Measurement) -> (String, String) {
    (m.team.clone(), m.metric.clone())
}

/// Percent difference of every valued row from its `(team, metric)` mean.
/// Rows in a zero-mean group are dropped.
pub fn percent_differences(rows: &[Measurement]) -> Vec<PercentDiffRow> {
    let stats = CohortStats::compute(rows, team_metric_key);
    stats
        .annotate(rows, team_metric_key)
        .into_iter()
        .filter_map(|(m, group)| {
            let value = m.value?;
            let pct_diff = group.pct_diff(value)?;
            Some(PercentDiffRow {
                athlete_id: m.athlete_id.clone(),
                team: m.team.clone(),
                metric: m.metric.clone(),
                value,
                team_mean: group.mean,
                pct_diff,
                timestamp: m.timestamp,
            })
        })
        .collect()
}

pub fn athlete_summaries(diffs: &[PercentDiffRow]) -> Vec<AthleteSummary> {
    group_rows(diffs, |d: &PercentDiffRow| {
        (d.team.clone(), d.athlete_id.clone(), d.metric.clone())
    })
    .into_iter()
    .map(|((team, athlete_id, metric), members)| AthleteSummary {
        team,
        athlete_id,
        metric,
        avg_pct_diff: members.iter().map(|d| d.pct_diff).sum::<f64>() / members.len() as f64,
    })
    .collect()
}

pub fn top_performers(summaries: &[AthleteSummary], n: usize) -> Vec<AthleteSummary> {
    let mut ranked = summaries.to_vec();
    ranked.sort_by(|a, b| {
        b.avg_pct_diff
            .total_cmp(&a.avg_pct_diff)
            .then_with(|| summary_key(a).cmp(&summary_key(b)))
    });
    ranked.truncate(n);
    ranked
}

pub fn bottom_performers(summaries: &[AthleteSummary], n: usize) -> Vec<AthleteSummary> {
    let mut ranked = summaries.to_vec();
    ranked.sort_by(|a, b| {
        a.avg_pct_diff
            .total_cmp(&b.avg_pct_diff)
            .then_with(|| summary_key(a).cmp(&summary_key(b)))
    });
    ranked.truncate(n);
    ranked
}

fn summary_key(s: &AthleteSummary) -> (&str, &str, &str) {
    (s.team.as_str(), s.athlete_id.as_str(), s.metric.as_str())
}

pub fn z_scores(rows: &[Measurement]) -> Vec<ZScoreRow> {
    let stats = CohortStats::compute(rows, team_metric_key);
    stats
        .annotate(rows, team_metric_key)
        .into_iter()
        .filter_map(|(m, group)| {
            let value = m.value?;
            Some(ZScoreRow {
                athlete_id: m.athlete_id.clone(),
                team: m.team.clone(),
                metric: m.metric.clone(),
                value,
                z_score: group.z_score(value),
            })
        })
        .collect()
}
