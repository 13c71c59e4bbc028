use std::fmt::Write;

use crate::audit::AuditReport;
use crate::flags::RuleOutcome;
use crate::models::AlertRecord;

#[derive(Debug, Clone)]
pub struct ReasonSummary {
    pub reason: String,
    pub count: usize,
}

pub fn summarize_by_reason(alerts: &[AlertRecord]) -> Vec<ReasonSummary> {
    let mut map: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for alert in alerts {
        *map.entry(alert.reason.as_str()).or_insert(0) += 1;
    }

    let mut summaries: Vec<ReasonSummary> = map
        .into_iter()
        .map(|(reason, count)| ReasonSummary {
            reason: reason.to_string(),
            count,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    summaries
}

pub fn build_report(
    scope: &str,
    audit: &AuditReport,
    alerts: &[AlertRecord],
    outcomes: &[RuleOutcome],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Athlete Performance Flag Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} measurements, {} athletes, median {:.1} per athlete)",
        scope,
        audit.summary.total_rows,
        audit.summary.total_athletes,
        audit.summary.median_rows_per_athlete
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Missing Or Zero Values");

    if audit.missingness.is_empty() {
        let _ = writeln!(output, "No measurements recorded for the selected metrics.");
    } else {
        for row in &audit.missingness {
            let _ = writeln!(
                output,
                "- {}: {:.1}% missing ({} null, {} zero of {})",
                row.metric, row.missing_pct, row.null_count, row.zero_count, row.total_rows
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Coverage");

    if audit.coverage.is_empty() {
        let _ = writeln!(output, "No cohorts found.");
    } else {
        for row in &audit.coverage {
            let cohort = match &row.sport {
                Some(sport) => format!("{} / {}", row.team, sport),
                None => row.team.clone(),
            };
            let _ = writeln!(
                output,
                "- {}: {}/{} athletes with enough measurements ({:.1}%)",
                cohort, row.athletes_sufficient, row.total_athletes, row.pct_sufficient
            );
        }
    }
    let _ = writeln!(
        output,
        "- {} athletes meet the bar on every metric",
        audit.sufficient_athletes().len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Stale Athletes");

    match audit.recency_cutoff {
        Some(cutoff) => {
            let stale: Vec<_> = audit.stale().collect();
            if stale.is_empty() {
                let _ = writeln!(output, "Everyone measured since {}.", cutoff.date());
            } else {
                for row in stale {
                    let _ = writeln!(
                        output,
                        "- {} ({}) last measured {}",
                        row.athlete_id,
                        row.team,
                        row.last_measured.date()
                    );
                }
            }
        }
        None => {
            let _ = writeln!(output, "No measurements to date.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Flags");

    for outcome in outcomes {
        let _ = writeln!(output, "- {}: {} alerts", outcome.rule, outcome.alerts);
    }
    for summary in summarize_by_reason(alerts) {
        let _ = writeln!(output, "- {}: {}", summary.reason, summary.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Flagged Athletes");

    if alerts.is_empty() {
        let _ = writeln!(output, "No athletes flagged.");
    } else {
        for alert in alerts.iter().take(20) {
            let value = alert
                .value
                .as_ref()
                .map(|v| format!(" = {v}"))
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {} ({}) {}{}: {} on {}",
                alert.athlete_id,
                alert.team,
                alert.metric.as_deref().unwrap_or("all metrics"),
                value,
                alert.reason,
                alert.reference_date.date()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::run_audit;
    use crate::cohort::fixtures::{at, measurement};
    use crate::config::AnalysisConfig;
    use crate::flags::FlagEvaluator;

    #[test]
    fn reasons_are_counted_and_ranked() {
        let alert = |reason: &str| AlertRecord {
            athlete_id: "a".to_string(),
            team: "T1".to_string(),
            metric: None,
            reason: reason.to_string(),
            value: None,
            reference_date: at(2025, 1, 1),
        };
        let alerts = vec![alert("Declined > 10%"), alert("Inactive > 30 days"), alert("Declined > 10%")];
        let summaries = summarize_by_reason(&alerts);
        assert_eq!(summaries[0].reason, "Declined > 10%");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[1].count, 1);
    }

    #[test]
    fn report_covers_audit_and_flags() {
        let mut config = AnalysisConfig::default();
        config.selected_metrics = vec!["jump".to_string()];
        let rows = vec![
            measurement("a", "T1", "jump", Some(100.0), at(2025, 1, 1)),
            measurement("a", "T1", "jump", Some(100.0), at(2025, 1, 2)),
            measurement("a", "T1", "jump", Some(70.0), at(2025, 1, 3)),
            measurement("b", "T1", "jump", None, at(2025, 9, 1)),
        ];
        let now = at(2025, 1, 10);
        let audit = run_audit(&rows, &config, now);
        let (alerts, outcomes) = FlagEvaluator::from_config(&config, now)
            .evaluate(&rows)
            .unwrap();

        let report = build_report("all teams", &audit, &alerts, &outcomes);
        assert!(report.contains("# Athlete Performance Flag Report"));
        assert!(report.contains("- jump: 25.0% missing (1 null, 0 zero of 4)"));
        assert!(report.contains("- a (T1) last measured 2025-01-03"));
        assert!(report.contains("- decline: 1 alerts"));
        assert!(report.contains("- a (T1) jump = 70: Declined > 10% on 2025-01-03"));
    }
}
