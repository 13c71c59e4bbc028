//! Rule-based flagging of athletes that need attention.
//!
//! Each rule is an independent, side-effect-free transform from the
//! measurement table to alert records. The evaluator runs the registered
//! rules in order and concatenates their output without deduplication.

use chrono::{NaiveDateTime, Utc};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::error::{FlagError, SchemaError};
use crate::models::{AlertRecord, Measurement};

mod asymmetry;
mod decline;
mod inactivity;
mod outlier;

pub use asymmetry::AsymmetryRule;
pub use decline::DeclineRule;
pub use inactivity::InactivityRule;
pub use outlier::TeamNormRule;

pub trait FlagRule {
    fn name(&self) -> &'static str;

    /// Label for per-rule counts and errors. Rules registered more than once
    /// override it to tell their instances apart.
    fn label(&self) -> String {
        self.name().to_string()
    }

    /// Degenerate groups are skipped inside the rule; an `Err` means the
    /// input itself could not be evaluated.
    fn evaluate(&self, measurements: &[&Measurement]) -> Result<Vec<AlertRecord>, SchemaError>;
}

#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub rule: String,
    pub alerts: usize,
}

pub struct FlagEvaluator {
    rules: Vec<Box<dyn FlagRule>>,
}

impl FlagEvaluator {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: impl FlagRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Inactivity, decline, team-norm outlier and asymmetry, in that order.
    pub fn from_config(config: &AnalysisConfig, now: NaiveDateTime) -> Self {
        let mut evaluator = Self::new()
            .with_rule(InactivityRule::new(config.inactivity_days, now))
            .with_rule(DeclineRule::new(config.decline_threshold))
            .with_rule(TeamNormRule::new(config.team_norm_sd));
        for pair in &config.bilateral_pairs {
            evaluator = evaluator.with_rule(AsymmetryRule::new(pair.clone(), config.asymmetry_threshold));
        }
        evaluator
    }

    pub fn with_wall_clock(config: &AnalysisConfig) -> Self {
        Self::from_config(config, Utc::now().naive_utc())
    }

    pub fn evaluate(
        &self,
        measurements: &[Measurement],
    ) -> Result<(Vec<AlertRecord>, Vec<RuleOutcome>), FlagError> {
        let rows = flaggable_rows(measurements);
        let mut alerts = Vec::new();
        let mut outcomes = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let label = rule.label();
            let produced = match rule.evaluate(&rows) {
                Ok(produced) => produced,
                Err(source) => return Err(FlagError { rule: label, source }),
            };
            info!(rule = %label, alerts = produced.len(), "flag rule evaluated");
            outcomes.push(RuleOutcome {
                rule: label,
                alerts: produced.len(),
            });
            alerts.extend(produced);
        }

        Ok((alerts, outcomes))
    }
}

impl Default for FlagEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Flag rules only consider recorded values.
fn flaggable_rows(measurements: &[Measurement]) -> Vec<&Measurement> {
    measurements
        .iter()
        .filter(|m| m.value.is_some())
        .filter(|m| !m.athlete_id.trim().is_empty() && !m.team.trim().is_empty())
        .collect()
}

/// Recorded value of a row, rejecting NaN and infinities.
fn finite_value(m: &Measurement) -> Result<Option<f64>, SchemaError> {
    match m.value {
        Some(value) if !value.is_finite() => Err(SchemaError::NonFiniteValue {
            athlete_id: m.athlete_id.clone(),
            metric: m.metric.clone(),
            value,
        }),
        other => Ok(other),
    }
}

fn percent_label(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::fixtures::{at, measurement};
    use crate::config::BilateralPair;

    fn dataset() -> Vec<Measurement> {
        let mut rows = vec![
            // stale athlete with a decline
            measurement("a", "T1", "jump", Some(100.0), at(2025, 1, 1)),
            measurement("a", "T1", "jump", Some(100.0), at(2025, 1, 2)),
            measurement("a", "T1", "jump", Some(70.0), at(2025, 1, 3)),
            measurement("b", "T1", "MaxForce_left", Some(100.0), at(2025, 6, 1)),
            measurement("b", "T1", "MaxForce_right", Some(80.0), at(2025, 6, 1)),
            measurement("b", "T1", "jump", None, at(2025, 6, 2)),
        ];
        for (i, value) in [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 50.0]
            .into_iter()
            .enumerate()
        {
            let athlete = format!("p{i}");
            rows.push(measurement(&athlete, "T2", "power", Some(value), at(2025, 6, 1)));
        }
        rows
    }

    #[test]
    fn union_is_concatenation_of_rule_outputs() {
        let config = AnalysisConfig::default();
        let evaluator = FlagEvaluator::from_config(&config, at(2025, 6, 15));
        let (alerts, outcomes) = evaluator.evaluate(&dataset()).unwrap();

        let names: Vec<_> = outcomes.iter().map(|o| o.rule.as_str()).collect();
        assert_eq!(
            names,
            vec!["inactivity", "decline", "team_norm", "asymmetry(MaxForce_left/MaxForce_right)"]
        );
        assert_eq!(alerts.len(), outcomes.iter().map(|o| o.alerts).sum::<usize>());

        assert_eq!(outcomes[0].alerts, 1);
        assert_eq!(outcomes[1].alerts, 1);
        assert_eq!(outcomes[2].alerts, 1);
        assert_eq!(outcomes[3].alerts, 1);
        assert!(alerts[0].metric.is_none());
        assert_eq!(alerts[1].metric.as_deref(), Some("jump"));
        assert_eq!(alerts[2].athlete_id, "p9");
        assert_eq!(alerts[3].metric.as_deref(), Some("MaxForce_left/MaxForce_right"));
    }

    #[test]
    fn each_bilateral_pair_reports_under_its_own_label() {
        let mut config = AnalysisConfig::default();
        config.bilateral_pairs.push(BilateralPair::parse("Hop_left:Hop_right").unwrap());
        let mut rows = dataset();
        rows.push(measurement("c", "T1", "Hop_left", Some(10.0), at(2025, 6, 1)));
        rows.push(measurement("c", "T1", "Hop_right", Some(10.0), at(2025, 6, 1)));

        let (_, outcomes) = FlagEvaluator::from_config(&config, at(2025, 6, 15))
            .evaluate(&rows)
            .unwrap();
        let asymmetry: Vec<_> = outcomes
            .iter()
            .filter(|o| o.rule.starts_with("asymmetry"))
            .map(|o| (o.rule.as_str(), o.alerts))
            .collect();
        assert_eq!(
            asymmetry,
            vec![
                ("asymmetry(MaxForce_left/MaxForce_right)", 1),
                ("asymmetry(Hop_left/Hop_right)", 0),
            ]
        );
    }

    #[test]
    fn oversized_inactivity_window_evaluates_without_alerts() {
        let mut config = AnalysisConfig::default();
        config.inactivity_days = i64::MAX / 2;
        let (_, outcomes) = FlagEvaluator::from_config(&config, at(2025, 6, 15))
            .evaluate(&dataset())
            .unwrap();
        assert_eq!(outcomes[0].rule, "inactivity");
        assert_eq!(outcomes[0].alerts, 0);
    }

    #[test]
    fn same_athlete_can_appear_under_several_rules() {
        let evaluator = FlagEvaluator::new()
            .with_rule(InactivityRule::new(30, at(2025, 6, 15)))
            .with_rule(DeclineRule::new(0.10));
        let (alerts, _) = evaluator.evaluate(&dataset()).unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.athlete_id == "a"));
    }

    #[test]
    fn non_finite_value_fails_the_rule() {
        let mut rows = dataset();
        rows.push(measurement("z", "T1", "jump", Some(f64::NAN), at(2025, 6, 1)));
        let evaluator = FlagEvaluator::new().with_rule(DeclineRule::new(0.10));
        let err = evaluator.evaluate(&rows).unwrap_err();
        assert_eq!(err.rule, "decline");
        assert!(matches!(err.source, SchemaError::NonFiniteValue { .. }));
    }

    #[test]
    fn empty_input_yields_no_alerts() {
        let evaluator = FlagEvaluator::from_config(&AnalysisConfig::default(), at(2025, 6, 15));
        let (alerts, outcomes) = evaluator.evaluate(&[]).unwrap();
        assert!(alerts.is_empty());
        assert_eq!(outcomes.len(), 4);
    }
}
