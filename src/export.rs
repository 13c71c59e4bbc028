use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::models::AlertRecord;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
struct AlertRow<'a> {
    athlete_id: &'a str,
    team: &'a str,
    metric: Option<&'a str>,
    flag_reason: &'a str,
    metric_value: Option<String>,
    last_test_date: String,
}

impl<'a> From<&'a AlertRecord> for AlertRow<'a> {
    fn from(alert: &'a AlertRecord) -> Self {
        Self {
            athlete_id: &alert.athlete_id,
            team: &alert.team,
            metric: alert.metric.as_deref(),
            flag_reason: &alert.reason,
            metric_value: alert.value.as_ref().map(ToString::to_string),
            last_test_date: alert.reference_date.format(DATE_FORMAT).to_string(),
        }
    }
}

pub fn write_alerts<W: std::io::Write>(writer: W, alerts: &[AlertRecord]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if alerts.is_empty() {
        writer.write_record([
            "athlete_id",
            "team",
            "metric",
            "flag_reason",
            "metric_value",
            "last_test_date",
        ])?;
    }
    for alert in alerts {
        writer.serialize(AlertRow::from(alert))?;
    }
    writer.flush()?;
    Ok(())
}

/// Overwrites any existing file at `path`.
pub fn export_alerts(path: &Path, alerts: &[AlertRecord]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_alerts(file, alerts).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::fixtures::at;
    use crate::models::AlertValue;

    fn alerts() -> Vec<AlertRecord> {
        vec![
            AlertRecord {
                athlete_id: "Avery Lee".to_string(),
                team: "Falcons".to_string(),
                metric: None,
                reason: "Inactive > 30 days".to_string(),
                value: None,
                reference_date: at(2025, 1, 3),
            },
            AlertRecord {
                athlete_id: "Jules Moreno".to_string(),
                team: "Falcons".to_string(),
                metric: Some("MaxForce_left/MaxForce_right".to_string()),
                reason: "Asymmetry > 10%".to_string(),
                value: Some(AlertValue::Pair {
                    left: 2010.0,
                    right: 1710.5,
                }),
                reference_date: at(2025, 5, 5),
            },
        ]
    }

    #[test]
    fn writes_header_and_formatted_rows() {
        let mut buffer = Vec::new();
        write_alerts(&mut buffer, &alerts()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "athlete_id,team,metric,flag_reason,metric_value,last_test_date"
        );
        assert_eq!(lines[1], "Avery Lee,Falcons,,Inactive > 30 days,,2025-01-03 09:00:00");
        assert_eq!(
            lines[2],
            "Jules Moreno,Falcons,MaxForce_left/MaxForce_right,Asymmetry > 10%,2010.00/1710.50,2025-05-05 09:00:00"
        );
    }

    #[test]
    fn empty_export_still_has_header() {
        let mut buffer = Vec::new();
        write_alerts(&mut buffer, &[]).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "athlete_id,team,metric,flag_reason,metric_value,last_test_date\n"
        );
    }

    #[test]
    fn export_overwrites_existing_file() {
        let path = std::env::temp_dir().join(format!("alerts-{}.csv", std::process::id()));
        std::fs::write(&path, "stale contents\nmore\nlines\nhere\n").unwrap();
        export_alerts(&path, &alerts()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1][4], "2010.00/1710.50");
    }
}
