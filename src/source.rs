use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::SchemaError;
use crate::models::Measurement;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

struct Columns {
    athlete_id: usize,
    team: usize,
    sport: Option<usize>,
    metric: usize,
    value: usize,
    timestamp: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord, table: &str) -> Result<Self, SchemaError> {
        let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.trim()));
        let require = |names: &[&str], column: &'static str| {
            find(names).ok_or_else(|| SchemaError::MissingColumn {
                table: table.to_string(),
                column,
            })
        };

        Ok(Self {
            athlete_id: require(&["athlete_id", "playername"], "athlete_id")?,
            team: require(&["team"], "team")?,
            sport: find(&["sport"]),
            metric: require(&["metric"], "metric")?,
            value: require(&["value"], "value")?,
            timestamp: require(&["timestamp"], "timestamp")?,
        })
    }
}

/// Read a long-form measurement table. Every row is returned; filtering by
/// metric happens in [`load_measurements`].
pub fn read_measurements<R: std::io::Read>(
    reader: R,
    table: &str,
) -> Result<Vec<Measurement>, SchemaError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|err| SchemaError::Unreadable {
            table: table.to_string(),
            reason: err.to_string(),
        })?
        .clone();
    let columns = Columns::locate(&headers, table)?;

    let mut measurements = Vec::new();
    for (index, record) in reader.records().enumerate() {
        // header is line 1
        let row = index + 2;
        let record = record.map_err(|err| SchemaError::Unreadable {
            table: format!("{table} row {row}"),
            reason: err.to_string(),
        })?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let raw_value = field(columns.value);
        let value = if raw_value.is_empty() || raw_value.eq_ignore_ascii_case("null") {
            None
        } else {
            let bad_value = || SchemaError::BadValue {
                row,
                raw: raw_value.to_string(),
            };
            // `parse` also accepts spellings such as `nan` and `inf`.
            let parsed = raw_value.parse::<f64>().map_err(|_| bad_value())?;
            if !parsed.is_finite() {
                return Err(bad_value());
            }
            Some(parsed)
        };

        let raw_timestamp = field(columns.timestamp);
        let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| SchemaError::BadTimestamp {
            row,
            raw: raw_timestamp.to_string(),
        })?;

        measurements.push(Measurement {
            athlete_id: field(columns.athlete_id).to_string(),
            team: field(columns.team).to_string(),
            sport: columns
                .sport
                .map(field)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            metric: field(columns.metric).to_string(),
            value,
            timestamp,
        });
    }

    Ok(measurements)
}

/// Same filter as the database fetch: selected metrics, non-blank athlete and team.
pub fn retain_fetchable(measurements: &mut Vec<Measurement>, metrics: &[String]) {
    let wanted: HashSet<&str> = metrics.iter().map(String::as_str).collect();
    measurements.retain(|m| {
        wanted.contains(m.metric.as_str())
            && !m.athlete_id.trim().is_empty()
            && !m.team.trim().is_empty()
    });
}

pub fn load_measurements(path: &Path, metrics: &[String]) -> anyhow::Result<Vec<Measurement>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut measurements = read_measurements(file, &path.display().to_string())?;
    retain_fetchable(&mut measurements, metrics);
    Ok(measurements)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
playername,team,sport,metric,value,timestamp,data_source
Avery Lee,Falcons,soccer,Jump Height (m),0.41,2025-03-01 10:15:00,hawkins
Avery Lee,Falcons,,distance_total,,2025-03-01,kinexon
,Falcons,soccer,Jump Height (m),0.39,2025-03-01T10:15:00,hawkins
Jules Moreno,Falcons,soccer,MaxForce_left,0,2025-03-02 08:00,vald
";

    #[test]
    fn reads_rows_with_nulls_and_aliases() {
        let rows = read_measurements(SAMPLE.as_bytes(), "sample").unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].athlete_id, "Avery Lee");
        assert_eq!(rows[0].sport.as_deref(), Some("soccer"));
        assert_eq!(rows[0].value, Some(0.41));
        assert_eq!(rows[1].sport, None);
        assert_eq!(rows[1].value, None);
        assert_eq!(rows[1].timestamp, parse_timestamp("2025-03-01 00:00:00").unwrap());
        assert_eq!(rows[3].value, Some(0.0));
    }

    #[test]
    fn retain_matches_database_filter() {
        let mut rows = read_measurements(SAMPLE.as_bytes(), "sample").unwrap();
        retain_fetchable(&mut rows, &["Jump Height (m)".to_string()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].athlete_id, "Avery Lee");
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let csv = "athlete_id,team,metric,timestamp\na,T1,jump,2025-01-01\n";
        let err = read_measurements(csv.as_bytes(), "sample").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { column: "value", .. }));
    }

    #[test]
    fn bad_timestamp_reports_row() {
        let csv = "athlete_id,team,metric,value,timestamp\na,T1,jump,1.0,yesterday\n";
        let err = read_measurements(csv.as_bytes(), "sample").unwrap_err();
        assert!(matches!(err, SchemaError::BadTimestamp { row: 2, .. }));
    }

    #[test]
    fn non_finite_value_is_rejected() {
        for raw in ["nan", "NaN", "inf", "-infinity"] {
            let csv = format!("athlete_id,team,metric,value,timestamp\na,T1,jump,1.0,2025-01-01\nb,T1,jump,{raw},2025-01-01\n");
            let err = read_measurements(csv.as_bytes(), "sample").unwrap_err();
            assert!(
                matches!(&err, SchemaError::BadValue { row: 3, raw: r } if r == raw),
                "{raw}: {err}"
            );
        }
    }
}
