use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Row};

use crate::models::Measurement;
use crate::source;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let athletes = [
        ("Avery Lee", "Falcons", "soccer"),
        ("Jules Moreno", "Falcons", "soccer"),
        ("Kiara Patel", "Harriers", "track"),
    ];

    let sessions = [
        "2025-01-06 09:00:00",
        "2025-02-03 09:00:00",
        "2025-03-03 09:00:00",
        "2025-04-07 09:00:00",
        "2025-05-05 09:00:00",
    ];

    // (jump height, peak power, left force, right force) per session
    let profiles: [[(f64, f64, f64, f64); 5]; 3] = [
        [
            (0.42, 4100.0, 2150.0, 2080.0),
            (0.43, 4180.0, 2170.0, 2120.0),
            (0.44, 4210.0, 2190.0, 2100.0),
            (0.43, 4150.0, 2200.0, 2130.0),
            (0.35, 3600.0, 2210.0, 2140.0),
        ],
        [
            (0.38, 3800.0, 1980.0, 1700.0),
            (0.39, 3850.0, 2010.0, 1720.0),
            (0.38, 3790.0, 2000.0, 1690.0),
            (0.40, 3900.0, 2020.0, 1710.0),
            (0.40, 3920.0, 2040.0, 1730.0),
        ],
        [
            (0.51, 4600.0, 2400.0, 2380.0),
            (0.52, 4650.0, 2420.0, 2410.0),
            (0.50, 4580.0, 2390.0, 2400.0),
            (0.0, 0.0, 2410.0, 2395.0),
            (0.51, 4620.0, 2430.0, 2420.0),
        ],
    ];

    let mut inserted = 0usize;
    for ((athlete, team, sport), profile) in athletes.into_iter().zip(profiles.iter()) {
        for (session, (jump, power, left, right)) in sessions.iter().zip(profile.iter()) {
            let recorded_at = NaiveDateTime::parse_from_str(session, "%Y-%m-%d %H:%M:%S")
                .context("invalid seed timestamp")?;
            let readings = [
                ("hawkins", "Jump Height (m)", *jump),
                ("hawkins", "Peak Propulsive Power (W)", *power),
                ("vald", "MaxForce_left", *left),
                ("vald", "MaxForce_right", *right),
            ];

            for (data_source, metric, value) in readings {
                let source_key = format!("seed-{athlete}-{metric}-{session}");
                let result = sqlx::query(
                    r#"
                    INSERT INTO athlete_performance.measurements
                    (athlete_id, team, sport, metric, value, recorded_at, data_source, source_key)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (source_key) DO NOTHING
                    "#,
                )
                .bind(athlete)
                .bind(team)
                .bind(sport)
                .bind(metric)
                .bind(value)
                .bind(recorded_at)
                .bind(data_source)
                .bind(source_key)
                .execute(pool)
                .await?;
                inserted += result.rows_affected() as usize;
            }
        }
    }

    Ok(inserted)
}

/// Measurements for the requested metrics with a non-blank athlete and team.
/// The metric filter is bound as a text array, never interpolated.
pub async fn fetch_measurements(
    pool: &PgPool,
    metrics: &[String],
) -> anyhow::Result<Vec<Measurement>> {
    let records = sqlx::query(
        r#"
        SELECT athlete_id, team, sport, metric, value, recorded_at
        FROM athlete_performance.measurements
        WHERE metric = ANY($1)
          AND athlete_id IS NOT NULL AND TRIM(athlete_id) <> ''
          AND team IS NOT NULL AND TRIM(team) <> ''
        ORDER BY recorded_at, id
        "#,
    )
    .bind(metrics)
    .fetch_all(pool)
    .await
    .context("failed to fetch measurements")?;

    let mut measurements = Vec::with_capacity(records.len());
    for row in records {
        measurements.push(Measurement {
            athlete_id: row.try_get("athlete_id")?,
            team: row.try_get("team")?,
            sport: row.try_get("sport")?,
            metric: row.try_get("metric")?,
            value: row.try_get("value")?,
            timestamp: row.try_get("recorded_at")?,
        });
    }

    Ok(measurements)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let measurements = source::read_measurements(file, &csv_path.display().to_string())?;
    let mut inserted = 0usize;

    for (index, m) in measurements.iter().enumerate() {
        if m.athlete_id.is_empty() || m.team.is_empty() {
            continue;
        }
        // stable per file row, so re-importing the same file is a no-op
        let source_key = format!(
            "import-{}-{}-{}-{index}",
            m.athlete_id, m.metric, m.timestamp
        );

        let result = sqlx::query(
            r#"
            INSERT INTO athlete_performance.measurements
            (athlete_id, team, sport, metric, value, recorded_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(&m.athlete_id)
        .bind(&m.team)
        .bind(&m.sport)
        .bind(&m.metric)
        .bind(m.value)
        .bind(m.timestamp)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
