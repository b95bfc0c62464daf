use crate::db::Database;
use crate::error::Result;
use crate::models::{ClimateFact, IrrigationEvent, QuotaCounter, StationReading, Tree, TreeStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;
use tracing::warn;

const DATE_FMT: &str = "%Y-%m-%d";

// Climate fact queries

impl Database {
    /// Upsert the raw measurement fields for one farm + date. The derived
    /// `pef` and `soil_balance` columns are left untouched so a re-fetch
    /// refines the fact without discarding the recalculator's work.
    pub fn merge_climate_fact(
        &self,
        farm_id: &str,
        date: NaiveDate,
        reading: &StationReading,
        et0: f64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO climate_facts
                    (farm_id, date, max_temp, min_temp, rain, rain_accumulated,
                     humidity, radiation, wind_speed, et0, is_mock, last_updated)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)
                ON CONFLICT(farm_id, date) DO UPDATE SET
                    max_temp = excluded.max_temp,
                    min_temp = excluded.min_temp,
                    rain = excluded.rain,
                    rain_accumulated = excluded.rain_accumulated,
                    humidity = excluded.humidity,
                    radiation = excluded.radiation,
                    wind_speed = excluded.wind_speed,
                    et0 = excluded.et0,
                    is_mock = excluded.is_mock,
                    last_updated = excluded.last_updated
                "#,
                params![
                    farm_id,
                    date.format(DATE_FMT).to_string(),
                    reading.max_temp,
                    reading.min_temp,
                    reading.rain,
                    reading.rain,
                    reading.humidity,
                    reading.radiation,
                    reading.wind_speed,
                    et0,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// All facts for the farm from `from` onward, ascending by date.
    pub fn climate_facts_since(&self, farm_id: &str, from: NaiveDate) -> Result<Vec<ClimateFact>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM climate_facts WHERE farm_id = ?1 AND date >= ?2 ORDER BY date ASC",
            )?;
            let facts = stmt
                .query_map(
                    params![farm_id, from.format(DATE_FMT).to_string()],
                    row_to_climate_fact,
                )?
                .filter_map(|r| r.ok())
                .collect();
            Ok(facts)
        })
    }

    pub fn latest_climate_fact(&self, farm_id: &str) -> Result<Option<ClimateFact>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM climate_facts WHERE farm_id = ?1 ORDER BY date DESC LIMIT 1",
                [farm_id],
                row_to_climate_fact,
            )
            .optional()
            .map_err(Into::into)
        })
    }
}

fn row_to_climate_fact(row: &Row) -> rusqlite::Result<ClimateFact> {
    let date_str: String = row.get("date")?;
    let last_updated_str: String = row.get("last_updated")?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    Ok(ClimateFact {
        farm_id: row.get("farm_id")?,
        date,
        max_temp: row.get("max_temp")?,
        min_temp: row.get("min_temp")?,
        rain: row.get("rain")?,
        rain_accumulated: row.get("rain_accumulated")?,
        humidity: row.get("humidity")?,
        radiation: row.get("radiation")?,
        wind_speed: row.get("wind_speed")?,
        et0: row.get("et0")?,
        pef: row.get("pef")?,
        soil_balance: row.get("soil_balance")?,
        is_mock: row.get("is_mock")?,
        last_updated: parse_timestamp(&last_updated_str),
    })
}

// Quota queries

impl Database {
    pub fn quota(&self, farm_id: &str) -> Result<Option<QuotaCounter>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT count, date, last_success FROM api_quota WHERE farm_id = ?1",
                [farm_id],
                |row| {
                    let date_str: String = row.get("date")?;
                    let last_success_str: Option<String> = row.get("last_success")?;
                    Ok(QuotaCounter {
                        count: row.get("count")?,
                        date: NaiveDate::parse_from_str(&date_str, DATE_FMT).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                1,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                        last_success: last_success_str.as_deref().map(parse_timestamp),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// Atomic increment with a date precondition: a counter carried over from
    /// a previous day resets to 1 instead of continuing the stale count.
    pub fn increment_quota(
        &self,
        farm_id: &str,
        today: NaiveDate,
        success_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO api_quota (farm_id, count, date, last_success)
                VALUES (?1, 1, ?2, ?3)
                ON CONFLICT(farm_id) DO UPDATE SET
                    count = CASE
                        WHEN api_quota.date = excluded.date THEN api_quota.count + 1
                        ELSE 1
                    END,
                    date = excluded.date,
                    last_success = excluded.last_success
                "#,
                params![
                    farm_id,
                    today.format(DATE_FMT).to_string(),
                    success_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }
}

// Tree queries

impl Database {
    pub fn insert_tree(&self, id: &str, trunk_diameter_cm: Option<f64>, kc: Option<f64>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO trees (id, status, trunk_diameter_cm, kc) VALUES (?1, ?2, ?3, ?4)",
                params![id, TreeStatus::Viable.as_str(), trunk_diameter_cm, kc],
            )?;
            Ok(())
        })
    }

    pub fn viable_trees(&self) -> Result<Vec<Tree>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM trees WHERE status = ?1 ORDER BY id")?;
            let trees = stmt
                .query_map([TreeStatus::Viable.as_str()], row_to_tree)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(trees)
        })
    }
}

fn row_to_tree(row: &Row) -> rusqlite::Result<Tree> {
    let status_str: String = row.get("status")?;
    let last_update_str: Option<String> = row.get("last_balance_update")?;

    let status = TreeStatus::from_str(&status_str).unwrap_or_else(|| {
        warn!(status = %status_str, "Unknown tree status in database, treating as Dormant");
        TreeStatus::Dormant
    });

    Ok(Tree {
        id: row.get("id")?,
        status,
        trunk_diameter_cm: row.get("trunk_diameter_cm")?,
        kc: row.get("kc")?,
        soil_balance: row.get("soil_balance")?,
        start_of_day_balance: row.get("start_of_day_balance")?,
        last_balance_update: last_update_str.as_deref().map(parse_timestamp),
        calculated_reg_area: row.get("calculated_reg_area")?,
    })
}

// Irrigation queries

impl Database {
    pub fn insert_irrigation_event(&self, event: &IrrigationEvent) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO irrigation_events (tree_id, date, liters) VALUES (?1, ?2, ?3)",
                params![event.tree_id, event.date.to_rfc3339(), event.liters],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Total liters applied per tree within `[day_start, day_end)`.
    /// Trees without events simply have no entry.
    pub fn liters_by_tree(
        &self,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<HashMap<String, f64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT tree_id, SUM(liters) AS total
                FROM irrigation_events
                WHERE date >= ?1 AND date < ?2
                GROUP BY tree_id
                "#,
            )?;
            let totals = stmt
                .query_map(
                    params![day_start.to_rfc3339(), day_end.to_rfc3339()],
                    |row| Ok((row.get::<_, String>("tree_id")?, row.get::<_, f64>("total")?)),
                )?
                .filter_map(|r| r.ok())
                .collect();
            Ok(totals)
        })
    }
}

/// Lenient RFC 3339 parse; a malformed stored timestamp degrades to "now"
/// rather than failing the whole query.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!(timestamp = %s, "Malformed timestamp in database");
            Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn day_start(d: u32) -> DateTime<Utc> {
        day(d).and_time(NaiveTime::MIN).and_utc()
    }

    fn reading(max_temp: f64, rain: f64) -> StationReading {
        StationReading {
            max_temp,
            rain,
            ..StationReading::default()
        }
    }

    #[test]
    fn merge_preserves_derived_fields() {
        let db = Database::open_in_memory().unwrap();
        db.merge_climate_fact("farm", day(1), &reading(25.0, 5.0), 4.0)
            .unwrap();

        // Recalculator writes the derived fields
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE climate_facts SET soil_balance = 12.5, pef = 3.75 WHERE farm_id = 'farm'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        // A re-fetch for the same date must not clobber them
        db.merge_climate_fact("farm", day(1), &reading(26.0, 6.0), 4.2)
            .unwrap();

        let facts = db.climate_facts_since("farm", day(1)).unwrap();
        assert_eq!(facts.len(), 1);
        assert!((facts[0].max_temp - 26.0).abs() < f64::EPSILON);
        assert!((facts[0].soil_balance - 12.5).abs() < f64::EPSILON);
        assert!((facts[0].pef - 3.75).abs() < f64::EPSILON);
    }

    #[test]
    fn facts_come_back_in_ascending_date_order() {
        let db = Database::open_in_memory().unwrap();
        for d in [14, 3, 9] {
            db.merge_climate_fact("farm", day(d), &reading(20.0, 0.0), 3.0)
                .unwrap();
        }

        let facts = db.climate_facts_since("farm", day(1)).unwrap();
        let dates: Vec<NaiveDate> = facts.iter().map(|f| f.date).collect();
        assert_eq!(dates, vec![day(3), day(9), day(14)]);

        // Period filter excludes earlier facts
        let facts = db.climate_facts_since("farm", day(9)).unwrap();
        assert_eq!(facts.len(), 2);
    }

    #[test]
    fn quota_increments_within_a_day() {
        let db = Database::open_in_memory().unwrap();
        for _ in 0..4 {
            db.increment_quota("farm", day(1), Utc::now()).unwrap();
        }
        let quota = db.quota("farm").unwrap().unwrap();
        assert_eq!(quota.count, 4);
        assert_eq!(quota.date, day(1));
        assert!(!quota.allows_live_call(day(1), 4));
    }

    #[test]
    fn quota_resets_on_date_rollover() {
        let db = Database::open_in_memory().unwrap();
        for _ in 0..4 {
            db.increment_quota("farm", day(1), Utc::now()).unwrap();
        }
        db.increment_quota("farm", day(2), Utc::now()).unwrap();

        let quota = db.quota("farm").unwrap().unwrap();
        assert_eq!(quota.count, 1);
        assert_eq!(quota.date, day(2));
        assert!(quota.allows_live_call(day(2), 4));
    }

    #[test]
    fn missing_quota_row_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.quota("farm").unwrap().is_none());
    }

    #[test]
    fn liters_aggregate_within_day_window() {
        let db = Database::open_in_memory().unwrap();
        db.insert_tree("t1", Some(10.0), None).unwrap();
        db.insert_tree("t2", Some(20.0), None).unwrap();

        let morning = day_start(10) + chrono::Duration::hours(8);
        let evening = day_start(10) + chrono::Duration::hours(20);
        let next_day = day_start(11) + chrono::Duration::hours(1);

        for (tree_id, date, liters) in [
            ("t1", morning, 15.0),
            ("t1", evening, 10.0),
            ("t2", morning, 40.0),
            ("t1", next_day, 99.0), // outside the window
        ] {
            db.insert_irrigation_event(&IrrigationEvent {
                id: None,
                tree_id: tree_id.into(),
                date,
                liters,
            })
            .unwrap();
        }

        let totals = db.liters_by_tree(day_start(10), day_start(11)).unwrap();
        assert!((totals["t1"] - 25.0).abs() < f64::EPSILON);
        assert!((totals["t2"] - 40.0).abs() < f64::EPSILON);
        assert!(!totals.contains_key("t3"));
    }

    #[test]
    fn viable_trees_excludes_other_statuses() {
        let db = Database::open_in_memory().unwrap();
        db.insert_tree("alive", Some(8.0), None).unwrap();
        db.insert_tree("gone", None, None).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE trees SET status = 'Removed' WHERE id = 'gone'", [])?;
            Ok(())
        })
        .unwrap();

        let trees = db.viable_trees().unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].id, "alive");
        assert_eq!(trees[0].status, TreeStatus::Viable);
        assert!(trees[0].last_balance_update.is_none());
    }
}
