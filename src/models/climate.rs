use chrono::{DateTime, NaiveDate, Utc};

/// One day's measured weather plus the derived water-balance fields.
///
/// At most one fact exists per farm + date. Raw fields are owned by the
/// fetcher, `pef` and `soil_balance` by the recalculator; all writes are
/// field-level merges so the two never clobber each other.
#[derive(Debug, Clone)]
pub struct ClimateFact {
    pub farm_id: String,
    pub date: NaiveDate,
    pub max_temp: f64,
    pub min_temp: f64,
    pub rain: f64,
    pub rain_accumulated: f64,
    pub humidity: f64,
    pub radiation: f64,
    pub wind_speed: f64,
    /// Reference evapotranspiration derived at fetch time (mm)
    pub et0: f64,
    /// Effective rainfall derived during recalculation (mm)
    pub pef: f64,
    /// Global running balance as of this date (mm)
    pub soil_balance: f64,
    pub is_mock: bool,
    pub last_updated: DateTime<Utc>,
}

/// Measurements parsed from one day of station variables. Fields missing
/// from the provider response keep these station-typical defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StationReading {
    pub max_temp: f64,
    pub min_temp: f64,
    pub rain: f64,
    pub humidity: f64,
    pub radiation: f64,
    pub wind_speed: f64,
}

impl Default for StationReading {
    fn default() -> Self {
        Self {
            max_temp: 20.0,
            min_temp: 10.0,
            rain: 0.0,
            humidity: 60.0,
            radiation: 15.0,
            wind_speed: 2.0,
        }
    }
}
