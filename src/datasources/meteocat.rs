use crate::config::MeteocatConfig;
use crate::error::{GroveOpsError, Result};
use crate::models::StationReading;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

// XEMA variable codes for the measurements the balance uses. Radiation and
// wind are reported under other codes but are not consumed yet.
const VAR_MAX_TEMP: u32 = 40;
const VAR_MIN_TEMP: u32 = 42;
const VAR_RAIN: u32 = 35;
const VAR_HUMIDITY: u32 = 33;

pub struct MeteocatClient {
    client: reqwest::Client,
    config: MeteocatConfig,
}

// Meteocat XEMA API response structures
#[derive(Debug, Deserialize)]
struct StationDay {
    #[serde(default)]
    variables: Vec<MeasuredVariable>,
}

#[derive(Debug, Deserialize)]
struct MeasuredVariable {
    codi: u32,
    #[serde(default)]
    valor: Option<f64>,
}

impl MeteocatClient {
    pub fn new(config: MeteocatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fetch one day of measured station data and parse it into a reading.
    pub async fn fetch_day(&self, date: NaiveDate) -> Result<StationReading> {
        let url = self.measured_url(date);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GroveOpsError::DataSourceUnavailable(format!("Meteocat: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GroveOpsError::DataSourceUnavailable(format!(
                "Meteocat returned {}: {}",
                status, body
            )));
        }

        let days: Vec<StationDay> = response.json().await.map_err(|e| {
            GroveOpsError::DataSourceUnavailable(format!(
                "Failed to parse Meteocat response: {}",
                e
            ))
        })?;

        // One station requested, so only the first result matters
        let station = days.first().ok_or_else(|| {
            GroveOpsError::DataSourceUnavailable(format!(
                "Meteocat returned no station data for {}",
                date
            ))
        })?;

        if station.variables.is_empty() {
            return Err(GroveOpsError::DataSourceUnavailable(format!(
                "Meteocat returned no variables for {}",
                date
            )));
        }

        Ok(parse_variables(&station.variables))
    }

    /// Test connection to the Meteocat API using yesterday's measured-data URL
    pub async fn test_connection(&self) -> Result<bool> {
        let yesterday = chrono::Local::now().date_naive() - chrono::Duration::days(1);
        let url = self.measured_url(yesterday);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GroveOpsError::DataSourceUnavailable(format!("Meteocat: {}", e)))?;

        Ok(response.status().is_success())
    }

    fn measured_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/estacions/mesurades/{}/{:04}/{:02}/{:02}",
            self.config.base_url,
            self.config.station_code,
            date.year(),
            date.month(),
            date.day()
        )
    }
}

/// Map coded variables onto named fields, ignoring codes the balance does
/// not use and skipping null values. Negative rainfall is clamped to zero.
fn parse_variables(vars: &[MeasuredVariable]) -> StationReading {
    let mut reading = StationReading::default();

    for var in vars {
        let Some(value) = var.valor else { continue };

        match var.codi {
            VAR_MAX_TEMP => reading.max_temp = value,
            VAR_MIN_TEMP => reading.min_temp = value,
            VAR_RAIN => reading.rain = value,
            VAR_HUMIDITY => reading.humidity = value,
            _ => {}
        }
    }

    if reading.rain < 0.0 {
        reading.rain = 0.0;
    }

    reading
}
