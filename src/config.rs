use crate::error::{GroveOpsError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub farm: FarmConfig,
    pub meteocat: MeteocatConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FarmConfig {
    /// Identifier written onto every climate fact and quota row.
    pub id: String,
    /// Latitude the ET0 radiation constant is tuned for. Not fed into the
    /// formula directly; change the constant if you move the grove.
    pub latitude: f64,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct MeteocatConfig {
    pub api_key: String,
    /// XEMA station code (e.g. "YD" for Les Borges Blanques)
    pub station_code: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Live calls allowed per calendar day; audit runs are exempt.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
}

fn default_base_url() -> String {
    "https://api.meteo.cat/xema/v1".to_string()
}

fn default_daily_quota() -> u32 {
    4
}

impl std::fmt::Debug for MeteocatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteocatConfig")
            .field("api_key", &"[REDACTED]")
            .field("station_code", &self.station_code)
            .field("base_url", &self.base_url)
            .field("daily_quota", &self.daily_quota)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalanceConfig {
    /// Field-capacity ceiling for both the global and per-tree balances (mm).
    #[serde(default = "default_field_capacity")]
    pub field_capacity_mm: f64,
    /// Kc used for the global reference balance curve.
    #[serde(default = "default_kc")]
    pub reference_kc: f64,
    /// Fallback Kc for trees without an explicit coefficient.
    #[serde(default = "default_kc")]
    pub default_tree_kc: f64,
    /// Rainfall below this threshold is assumed to evaporate before infiltrating.
    #[serde(default = "default_pef_threshold")]
    pub pef_threshold_mm: f64,
    /// Fraction of above-threshold rainfall counted as effective.
    #[serde(default = "default_pef_fraction")]
    pub pef_fraction: f64,
}

fn default_field_capacity() -> f64 {
    35.0
}

fn default_kc() -> f64 {
    0.6
}

fn default_pef_threshold() -> f64 {
    4.0
}

fn default_pef_fraction() -> f64 {
    0.75
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            field_capacity_mm: default_field_capacity(),
            reference_kc: default_kc(),
            default_tree_kc: default_kc(),
            pef_threshold_mm: default_pef_threshold(),
            pef_fraction: default_pef_fraction(),
        }
    }
}

const EXAMPLE_CONFIG: &str = r#"# GroveOps Configuration
# Environment variable substitution (${VAR}) is supported.

farm:
  id: mol-cal-jeroni
  latitude: 41.5117

meteocat:
  api_key: ${METEOCAT_API_KEY}
  station_code: YD
  daily_quota: 4

balance:
  field_capacity_mm: 35.0
  reference_kc: 0.6
  default_tree_kc: 0.6
  pef_threshold_mm: 4.0
  pef_fraction: 0.75
"#;

impl Config {
    pub fn load(config_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => p,
            None => Self::find_config_path()?,
        };

        if !config_path.exists() {
            return Err(GroveOpsError::Config(format!(
                "Config file not found at {:?}. Run `groveops init` to create one.",
                config_path
            )));
        }

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| GroveOpsError::Config(format!("Failed to read config: {}", e)))?;

        // Substitute environment variables
        let config_str = Self::substitute_env_vars(&config_str);

        let config: Config = serde_yaml::from_str(&config_str)
            .map_err(|e| GroveOpsError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Search for config.yaml in standard locations.
    /// Returns the path of the first found config, or the XDG default path if none found.
    fn find_config_path() -> Result<PathBuf> {
        // Try current directory first
        let local_config = PathBuf::from("config/config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        // Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("groveops").join("config.yaml");
            if xdg_config.exists() {
                return Ok(xdg_config);
            }
        }

        // Return XDG path as the default (will trigger "not found" in load)
        let default_path = dirs::config_dir()
            .ok_or_else(|| GroveOpsError::Config("Cannot determine config directory".into()))?
            .join("groveops")
            .join("config.yaml");
        Ok(default_path)
    }

    /// Default path for writing new config files (~/.config/groveops/config.yaml).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| GroveOpsError::Config("Cannot determine config directory".into()))?
            .join("groveops");
        Ok(config_dir.join("config.yaml"))
    }

    /// Write the example config template, refusing to clobber an existing file.
    /// Returns the path it was written to.
    pub fn write_example(path_override: Option<&PathBuf>) -> Result<PathBuf> {
        let path = match path_override {
            Some(p) => p.clone(),
            None => Self::default_config_path()?,
        };

        if path.exists() {
            return Err(GroveOpsError::Config(format!(
                "Config already exists at {:?}",
                path
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, EXAMPLE_CONFIG)?;

        Ok(path)
    }

    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        // Find all ${VAR_NAME} patterns and substitute
        let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        result
    }

    pub fn data_dir(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        // CLI override takes priority
        if let Some(dir) = data_dir_override {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }

        // Then check env var
        if let Ok(dir) = std::env::var("GROVEOPS_DATA_DIR") {
            let p = PathBuf::from(dir);
            std::fs::create_dir_all(&p)?;
            return Ok(p);
        }

        // Use XDG data directory
        let data_dir = dirs::data_dir()
            .ok_or_else(|| GroveOpsError::Config("Cannot determine data directory".into()))?
            .join("groveops");

        std::fs::create_dir_all(&data_dir)?;
        Ok(data_dir)
    }

    pub fn db_path(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        Ok(Self::data_dir(data_dir_override)?.join("groveops.db"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            farm: FarmConfig {
                id: "mol-cal-jeroni".into(),
                latitude: 41.5117,
            },
            meteocat: MeteocatConfig {
                api_key: "".into(),
                station_code: "YD".into(),
                base_url: default_base_url(),
                daily_quota: default_daily_quota(),
            },
            balance: BalanceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_parses() {
        let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.farm.id, "mol-cal-jeroni");
        assert_eq!(config.meteocat.station_code, "YD");
        assert_eq!(config.meteocat.daily_quota, 4);
        assert!((config.balance.field_capacity_mm - 35.0).abs() < f64::EPSILON);
    }

    #[test]
    fn balance_defaults_fill_missing_fields() {
        let yaml = r#"
farm:
  id: test-farm
  latitude: 41.5
meteocat:
  api_key: key
  station_code: YD
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!((config.balance.pef_threshold_mm - 4.0).abs() < f64::EPSILON);
        assert!((config.balance.pef_fraction - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.meteocat.base_url, "https://api.meteo.cat/xema/v1");
    }

    #[test]
    fn env_var_substitution() {
        std::env::set_var("GROVEOPS_TEST_KEY", "secret");
        let substituted = Config::substitute_env_vars("api_key: ${GROVEOPS_TEST_KEY}");
        assert_eq!(substituted, "api_key: secret");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = MeteocatConfig {
            api_key: "very-secret".into(),
            station_code: "YD".into(),
            base_url: default_base_url(),
            daily_quota: 4,
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
