use serde::Deserialize;
use std::net::SocketAddr;

const BODY_WEIGHT_RANGE_KG: std::ops::RangeInclusive<f64> = 1.0..=999.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("body weight {0} kg is outside 1..=999")]
    BodyWeightOutOfRange(f64),
    #[error("sample period must be positive, got {0} ms")]
    InvalidSamplePeriod(u64),
    #[error("window duration must be positive, got {0} ms")]
    InvalidWindowDuration(u64),
    #[error("store kind is influx but no [store.influx] section was given")]
    MissingInfluxSettings,
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisSettings,
    pub transport: TransportConfig,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;
        if self.store.kind == StoreKind::Influx && self.store.influx.is_none() {
            return Err(ConfigError::MissingInfluxSettings);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    pub sample_period_ms: u64,
    pub window_duration_ms: u64,
    pub body_weight_kg: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            sample_period_ms: 50,
            window_duration_ms: 1000,
            body_weight_kg: 68.0,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_ms == 0 {
            return Err(ConfigError::InvalidSamplePeriod(self.sample_period_ms));
        }
        if self.window_duration_ms == 0 {
            return Err(ConfigError::InvalidWindowDuration(self.window_duration_ms));
        }
        validate_body_weight(self.body_weight_kg)
    }

    /// Update the body weight; an out-of-range value leaves the old one in place.
    pub fn set_body_weight(&mut self, kg: f64) -> Result<(), ConfigError> {
        validate_body_weight(kg)?;
        self.body_weight_kg = kg;
        Ok(())
    }

    pub fn sample_period_secs(&self) -> f32 {
        self.sample_period_ms as f32 / 1000.0
    }
}

pub fn validate_body_weight(kg: f64) -> Result<(), ConfigError> {
    if BODY_WEIGHT_RANGE_KG.contains(&kg) {
        Ok(())
    } else {
        Err(ConfigError::BodyWeightOutOfRange(kg))
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Serial,
    Tcp,
    File,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Serial device or replay file
    pub path: String,
    pub baud_rate: u32,
    /// Serial-over-TCP bridge address
    pub address: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Serial,
            path: "/dev/rfcomm0".to_string(),
            baud_rate: 9600,
            address: "127.0.0.1:4000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Influx,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub influx: Option<InfluxSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
}

fn default_measurement() -> String {
    "activity_report".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load `config/retroband.*` (optional) overlaid with `RETROBAND__SECTION__KEY`
/// environment variables.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/retroband").required(false))
        .add_source(
            config::Environment::with_prefix("RETROBAND")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<AppConfig, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    #[test]
    fn test_defaults_are_valid() {
        let app_config = parse("").unwrap();
        assert_eq!(app_config.analysis, AnalysisSettings::default());
        assert_eq!(app_config.transport.kind, TransportKind::Serial);
        assert_eq!(app_config.store.kind, StoreKind::Memory);
        assert_eq!(app_config.http.bind.port(), 8080);
        assert_eq!(app_config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let app_config = parse(
            r#"
            [analysis]
            body_weight_kg = 80.5

            [transport]
            kind = "tcp"
            address = "10.0.0.2:7000"
            "#,
        )
        .unwrap();

        assert_eq!(app_config.analysis.body_weight_kg, 80.5);
        assert_eq!(app_config.analysis.sample_period_ms, 50);
        assert_eq!(app_config.transport.kind, TransportKind::Tcp);
        assert_eq!(app_config.transport.address, "10.0.0.2:7000");
        assert_eq!(app_config.transport.baud_rate, 9600);
    }

    #[test]
    fn test_influx_section() {
        let app_config = parse(
            r#"
            [store]
            kind = "influx"

            [store.influx]
            host = "http://influx:8086/"
            token = "secret"
            database = "band"
            retention_policy = "autogen"
            "#,
        )
        .unwrap();

        let influx = app_config.store.influx.unwrap();
        assert_eq!(influx.database, "band");
        assert_eq!(influx.measurement, "activity_report");
    }

    #[test]
    fn test_influx_without_settings_is_rejected() {
        let result = parse("[store]\nkind = \"influx\"\n");
        assert!(matches!(result, Err(ConfigError::MissingInfluxSettings)));
    }

    #[test]
    fn test_out_of_range_body_weight_is_rejected() {
        let result = parse("[analysis]\nbody_weight_kg = 1200.0\n");
        assert!(matches!(result, Err(ConfigError::BodyWeightOutOfRange(_))));
    }

    #[test]
    fn test_set_body_weight_keeps_prior_value() {
        let mut settings = AnalysisSettings::default();
        assert!(settings.set_body_weight(0.5).is_err());
        assert!(settings.set_body_weight(f64::NAN).is_err());
        assert_eq!(settings.body_weight_kg, 68.0);

        settings.set_body_weight(999.0).unwrap();
        assert_eq!(settings.body_weight_kg, 999.0);
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        assert!(matches!(
            parse("[analysis]\nsample_period_ms = 0\n"),
            Err(ConfigError::InvalidSamplePeriod(0))
        ));
        assert!(matches!(
            parse("[analysis]\nwindow_duration_ms = 0\n"),
            Err(ConfigError::InvalidWindowDuration(0))
        ));
    }

    #[test]
    fn test_sample_config_file_parses() {
        let app_config = parse(include_str!("../../config/retroband.toml")).unwrap();
        assert_eq!(app_config.store.kind, StoreKind::Memory);
        assert!(app_config.store.influx.is_none());
        assert_eq!(app_config.analysis, AnalysisSettings::default());
    }
}
