use crate::cli::GlobalArgs;
use crate::highlight::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8080/hoot-services";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Directory holding the journal and log files unless overridden.
const STATE_DIR: &str = ".conflate-review";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {name} url: {value}")]
    InvalidUrl { name: &'static str, value: String },
    #[error("min zoom {min} is greater than max zoom {max}")]
    ZoomRange { min: f64, max: f64 },
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Runtime settings for the review client.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewConfig {
    pub service_url: String,
    pub osm_api_url: String,
    pub timeout: Duration,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub journal_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            osm_api_url: default_osm_url(DEFAULT_SERVICE_URL),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            journal_path: PathBuf::from(STATE_DIR).join("journal.db"),
            log_dir: PathBuf::from(STATE_DIR).join("logs"),
        }
    }
}

impl ReviewConfig {
    /// Build a validated config from command-line flags (which already carry
    /// their environment variable fallbacks).
    pub fn from_args(args: &GlobalArgs) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let osm_api_url = args
            .osm_url
            .clone()
            .unwrap_or_else(|| default_osm_url(&args.service_url));
        let config = Self {
            service_url: args.service_url.clone(),
            osm_api_url,
            timeout: Duration::from_secs(args.timeout),
            min_zoom: args.min_zoom,
            max_zoom: args.max_zoom,
            journal_path: args.journal.clone().unwrap_or(defaults.journal_path),
            log_dir: args.log_dir.clone().unwrap_or(defaults.log_dir),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("service", &self.service_url)?;
        check_url("osm api", &self.osm_api_url)?;
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::ZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// The OSM API is served under the review service unless configured apart.
fn default_osm_url(service_url: &str) -> String {
    format!("{}/osm", service_url.trim_end_matches('/'))
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GlobalArgs {
        GlobalArgs {
            service_url: "http://review.example:8080/hoot-services/".into(),
            osm_url: None,
            timeout: 10,
            min_zoom: 16.0,
            max_zoom: 21.0,
            journal: None,
            log_dir: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ReviewConfig::default().validate(), Ok(()));
    }

    #[test]
    fn osm_url_defaults_under_service() {
        let config = ReviewConfig::from_args(&args()).unwrap();
        assert_eq!(
            config.osm_api_url,
            "http://review.example:8080/hoot-services/osm"
        );
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.journal_path.ends_with("journal.db"));
    }

    #[test]
    fn explicit_osm_url_wins() {
        let mut a = args();
        a.osm_url = Some("https://osm.example/".into());
        let config = ReviewConfig::from_args(&a).unwrap();
        assert_eq!(config.osm_api_url, "https://osm.example/");
    }

    #[test]
    fn rejects_bad_url() {
        let mut a = args();
        a.service_url = "not a url".into();
        assert!(matches!(
            ReviewConfig::from_args(&a),
            Err(ConfigError::InvalidUrl { name: "service", .. })
        ));

        let mut a = args();
        a.service_url = "ftp://review.example".into();
        assert!(ReviewConfig::from_args(&a).is_err());
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let mut a = args();
        a.min_zoom = 20.0;
        a.max_zoom = 18.0;
        assert_eq!(
            ReviewConfig::from_args(&a),
            Err(ConfigError::ZoomRange {
                min: 20.0,
                max: 18.0
            })
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut a = args();
        a.timeout = 0;
        assert_eq!(ReviewConfig::from_args(&a), Err(ConfigError::ZeroTimeout));
    }
}
