//! Startup configuration, read once from the environment and shared
//! immutably through [`crate::state::AppState`].

use std::time::Duration;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Platform-wide calendar defaults. Agents with their own credentials
/// override these.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub event_type_id: Option<i64>,
    pub timeout: Duration,
    pub attendee_timezone: String,
    pub attendee_language: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub log_level: String,
    pub db_max_connections: u32,
    /// Legacy single platform key accepted on webhooks and bookings
    pub platform_tool_key: Option<String>,
    pub webhook_allow_unauthenticated: bool,
    pub cors_origins: Vec<String>,
    pub calendar: CalendarConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let port = parse_or("PORT", get("PORT"), 3000u16)?;
        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 20u32)?;
        let webhook_allow_unauthenticated = parse_bool(
            "WEBHOOK_ALLOW_UNAUTHENTICATED",
            get("WEBHOOK_ALLOW_UNAUTHENTICATED"),
        )?;

        let base_url_raw =
            get("CAL_COM_BASE_URL").unwrap_or_else(|| "https://api.cal.com/v2".to_string());
        let base_url = Url::parse(&base_url_raw).map_err(|err| ConfigError::Invalid {
            name: "CAL_COM_BASE_URL",
            value: base_url_raw.clone(),
            reason: err.to_string(),
        })?;

        let event_type_id = get("CAL_COM_EVENT_TYPE_ID")
            .map(|raw| parse_value("CAL_COM_EVENT_TYPE_ID", &raw))
            .transpose()?;
        let timeout_secs = parse_or("CAL_COM_TIMEOUT_SECS", get("CAL_COM_TIMEOUT_SECS"), 30u64)?;

        let attendee_timezone =
            get("DEFAULT_ATTENDEE_TIMEZONE").unwrap_or_else(|| "Europe/London".to_string());
        if attendee_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_ATTENDEE_TIMEZONE",
                value: attendee_timezone,
                reason: "not an IANA time zone".to_string(),
            });
        }

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url,
            port,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            db_max_connections,
            platform_tool_key: get("VAPI_TOOL_API_KEY"),
            webhook_allow_unauthenticated,
            cors_origins,
            calendar: CalendarConfig {
                base_url,
                api_key: get("CAL_COM_API_KEY"),
                event_type_id,
                timeout: Duration::from_secs(timeout_secs),
                attendee_timezone,
                attendee_language: get("DEFAULT_ATTENDEE_LANGUAGE")
                    .unwrap_or_else(|| "en".to_string()),
            },
        })
    }
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            value: other.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/voxlead")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 20);
        assert!(!config.webhook_allow_unauthenticated);
        assert!(config.platform_tool_key.is_none());
        assert_eq!(config.calendar.base_url.as_str(), "https://api.cal.com/v2");
        assert_eq!(config.calendar.timeout, Duration::from_secs(30));
        assert_eq!(config.calendar.attendee_timezone, "Europe/London");
        assert_eq!(config.calendar.attendee_language, "en");
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn empty_platform_key_counts_as_unset() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/voxlead"),
            ("VAPI_TOOL_API_KEY", "  "),
        ])
        .unwrap();
        assert!(config.platform_tool_key.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = ("DATABASE_URL", "postgres://localhost/voxlead");
        assert!(config_from(&[base, ("PORT", "eighty")]).is_err());
        assert!(config_from(&[base, ("CAL_COM_BASE_URL", "not a url")]).is_err());
        assert!(config_from(&[base, ("DEFAULT_ATTENDEE_TIMEZONE", "Mars/Base")]).is_err());
        assert!(config_from(&[base, ("WEBHOOK_ALLOW_UNAUTHENTICATED", "maybe")]).is_err());
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/voxlead"),
            ("CORS_ORIGINS", "https://app.example.com, https://admin.example.com,"),
            ("CAL_COM_EVENT_TYPE_ID", "1234"),
        ])
        .unwrap();
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.calendar.event_type_id, Some(1234));
    }
}
