use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_API_BASE_PATH: &str = "/api";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub cron: CronConfig,
    pub budget: BudgetConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub additional_base_paths: Vec<String>,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Lifetime of a login session, in hours.
    pub ttl_hours: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CronConfig {
    /// Shared secret expected in the `x-cron-token` header. Empty disables the endpoint.
    pub auth_token: String,
}

/// Which expenses count towards a weekly period's limit.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeeklySpendMode {
    /// Expenses whose `weekly_period_id` references the period.
    #[default]
    Linked,
    /// Expenses dated within the period's start and end dates.
    DateRange,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BudgetConfig {
    /// IANA timezone used to decide what "today" is.
    pub timezone: String,
    /// Total assigned to allowance periods created by the cron job or on demand.
    pub default_allowance_total: i64,
    pub weekly_spend_mode: WeeklySpendMode,
    /// `timezone` parsed on first use.
    #[serde(skip)]
    zone: OnceLock<Tz>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/saldo".to_string(),
            max_connections: 16,
            min_connections: 4,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            additional_base_paths: Vec::new(),
            enable_swagger: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 * 7 }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Jakarta".to_string(),
            default_allowance_total: 1_550_000,
            weekly_spend_mode: WeeklySpendMode::Linked,
            zone: OnceLock::new(),
        }
    }
}

impl BudgetConfig {
    pub fn tz(&self) -> Tz {
        *self.zone.get_or_init(|| match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(timezone = %self.timezone, "unknown budget timezone, falling back to UTC");
                Tz::UTC
            }
        })
    }

    /// Today's calendar date in the budget timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz()).date_naive()
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Built-in defaults
    /// 2. Saldo.toml (if present)
    /// 3. Environment variables prefixed with SALDO_, sections split on `__` (e.g. SALDO_DATABASE__URL)
    /// 4. DATABASE_URL, for compatibility with hosting platforms
    pub fn load() -> Result<Self, figment::Error> {
        let config: Config = Self::figment().extract()?;
        // Resolve the zone at startup so a bad name is reported once, before serving.
        config.budget.tz();
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("Saldo.toml"))
            .merge(Env::prefixed("SALDO_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_figment() {
        let config: Config = Figment::new().merge(Serialized::defaults(Config::default())).extract().expect("valid defaults");
        assert_eq!(config.budget.default_allowance_total, 1_550_000);
        assert_eq!(config.budget.weekly_spend_mode, WeeklySpendMode::Linked);
        assert_eq!(config.api.base_path, DEFAULT_API_BASE_PATH);
    }

    #[test]
    fn weekly_spend_mode_reads_snake_case() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string("[budget]\nweekly_spend_mode = \"date_range\"\ntimezone = \"UTC\""))
            .extract()
            .expect("valid config");
        assert_eq!(config.budget.weekly_spend_mode, WeeklySpendMode::DateRange);
        assert_eq!(config.budget.tz(), Tz::UTC);
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let budget = BudgetConfig {
            timezone: "Mars/Olympus".to_string(),
            ..BudgetConfig::default()
        };
        assert_eq!(budget.tz(), Tz::UTC);
    }

    #[test]
    fn timezone_is_parsed_once_and_kept_by_clones() {
        let budget = BudgetConfig {
            timezone: "Mars/Olympus".to_string(),
            ..BudgetConfig::default()
        };
        assert!(budget.zone.get().is_none());

        budget.tz();
        assert_eq!(budget.zone.get(), Some(&Tz::UTC));

        let cloned = budget.clone();
        assert_eq!(cloned.zone.get(), Some(&Tz::UTC));
    }
}
