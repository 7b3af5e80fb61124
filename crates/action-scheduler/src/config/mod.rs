use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub queues: QueueConfig,
    pub schedule: ScheduleConfig,
    pub case_api: CaseApiConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let queues = QueueConfig {
            inbound_queue: env::var("QUEUE_INBOUND").unwrap_or_else(|_| "Action.Case".to_string()),
            fulfilment_queue: env::var("QUEUE_FULFILMENT")
                .unwrap_or_else(|_| "Action.Fulfilment".to_string()),
            consumers: positive_var("QUEUE_CONSUMERS", 4)?,
            prefetch: positive_var("QUEUE_PREFETCH", 500)?,
            max_redeliveries: numeric_var("QUEUE_MAX_REDELIVERIES", 5)?,
            redelivery_delay: Duration::from_millis(u64::from(numeric_var(
                "QUEUE_REDELIVERY_DELAY_MS",
                500,
            )?)),
            dead_letter_limit: positive_var("QUEUE_DEAD_LETTER_LIMIT", 1000)?,
            outbound_exchange: env::var("OUTBOUND_EXCHANGE")
                .unwrap_or_else(|_| "action-outbound-exchange".to_string()),
        };

        let expression = env::var("SCHEDULE_EXPRESSION").unwrap_or_else(|_| "30s".to_string());
        let interval = parse_schedule(&expression)?;

        let case_api = CaseApiConfig {
            base_url: env::var("CASE_API_URL")
                .unwrap_or_else(|_| "http://localhost:8161".to_string()),
            timeout: Duration::from_secs(positive_var("CASE_API_TIMEOUT_SECS", 10)? as u64),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            queues,
            schedule: ScheduleConfig {
                expression,
                interval,
            },
            case_api,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Inbound queue and outbound exchange wiring.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub inbound_queue: String,
    pub fulfilment_queue: String,
    /// Concurrent consumers attached to each inbound queue.
    pub consumers: usize,
    /// Upper bound on ready deliveries held by an inbound queue.
    pub prefetch: usize,
    pub max_redeliveries: u32,
    /// Wait before the first redelivery. Doubles on each further attempt.
    pub redelivery_delay: Duration,
    /// Dead letters retained per queue; the oldest are dropped beyond this.
    pub dead_letter_limit: usize,
    pub outbound_exchange: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbound_queue: "Action.Case".to_string(),
            fulfilment_queue: "Action.Fulfilment".to_string(),
            consumers: 4,
            prefetch: 500,
            max_redeliveries: 5,
            redelivery_delay: Duration::from_millis(500),
            dead_letter_limit: 1000,
            outbound_exchange: "action-outbound-exchange".to_string(),
        }
    }
}

/// Cadence of the fulfilment batch trigger.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub expression: String,
    pub interval: Duration,
}

/// Connection settings for the case service that issues UAC/QID pairs.
#[derive(Debug, Clone)]
pub struct CaseApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Parses `<n>s`, `<n>m`, `<n>h`, or a bare number of seconds.
pub fn parse_schedule(expression: &str) -> Result<Duration, ConfigError> {
    let trimmed = expression.trim();
    let invalid = || ConfigError::InvalidSchedule {
        value: expression.to_string(),
    };

    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((idx, 's')) => (&trimmed[..idx], 1),
        Some((idx, 'm')) => (&trimmed[..idx], 60),
        Some((idx, 'h')) => (&trimmed[..idx], 3600),
        Some(_) => (trimmed, 1),
        None => return Err(invalid()),
    };

    let amount = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

fn numeric_var(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(default),
    }
}

fn positive_var(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().parse::<usize>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(ConfigError::InvalidNumber { key, value }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    InvalidSchedule { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer, got '{value}'")
            }
            ConfigError::InvalidSchedule { value } => write!(
                f,
                "SCHEDULE_EXPRESSION '{value}' must look like 30s, 5m, 1h, or a number of seconds"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidSchedule { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "QUEUE_INBOUND",
            "QUEUE_FULFILMENT",
            "QUEUE_CONSUMERS",
            "QUEUE_PREFETCH",
            "QUEUE_MAX_REDELIVERIES",
            "QUEUE_REDELIVERY_DELAY_MS",
            "QUEUE_DEAD_LETTER_LIMIT",
            "OUTBOUND_EXCHANGE",
            "SCHEDULE_EXPRESSION",
            "CASE_API_URL",
            "CASE_API_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.queues.inbound_queue, "Action.Case");
        assert_eq!(config.queues.consumers, 4);
        assert_eq!(config.queues.outbound_exchange, "action-outbound-exchange");
        assert_eq!(config.queues.redelivery_delay, Duration::from_millis(500));
        assert_eq!(config.queues.dead_letter_limit, 1000);
        assert_eq!(config.schedule.interval, Duration::from_secs(30));
        assert_eq!(config.case_api.timeout, Duration::from_secs(10));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn rejects_zero_consumers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("QUEUE_CONSUMERS", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { key, .. }) => assert_eq!(key, "QUEUE_CONSUMERS"),
            other => panic!("expected invalid consumer count, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn schedule_expressions_parse_units() {
        assert_eq!(parse_schedule("45s").expect("seconds"), Duration::from_secs(45));
        assert_eq!(parse_schedule("5m").expect("minutes"), Duration::from_secs(300));
        assert_eq!(parse_schedule("1h").expect("hours"), Duration::from_secs(3600));
        assert_eq!(parse_schedule(" 12 ").expect("bare"), Duration::from_secs(12));
        assert!(parse_schedule("0s").is_err());
        assert!(parse_schedule("every minute").is_err());
        assert!(parse_schedule("").is_err());
    }

    #[test]
    fn oversized_schedule_is_rejected_instead_of_overflowing() {
        match parse_schedule("18446744073709551615h") {
            Err(ConfigError::InvalidSchedule { value }) => {
                assert_eq!(value, "18446744073709551615h")
            }
            other => panic!("expected invalid schedule, got {other:?}"),
        }
        assert!(parse_schedule("307445734561825861m").is_err());
        assert_eq!(
            parse_schedule("18446744073709551615").expect("largest bare value"),
            Duration::from_secs(u64::MAX)
        );
    }
}
