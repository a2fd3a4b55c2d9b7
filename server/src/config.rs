//! Configuration for the relay binaries.
//!
//! Loads configuration from environment variables with typed defaults. Unset
//! variables take their default; set but unparsable variables are an error.

use helpdesk_relay_runtime::RetryPolicy;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default relay channel for live notifications.
pub const DEFAULT_RELAY_CHANNEL: &str = "notifications";

/// Redis URL used by the gateway when `REDIS_URL` is unset.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
}

/// A secret value. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// The secret itself.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Durable queue configuration
    pub broker: BrokerConfig,
    /// Pub/sub relay configuration
    pub relay: RelayConfig,
    /// Mail transport configuration
    pub smtp: SmtpSettings,
    /// Users service and service identity
    pub services: ServicesConfig,
    /// Identity gate secrets
    pub identity: IdentitySettings,
    /// HTTP listener and process lifecycle
    pub server: ServerConfig,
}

/// Durable queue (Kafka-compatible broker) configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Consumer group of the notification service
    pub consumer_group: String,
    /// Queue carrying ticket events
    pub ticket_queue: String,
    /// Queue carrying chat events
    pub chat_queue: String,
    /// Suffix of dead-letter queues
    pub dead_letter_suffix: String,
    /// How long startup waits for the broker
    pub ready_timeout: Duration,
    /// Delay before the first reconnection attempt
    pub retry_delay: Duration,
    /// Ceiling of the reconnection delay
    pub retry_max_delay: Duration,
    /// Reconnection attempts before giving up (`None` = indefinitely)
    pub max_retries: Option<usize>,
}

impl BrokerConfig {
    /// Reconnection policy: exponential from `retry_delay` to `retry_max_delay`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let builder = RetryPolicy::builder()
            .initial_delay(self.retry_delay)
            .max_delay(self.retry_max_delay)
            .multiplier(2.0);
        match self.max_retries {
            Some(max) => builder.max_retries(max).build(),
            None => builder.unlimited().build(),
        }
    }
}

/// Pub/sub relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Redis URL. The notification service relays nothing without it.
    pub redis_url: Option<String>,
    /// Channel carrying live notifications
    pub channel: String,
}

/// SMTP settings. Without a host the console transport is used.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Server host
    pub host: Option<String>,
    /// Server port
    pub port: u16,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<Secret>,
    /// Sender mailbox
    pub from: String,
    /// Upper bound for one send
    pub timeout: Duration,
    /// Whether a failed startup verification stops the service
    pub required: bool,
}

/// Users service and this service's identity towards it.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Base URL of the users service
    pub users_service_url: Option<String>,
    /// Name announced in `X-Service-Name`
    pub service_name: String,
}

/// Identity gate secrets.
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    /// Shared inter-service secret
    pub service_token: Option<Secret>,
    /// HS256 key of session tokens
    pub jwt_secret: Option<Secret>,
    /// Tolerated clock skew
    pub leeway: Duration,
}

/// HTTP listener and lifecycle.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Refuse unauthenticated WebSocket handshakes (else admit without a room)
    pub ws_reject_unauthenticated: bool,
    /// Prometheus listener, if any
    pub metrics_addr: Option<SocketAddr>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a variable that is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a variable that is set but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        Ok(Self {
            broker: BrokerConfig {
                brokers: vars.string("KAFKA_BROKERS", "localhost:9092"),
                consumer_group: vars.string("KAFKA_CONSUMER_GROUP", "notificaciones-svc"),
                ticket_queue: vars.string("TICKET_QUEUE", "ticket-events"),
                chat_queue: vars.string("CHAT_QUEUE", "chat-events"),
                dead_letter_suffix: vars.string("DEAD_LETTER_SUFFIX", ".dlq"),
                ready_timeout: Duration::from_secs(vars.parse("BROKER_READY_TIMEOUT_SECS", 30)?),
                retry_delay: Duration::from_millis(vars.parse("BROKER_RETRY_DELAY_MS", 2000)?),
                retry_max_delay: Duration::from_millis(vars.parse("BROKER_RETRY_MAX_DELAY_MS", 30_000)?),
                max_retries: vars.parse_optional("BROKER_MAX_RETRIES")?,
            },
            relay: RelayConfig {
                redis_url: vars.optional("REDIS_URL"),
                channel: vars.string("RELAY_CHANNEL", DEFAULT_RELAY_CHANNEL),
            },
            smtp: SmtpSettings {
                host: vars.optional("SMTP_HOST"),
                port: vars.parse("SMTP_PORT", 587)?,
                username: vars.optional("SMTP_USER"),
                password: vars.optional("SMTP_PASS").map(Secret),
                from: vars.string("SMTP_FROM", "Helpdesk <noreply@helpdesk.local>"),
                timeout: Duration::from_secs(vars.parse("SMTP_TIMEOUT_SECS", 10)?),
                required: vars.flag("SMTP_REQUIRED", false)?,
            },
            services: ServicesConfig {
                users_service_url: vars.optional("USERS_SERVICE_URL"),
                service_name: vars.string("SERVICE_NAME", "notificaciones-svc"),
            },
            identity: IdentitySettings {
                service_token: vars.optional("SERVICE_TOKEN").map(Secret),
                jwt_secret: vars.optional("JWT_SECRET").map(Secret),
                leeway: Duration::from_secs(vars.parse("JWT_LEEWAY_SECS", 0)?),
            },
            server: ServerConfig {
                host: vars.string("HTTP_HOST", "0.0.0.0"),
                port: vars.parse("HTTP_PORT", 3000)?,
                ws_reject_unauthenticated: vars.flag("WS_REJECT_UNAUTHENTICATED", true)?,
                metrics_addr: vars.parse_optional("METRICS_ADDR")?,
                shutdown_timeout: Duration::from_secs(vars.parse("SHUTDOWN_TIMEOUT_SECS", 10)?),
            },
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    fn parse_optional<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::Invalid { key, value })
            })
            .transpose()
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
        }
    }
}
