//! Client Configuration Settings
//!
//! Configuration types for the stream client, built in code or loaded from
//! environment variables.

use std::path::Path;
use std::time::Duration;

use crate::infrastructure::alpaca::{AuthError, Credentials, Encoding, ReconnectConfig};
use crate::infrastructure::alpaca::connection::DEFAULT_CONNECT_TIMEOUT;
use crate::infrastructure::websocket::HeartbeatConfig;

const DATA_HOST: &str = "stream.data.alpaca.markets";
const SANDBOX_DATA_HOST: &str = "stream.data.sandbox.alpaca.markets";

/// Stock market data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFeed {
    /// SIP (Securities Information Processor) - Full market data.
    #[default]
    Sip,
    /// IEX (Investors Exchange) - Free tier with limited data.
    Iex,
    /// SIP delayed by 15 minutes.
    DelayedSip,
}

impl DataFeed {
    /// Parse feed type from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "iex" => Self::Iex,
            "delayed_sip" => Self::DelayedSip,
            _ => Self::Sip,
        }
    }

    /// Get the feed name for WebSocket URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sip => "sip",
            Self::Iex => "iex",
            Self::DelayedSip => "delayed_sip",
        }
    }
}

/// Crypto market data venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CryptoLocation {
    /// Alpaca US (`us`).
    #[default]
    Us,
    /// Kraken US (`us-1`).
    Us1,
    /// Kraken EU (`eu-1`).
    Eu1,
}

impl CryptoLocation {
    /// Parse location from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "us-1" => Self::Us1,
            "eu-1" => Self::Eu1,
            _ => Self::Us,
        }
    }

    /// Get the location segment for WebSocket URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Us1 => "us-1",
            Self::Eu1 => "eu-1",
        }
    }
}

/// Trading environment (paper vs live).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Paper trading environment (simulated).
    #[default]
    Paper,
    /// Live trading environment (real money).
    Live,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LIVE" => Self::Live,
            _ => Self::Paper,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

/// Complete client configuration. Immutable once a stream is built from it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Paper or live endpoints.
    pub environment: Environment,
    /// Stock data feed.
    pub feed: DataFeed,
    /// Crypto data venue.
    pub crypto_location: CryptoLocation,
    /// Wire encoding for the market data streams.
    pub encoding: Encoding,
    /// Time allowed for open plus handshake.
    pub connect_timeout: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Transport heartbeat.
    pub heartbeat: HeartbeatConfig,
}

impl ClientConfig {
    /// Create a paper-trading configuration with defaults.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            environment: Environment::default(),
            feed: DataFeed::default(),
            crypto_location: CryptoLocation::default(),
            encoding: Encoding::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Set the environment.
    #[must_use]
    pub const fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the stock feed.
    #[must_use]
    pub const fn with_feed(mut self, feed: DataFeed) -> Self {
        self.feed = feed;
        self
    }

    /// Set the crypto venue.
    #[must_use]
    pub const fn with_crypto_location(mut self, location: CryptoLocation) -> Self {
        self.crypto_location = location;
        self
    }

    /// Use `MessagePack` frames on the market data streams.
    #[must_use]
    pub const fn with_msgpack(mut self, enabled: bool) -> Self {
        self.encoding = if enabled {
            Encoding::MsgPack
        } else {
            Encoding::Json
        };
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnection backoff.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the transport heartbeat.
    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from a `.env` style file, ignoring the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// credentials are missing or empty.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let vars = dotenvy::from_path_iter(path.as_ref())?
            .collect::<Result<std::collections::HashMap<String, String>, _>>()?;
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Create configuration from any variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let key = lookup("ALPACA_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("ALPACA_KEY".to_string()))?;
        let secret = lookup("ALPACA_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("ALPACA_SECRET".to_string()))?;
        let credentials = Credentials::new(key, secret)?;

        let env = Env(&lookup);
        let defaults = ReconnectConfig::default();
        let heartbeat = HeartbeatConfig::default();

        Ok(Self {
            credentials,
            environment: lookup("ALPACA_ENV")
                .map(|s| Environment::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            feed: lookup("ALPACA_FEED")
                .map(|s| DataFeed::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            crypto_location: lookup("ALPACA_CRYPTO_LOCATION")
                .map(|s| CryptoLocation::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            encoding: if env.parse("ALPACA_STREAM_MSGPACK", false) {
                Encoding::MsgPack
            } else {
                Encoding::Json
            },
            connect_timeout: env.nonzero_secs(
                "ALPACA_STREAM_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT,
            ),
            reconnect: ReconnectConfig {
                initial_delay: env.millis(
                    "ALPACA_STREAM_RECONNECT_DELAY_INITIAL_MS",
                    defaults.initial_delay,
                ),
                max_delay: env.secs("ALPACA_STREAM_RECONNECT_DELAY_MAX_SECS", defaults.max_delay),
                multiplier: env.factor(
                    "ALPACA_STREAM_RECONNECT_DELAY_MULTIPLIER",
                    defaults.multiplier,
                ),
                jitter_factor: env.factor("ALPACA_STREAM_RECONNECT_JITTER", defaults.jitter_factor),
                max_attempts: env.parse(
                    "ALPACA_STREAM_MAX_RECONNECT_ATTEMPTS",
                    defaults.max_attempts,
                ),
            },
            heartbeat: HeartbeatConfig {
                ping_interval: env.nonzero_secs(
                    "ALPACA_STREAM_HEARTBEAT_INTERVAL_SECS",
                    heartbeat.ping_interval,
                ),
                timeout: env.nonzero_secs(
                    "ALPACA_STREAM_HEARTBEAT_TIMEOUT_SECS",
                    heartbeat.timeout,
                ),
            },
        })
    }

    /// Get the stock data WebSocket URL.
    #[must_use]
    pub fn stock_stream_url(&self) -> String {
        format!("wss://{}/v2/{}", self.data_host(), self.feed.as_str())
    }

    /// Get the crypto data WebSocket URL.
    #[must_use]
    pub fn crypto_stream_url(&self) -> String {
        format!(
            "wss://{}/v1beta3/crypto/{}",
            self.data_host(),
            self.crypto_location.as_str()
        )
    }

    /// Get the trade updates WebSocket URL.
    #[must_use]
    pub fn trade_updates_url(&self) -> String {
        if self.environment.is_live() {
            "wss://api.alpaca.markets/stream".to_string()
        } else {
            "wss://paper-api.alpaca.markets/stream".to_string()
        }
    }

    const fn data_host(&self) -> &'static str {
        if self.environment.is_live() {
            DATA_HOST
        } else {
            SANDBOX_DATA_HOST
        }
    }
}

/// Load a `.env` file from the working directory or its parents, if any.
///
/// Variables already set in the process environment win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Credentials are present but invalid.
    #[error(transparent)]
    Credentials(#[from] AuthError),
    /// `.env` file could not be read.
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Finite and non-negative, otherwise the default.
    fn factor(&self, key: &str, default: f64) -> f64 {
        Some(self.parse(key, default))
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(default)
    }

    fn nonzero_secs(&self, key: &str, default: Duration) -> Duration {
        Some(self.secs(key, default))
            .filter(|d| !d.is_zero())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use test_case::test_case;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn config(environment: Environment) -> ClientConfig {
        ClientConfig::new(Credentials::new("key", "super-secret").unwrap())
            .with_environment(environment)
    }

    #[test_case("sip", DataFeed::Sip)]
    #[test_case("IEX", DataFeed::Iex)]
    #[test_case("delayed_sip", DataFeed::DelayedSip)]
    #[test_case("unknown", DataFeed::Sip)]
    fn data_feed_parsing(input: &str, expected: DataFeed) {
        assert_eq!(DataFeed::from_str_case_insensitive(input), expected);
    }

    #[test_case("live", Environment::Live)]
    #[test_case("LIVE", Environment::Live)]
    #[test_case("paper", Environment::Paper)]
    #[test_case("unknown", Environment::Paper)]
    fn environment_parsing(input: &str, expected: Environment) {
        assert_eq!(Environment::from_str_case_insensitive(input), expected);
    }

    #[test_case("us", CryptoLocation::Us)]
    #[test_case("US-1", CryptoLocation::Us1)]
    #[test_case("eu-1", CryptoLocation::Eu1)]
    fn crypto_location_parsing(input: &str, expected: CryptoLocation) {
        assert_eq!(CryptoLocation::from_str_case_insensitive(input), expected);
    }

    #[test_case(Environment::Live, "wss://stream.data.alpaca.markets/v2/sip" ; "live stock")]
    #[test_case(
        Environment::Paper,
        "wss://stream.data.sandbox.alpaca.markets/v2/sip";
        "paper stock"
    )]
    fn stock_url(environment: Environment, expected: &str) {
        assert_eq!(config(environment).stock_stream_url(), expected);
    }

    #[test_case(
        Environment::Live,
        "wss://stream.data.alpaca.markets/v1beta3/crypto/us";
        "live crypto"
    )]
    #[test_case(
        Environment::Paper,
        "wss://stream.data.sandbox.alpaca.markets/v1beta3/crypto/us";
        "paper crypto"
    )]
    fn crypto_url(environment: Environment, expected: &str) {
        assert_eq!(config(environment).crypto_stream_url(), expected);
    }

    #[test_case(Environment::Live, "wss://api.alpaca.markets/stream" ; "live trading")]
    #[test_case(Environment::Paper, "wss://paper-api.alpaca.markets/stream" ; "paper trading")]
    fn trade_updates_url(environment: Environment, expected: &str) {
        assert_eq!(config(environment).trade_updates_url(), expected);
    }

    #[test]
    fn feed_and_location_select_url_segment() {
        let config = config(Environment::Live)
            .with_feed(DataFeed::Iex)
            .with_crypto_location(CryptoLocation::Eu1);

        assert_eq!(config.stock_stream_url(), "wss://stream.data.alpaca.markets/v2/iex");
        assert_eq!(
            config.crypto_stream_url(),
            "wss://stream.data.alpaca.markets/v1beta3/crypto/eu-1"
        );
    }

    #[test]
    fn from_lookup_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALPACA_KEY", "PKTEST"),
            ("ALPACA_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.credentials.key(), "PKTEST");
        assert_eq!(config.environment, Environment::Paper);
        assert_eq!(config.feed, DataFeed::Sip);
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect, ReconnectConfig::default());
        assert_eq!(config.heartbeat, HeartbeatConfig::default());
    }

    #[test]
    fn from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALPACA_KEY", "PKTEST"),
            ("ALPACA_SECRET", "secret"),
            ("ALPACA_ENV", "live"),
            ("ALPACA_FEED", "iex"),
            ("ALPACA_CRYPTO_LOCATION", "us-1"),
            ("ALPACA_STREAM_MSGPACK", "true"),
            ("ALPACA_STREAM_CONNECT_TIMEOUT_SECS", "5"),
            ("ALPACA_STREAM_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("ALPACA_STREAM_RECONNECT_DELAY_MAX_SECS", "10"),
            ("ALPACA_STREAM_RECONNECT_DELAY_MULTIPLIER", "1.5"),
            ("ALPACA_STREAM_RECONNECT_JITTER", "0"),
            ("ALPACA_STREAM_MAX_RECONNECT_ATTEMPTS", "7"),
            ("ALPACA_STREAM_HEARTBEAT_INTERVAL_SECS", "15"),
            ("ALPACA_STREAM_HEARTBEAT_TIMEOUT_SECS", "45"),
        ]))
        .unwrap();

        assert!(config.environment.is_live());
        assert_eq!(config.feed, DataFeed::Iex);
        assert_eq!(config.crypto_location, CryptoLocation::Us1);
        assert_eq!(config.encoding, Encoding::MsgPack);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(10));
        assert!((config.reconnect.multiplier - 1.5).abs() < f64::EPSILON);
        assert!(config.reconnect.jitter_factor.abs() < f64::EPSILON);
        assert_eq!(config.reconnect.max_attempts, 7);
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(15));
        assert_eq!(config.heartbeat.timeout, Duration::from_secs(45));
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALPACA_KEY", "PKTEST"),
            ("ALPACA_SECRET", "secret"),
            ("ALPACA_STREAM_CONNECT_TIMEOUT_SECS", "soon"),
            ("ALPACA_STREAM_MSGPACK", "yes please"),
        ]))
        .unwrap();

        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.encoding, Encoding::Json);
    }

    #[test_case("ALPACA_STREAM_RECONNECT_JITTER", "NaN")]
    #[test_case("ALPACA_STREAM_RECONNECT_JITTER", "inf")]
    #[test_case("ALPACA_STREAM_RECONNECT_JITTER", "-0.5")]
    #[test_case("ALPACA_STREAM_RECONNECT_DELAY_MULTIPLIER", "inf")]
    #[test_case("ALPACA_STREAM_RECONNECT_DELAY_MULTIPLIER", "NaN")]
    #[test_case("ALPACA_STREAM_RECONNECT_DELAY_MULTIPLIER", "-2")]
    fn invalid_reconnect_factors_fall_back_to_defaults(var: &str, value: &str) {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALPACA_KEY", "PKTEST"),
            ("ALPACA_SECRET", "secret"),
            (var, value),
        ]))
        .unwrap();

        assert_eq!(config.reconnect, ReconnectConfig::default());
        let mut policy = crate::infrastructure::alpaca::ReconnectPolicy::new(config.reconnect);
        assert!(policy.next_delay().is_some());
    }

    #[test_case("ALPACA_STREAM_HEARTBEAT_INTERVAL_SECS")]
    #[test_case("ALPACA_STREAM_HEARTBEAT_TIMEOUT_SECS")]
    #[test_case("ALPACA_STREAM_CONNECT_TIMEOUT_SECS")]
    fn zero_durations_fall_back_to_defaults(var: &str) {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALPACA_KEY", "PKTEST"),
            ("ALPACA_SECRET", "secret"),
            (var, "0"),
        ]))
        .unwrap();

        assert_eq!(config.heartbeat, HeartbeatConfig::default());
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn missing_credentials() {
        let err = ClientConfig::from_lookup(lookup(&[("ALPACA_SECRET", "secret")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "ALPACA_KEY"));

        let err = ClientConfig::from_lookup(lookup(&[("ALPACA_KEY", "key")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "ALPACA_SECRET"));
    }

    #[test]
    fn empty_credentials() {
        let err = ClientConfig::from_lookup(lookup(&[("ALPACA_KEY", ""), ("ALPACA_SECRET", "s")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Credentials(AuthError::EmptyKey)));
    }

    #[test]
    fn from_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ALPACA_KEY=PKFILE").unwrap();
        writeln!(file, "ALPACA_SECRET=from-file").unwrap();
        writeln!(file, "ALPACA_FEED=iex").unwrap();
        file.flush().unwrap();

        let config = ClientConfig::from_env_file(file.path()).unwrap();

        assert_eq!(config.credentials.key(), "PKFILE");
        assert_eq!(config.feed, DataFeed::Iex);
    }

    #[test]
    fn from_env_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::from_env_file(dir.path().join("absent.env"));
        assert!(matches!(result, Err(ConfigError::EnvFile(_))));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let debug = format!("{:?}", config(Environment::Paper));
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
