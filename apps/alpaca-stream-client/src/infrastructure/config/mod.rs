//! Configuration Module
//!
//! Client configuration, built in code or loaded from the environment.

mod settings;

pub use settings::{ClientConfig, ConfigError, CryptoLocation, DataFeed, Environment, load_dotenv};
