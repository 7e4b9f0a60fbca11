use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub max_tutor_load: i64,
    pub heartbeat_interval_seconds: u64,
    pub push_send_buffer: usize,
    pub event_worker_batch: i64,
    pub default_locale: String,
    pub outbox_gateway_url: Option<String>,
    pub outbox_secret: Option<String>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            max_tutor_load: get_env_or("MAX_TUTOR_LOAD", 5)?,
            heartbeat_interval_seconds: get_env_or("HEARTBEAT_INTERVAL_SECONDS", 30)?,
            push_send_buffer: get_env_or("PUSH_SEND_BUFFER", 64)?,
            event_worker_batch: get_env_or("EVENT_WORKER_BATCH", 100)?,
            default_locale: env::var("DEFAULT_LOCALE").unwrap_or_else(|_| "fr".to_string()),
            outbox_gateway_url: env::var("OUTBOX_GATEWAY_URL").ok(),
            outbox_secret: env::var("OUTBOX_SECRET").ok(),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
