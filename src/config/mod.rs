use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_bucket: String,
    pub identity_endpoint: String,
    pub email_portal_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub upload_max_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let identity_endpoint = env_url("IDENTITY_ENDPOINT")?;
        let email_portal_url = env_url("EMAIL_PORTAL_URL")?;

        Ok(Self {
            http_addr,
            database_url: env_or_err("DATABASE_URL")?,
            s3_endpoint: env_or_err("S3_ENDPOINT")?,
            s3_region: env_or("S3_REGION", "fr-par"),
            s3_bucket: env_or_err("S3_BUCKET")?,
            identity_endpoint,
            email_portal_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "10485760")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_url(key: &str) -> Result<String> {
    let value = env_or_err(key)?;
    Url::parse(&value).map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    Ok(value)
}
