use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: Option<String>,
    pub media_root: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub paseto_access_key: [u8; 32],
    pub page_size: usize,
    pub index_cache_ttl_seconds: u64,
    pub login_url: String,
    pub upload_max_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let page_size: usize = env_or_parse("PAGE_SIZE", "10")?;
        if page_size == 0 {
            return Err(anyhow!("invalid PAGE_SIZE: must be at least 1"));
        }

        let login_url = env_or("LOGIN_URL", "/auth/login/");
        if !login_url.starts_with('/') {
            return Err(anyhow!("invalid LOGIN_URL: must be an absolute path"));
        }

        Ok(Self {
            http_addr,
            database_url: env_opt("DATABASE_URL"),
            redis_url: env_opt("REDIS_URL"),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_bucket: env_opt("S3_BUCKET"),
            media_root: env_or("MEDIA_ROOT", "media"),
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
            page_size,
            index_cache_ttl_seconds: env_or_parse("INDEX_CACHE_TTL_SECONDS", "20")?,
            login_url,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "5242880")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
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

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}

fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_32_byte_key() {
        // "0123456789abcdef0123456789abcdef"
        let key = decode_key_32("K", "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").unwrap();
        assert_eq!(&key[..4], b"0123");
    }

    #[test]
    fn rejects_short_keys() {
        let err = decode_key_32("K", "c2hvcnQ=").unwrap_err();
        assert_eq!(err.to_string(), "invalid K: expected 32 bytes");
    }

    #[test]
    fn rejects_garbage_base64() {
        assert!(decode_key_32("K", "%%%").is_err());
    }
}
