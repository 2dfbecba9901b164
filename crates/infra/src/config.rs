//! Process configuration.

use std::net::SocketAddr;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEV_QR_SECRET: &str = "dev-qr-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Runtime configuration, read from the environment.
///
/// | Env Var                    | Default          |
/// |----------------------------|------------------|
/// | `BIND_ADDR`                | `0.0.0.0:8080`   |
/// | `JWT_SECRET`               | dev secret       |
/// | `QR_SIGNING_SECRET`        | dev secret       |
/// | `QR_SIGNATURE_REQUIRED`    | `true`           |
/// | `CHECK_IN_WINDOW_HOURS`    | `24`             |
/// | `DATABASE_URL`             | unset: in-memory |
/// | `DATABASE_MAX_CONNECTIONS` | `10`             |
/// | `PDF_BASE_URL`             | `/pdfs`          |
/// | `UPLOAD_DIR`               | `uploads`        |
/// | `LOG_FORMAT`               | `json`           |
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub qr_signing_secret: String,
    pub qr_signature_required: bool,
    pub check_in_window_hours: i64,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub pdf_base_url: String,
    /// Where visitor photos are written.
    pub upload_dir: String,
    /// `json` or `pretty`.
    pub log_format: String,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("qr_signature_required", &self.qr_signature_required)
            .field("check_in_window_hours", &self.check_in_window_hours)
            .field("database", &self.database_url.is_some())
            .field("pdf_base_url", &self.pdf_base_url)
            .field("upload_dir", &self.upload_dir)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason,
    }
}

fn flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "expected true or false")),
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(v) => v
                .parse()
                .map_err(|_| invalid("BIND_ADDR", &v, "expected host:port"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let qr_signing_secret = get("QR_SIGNING_SECRET").unwrap_or_else(|| {
            tracing::warn!("QR_SIGNING_SECRET not set; using insecure dev default");
            DEV_QR_SECRET.to_string()
        });

        let qr_signature_required = match get("QR_SIGNATURE_REQUIRED") {
            Some(v) => flag("QR_SIGNATURE_REQUIRED", &v)?,
            None => true,
        };

        let check_in_window_hours = match get("CHECK_IN_WINDOW_HOURS") {
            Some(v) => v
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| invalid("CHECK_IN_WINDOW_HOURS", &v, "expected a positive number of hours"))?,
            None => 24,
        };

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("DATABASE_MAX_CONNECTIONS", &v, "expected a positive integer"))?,
            None => 10,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                f @ ("json" | "pretty") => f.to_string(),
                _ => return Err(invalid("LOG_FORMAT", &v, "expected json or pretty")),
            },
            None => "json".to_string(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            qr_signing_secret,
            qr_signature_required,
            check_in_window_hours,
            database_url: get("DATABASE_URL"),
            database_max_connections,
            pdf_base_url: get("PDF_BASE_URL").unwrap_or_else(|| "/pdfs".to_string()),
            upload_dir: get("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            log_format,
        })
    }
}
