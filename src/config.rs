use std::env;
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::access::RoleName;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// `LOG_FORMAT=json` switches the subscriber to one JSON object per line.
    pub log_json: bool,
    pub event_buffer_size: usize,
    pub accounting_base_url: Option<String>,
    pub accounting_token: Option<String>,
    pub accounting_timeout: Duration,
    /// Zero disables the periodic invoice sweep.
    pub invoice_sync_interval: Duration,
    pub signature_dir: Option<PathBuf>,
    pub signature_url_ttl: Duration,
    pub user_roles: Vec<(Uuid, RoleName)>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: non_empty_var("LOG_FORMAT")
                .is_some_and(|format| format.eq_ignore_ascii_case("json")),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            accounting_base_url: non_empty_var("ACCOUNTING_BASE_URL"),
            accounting_token: non_empty_var("ACCOUNTING_TOKEN"),
            accounting_timeout: Duration::from_millis(parse_or_default(
                "ACCOUNTING_TIMEOUT_MS",
                3000,
            )?),
            invoice_sync_interval: Duration::from_secs(parse_or_default(
                "INVOICE_SYNC_INTERVAL_SECS",
                0,
            )?),
            signature_dir: non_empty_var("SIGNATURE_DIR").map(PathBuf::from),
            signature_url_ttl: Duration::from_secs(parse_or_default(
                "SIGNATURE_URL_TTL_SECS",
                3600,
            )?),
            user_roles: parse_user_roles(&env::var("USER_ROLES").unwrap_or_default())?,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

/// Parses `uuid:role` pairs separated by commas.
pub fn parse_user_roles(raw: &str) -> Result<Vec<(Uuid, RoleName)>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (identity, role) = pair.split_once(':').ok_or_else(|| {
                AppError::Internal(format!("invalid USER_ROLES entry {pair}: expected uuid:role"))
            })?;
            let identity = Uuid::parse_str(identity.trim())
                .map_err(|err| AppError::Internal(format!("invalid USER_ROLES id: {err}")))?;
            let role = role
                .parse::<RoleName>()
                .map_err(|err| AppError::Internal(format!("invalid USER_ROLES role: {err}")))?;
            Ok((identity, role))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::parse_user_roles;
    use crate::models::access::RoleName;

    #[test]
    fn parses_role_pairs() {
        let admin = Uuid::from_u128(1);
        let driver = Uuid::from_u128(2);
        let raw = format!("{admin}:admin, {driver}:Driver,");

        let parsed = parse_user_roles(&raw).unwrap();
        assert_eq!(parsed, vec![(admin, RoleName::Admin), (driver, RoleName::Driver)]);
    }

    #[test]
    fn empty_role_list_is_fine() {
        assert!(parse_user_roles("").unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_role() {
        let raw = format!("{}:janitor", Uuid::from_u128(3));
        assert!(parse_user_roles(&raw).is_err());
    }
}
