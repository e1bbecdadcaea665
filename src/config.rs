use anyhow::Context;
use serde::Deserialize;

const DEFAULT_TTL_HOURS: i64 = 24;
const MAX_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    /// Exact origin allowed to send credentialed requests; permissive CORS when unset.
    pub frontend_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "quill".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "quill-users".into()),
            ttl_hours: parse_ttl_hours(std::env::var("JWT_TTL_HOURS").ok().as_deref())?,
        };
        anyhow::ensure!(!jwt.secret.is_empty(), "JWT_SECRET must not be empty");

        let cookie = CookieConfig {
            name: std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "token".into()),
            secure: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
        };
        let frontend_url = std::env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            jwt,
            cookie,
            frontend_url,
        })
    }
}

fn parse_ttl_hours(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_TTL_HOURS);
    };
    let hours: i64 = raw
        .parse()
        .with_context(|| format!("JWT_TTL_HOURS is not a number: {raw}"))?;
    anyhow::ensure!(
        (1..=MAX_TTL_HOURS).contains(&hours),
        "JWT_TTL_HOURS must be between 1 and {MAX_TTL_HOURS}, got {hours}"
    );
    Ok(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_defaults_when_unset() {
        assert_eq!(parse_ttl_hours(None).unwrap(), 24);
        assert_eq!(parse_ttl_hours(Some("  ")).unwrap(), 24);
        assert_eq!(parse_ttl_hours(Some("48")).unwrap(), 48);
    }

    #[test]
    fn ttl_out_of_range_is_rejected() {
        for raw in ["0", "-5", "abc", "100000000", "9223372036854775807"] {
            assert!(parse_ttl_hours(Some(raw)).is_err(), "accepted {raw}");
        }
        assert_eq!(parse_ttl_hours(Some("8760")).unwrap(), MAX_TTL_HOURS);
    }
}
