use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;

use crate::clock::DayPolicy;
use crate::model::location::DEFAULT_RADIUS_METERS;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,
    pub rate_attendance_per_min: u32,

    pub api_prefix: String,

    /// Which calendar day a timestamp belongs to
    pub day_policy: DayPolicy,
    pub location_cache_ttl: Duration,
    pub default_location_radius: f64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}: cannot parse {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let day_policy = match env::var("DAY_UTC_OFFSET_MINUTES") {
            Ok(raw) => {
                let minutes: i32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("DAY_UTC_OFFSET_MINUTES: cannot parse {raw:?}"))?;
                DayPolicy::from_offset_minutes(minutes)
                    .ok_or_else(|| anyhow!("DAY_UTC_OFFSET_MINUTES out of range: {minutes}"))?
            }
            Err(_) => DayPolicy::local(),
        };

        let default_location_radius = env_or("DEFAULT_LOCATION_RADIUS", DEFAULT_RADIUS_METERS)?;
        if !default_location_radius.is_finite() || default_location_radius <= 0.0 {
            return Err(anyhow!("DEFAULT_LOCATION_RADIUS must be positive"));
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: env_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: env_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: env_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: env_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: env_or("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_attendance_per_min: env_or("RATE_ATTENDANCE_PER_MIN", 30)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            day_policy,
            location_cache_ttl: Duration::from_secs(env_or("LOCATION_CACHE_TTL_SECS", 60)?),
            default_location_radius,
        })
    }
}
