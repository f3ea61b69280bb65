// src/config.rs

use std::{env, fmt, str::FromStr};

use dotenvy::dotenv;

use crate::engine::Policy;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,

    /// Seconds between background leaderboard rebuilds. 0 disables the timer.
    pub leaderboard_refresh_secs: u64,

    pub policy: Policy,
}

/// Raised when a required variable is missing or a value does not parse.
#[derive(Debug)]
pub struct ConfigError(String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            leaderboard_refresh_secs: parsed("LEADERBOARD_REFRESH_SECS", 300)?,
            policy: policy_from_env()?,
        })
    }
}

fn policy_from_env() -> Result<Policy, ConfigError> {
    let mut policy = Policy::default();

    let scoring = &mut policy.scoring;
    scoring.allow_negative_contributions = parsed(
        "ALLOW_NEGATIVE_CONTRIBUTIONS",
        scoring.allow_negative_contributions,
    )?;

    let integrity = &mut policy.integrity;
    integrity.hard_violation_limit = parsed("VIOLATION_HARD_LIMIT", integrity.hard_violation_limit)?;
    integrity.terminated_score = parsed("TERMINATED_SCORE", integrity.terminated_score)?;
    integrity.penalty_step_percent = parsed("PENALTY_STEP_PERCENT", integrity.penalty_step_percent)?;
    integrity.max_penalty_percent = parsed("MAX_PENALTY_PERCENT", integrity.max_penalty_percent)?;

    let eligibility = &mut policy.eligibility;
    eligibility.combined_min_clean =
        parsed("ELIGIBILITY_COMBINED_MIN_CLEAN", eligibility.combined_min_clean)?;
    eligibility.combined_min_days =
        parsed("ELIGIBILITY_COMBINED_MIN_DAYS", eligibility.combined_min_days)?;
    eligibility.min_clean = parsed("ELIGIBILITY_MIN_CLEAN", eligibility.min_clean)?;
    eligibility.min_days = parsed("ELIGIBILITY_MIN_DAYS", eligibility.min_days)?;
    eligibility.reduction_divisor = parsed("REDUCTION_DIVISOR", eligibility.reduction_divisor)?;
    eligibility.reduction_minimum = parsed("REDUCTION_MINIMUM", eligibility.reduction_minimum)?;
    eligibility.behavior_clean_saturation =
        parsed("BEHAVIOR_CLEAN_SATURATION", eligibility.behavior_clean_saturation)?;
    eligibility.behavior_days_saturation =
        parsed("BEHAVIOR_DAYS_SATURATION", eligibility.behavior_days_saturation)?;
    eligibility.behavior_clean_weight =
        parsed("BEHAVIOR_CLEAN_WEIGHT", eligibility.behavior_clean_weight)?;

    policy.ranking = parsed("RANKING_POLICY", policy.ranking)?;

    if policy.integrity.max_penalty_percent > 100.0 || policy.integrity.max_penalty_percent < 0.0 {
        return Err(ConfigError(
            "MAX_PENALTY_PERCENT must be between 0 and 100".to_string(),
        ));
    }

    Ok(policy)
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError(format!("{} must be set", key)))
}

fn parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError(format!("invalid {}='{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
