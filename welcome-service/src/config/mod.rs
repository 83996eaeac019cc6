use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Template used for a chat's root node when no welcome settings exist yet.
pub const DEFAULT_WELCOME_MESSAGE: &str = "\
:crown: Welcome {mention} to {group_name}! :fire:

:star: We hope you enjoy your stay here :rocket:

:check: Feel free to explore the buttons below :gem:";

#[derive(Debug, Clone)]
pub struct WelcomeConfig {
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub telegram: TelegramConfig,
    pub keep_alive: KeepAliveConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// The single privileged identity allowed to use the editor flows.
    pub admin_id: i64,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub interval_secs: u64,
}

impl WelcomeConfig {
    pub fn load() -> Result<Self, AppError> {
        // Common config handles .env and the APP__ prefix.
        let common = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(WelcomeConfig {
            common,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("welcome_db"), is_prod)?,
            },
            telegram: TelegramConfig {
                bot_token: get_env("TELEGRAM_BOT_TOKEN", None, is_prod)?,
                admin_id: get_env("TELEGRAM_ADMIN_ID", Some("0"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid TELEGRAM_ADMIN_ID: {}", e))
                    })?,
                api_base: get_env(
                    "TELEGRAM_API_BASE",
                    Some("https://api.telegram.org"),
                    is_prod,
                )?,
            },
            keep_alive: KeepAliveConfig {
                enabled: env::var("KEEP_ALIVE_URL").is_ok(),
                url: env::var("KEEP_ALIVE_URL").ok(),
                interval_secs: get_env("KEEP_ALIVE_INTERVAL_SECS", Some("840"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "Invalid KEEP_ALIVE_INTERVAL_SECS: {}",
                            e
                        ))
                    })?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else {
                default.map(|d| d.to_string()).ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(format!("{} is not set", key)))
                })
            }
        }
    }
}
