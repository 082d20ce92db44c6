use secrecy::SecretString;

use crate::config::helpers::{optional_bool_env, optional_env, optional_positive_u64};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Channel configurations.
#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    /// Whether the interactive terminal channel runs.
    pub repl_enabled: bool,
    /// Telegram long-poll channel. `None` when no bot token is configured.
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

impl ChannelsConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let channels = &settings.channels;

        let repl_enabled = optional_bool_env("CLI_ENABLED")?.unwrap_or(channels.repl_enabled);

        let bot_token = match optional_env("BOT_TOKEN")? {
            Some(token) => Some(token),
            None => optional_env("TELEGRAM_BOT_TOKEN")?,
        };

        let telegram = match bot_token {
            Some(token) => {
                let api_base_url = optional_env("TELEGRAM_API_BASE_URL")?
                    .unwrap_or_else(|| channels.telegram_api_base_url.clone());
                url::Url::parse(&api_base_url).map_err(|e| ConfigError::InvalidValue {
                    key: "TELEGRAM_API_BASE_URL".to_string(),
                    message: format!("must be a valid URL: {e}"),
                })?;

                let poll_timeout_secs = optional_positive_u64("TELEGRAM_POLL_TIMEOUT_SECS")?
                    .unwrap_or(channels.telegram_poll_timeout_secs);

                Some(TelegramConfig {
                    bot_token: SecretString::from(token),
                    api_base_url: api_base_url.trim_end_matches('/').to_string(),
                    poll_timeout_secs,
                })
            }
            None => None,
        };

        Ok(Self {
            repl_enabled,
            telegram,
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::config::helpers::ENV_MUTEX;

    fn clear_channel_env() {
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::remove_var("CLI_ENABLED");
            std::env::remove_var("BOT_TOKEN");
            std::env::remove_var("TELEGRAM_BOT_TOKEN");
            std::env::remove_var("TELEGRAM_API_BASE_URL");
            std::env::remove_var("TELEGRAM_POLL_TIMEOUT_SECS");
        }
    }

    #[test]
    fn telegram_disabled_without_token() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_channel_env();

        let config = ChannelsConfig::resolve(&Settings::default()).expect("resolve");
        assert!(config.repl_enabled);
        assert!(config.telegram.is_none());
    }

    #[test]
    fn telegram_enabled_with_token() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_channel_env();
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("BOT_TOKEN", "123:abc");
            std::env::set_var("TELEGRAM_API_BASE_URL", "http://127.0.0.1:9000/");
            std::env::set_var("CLI_ENABLED", "false");
        }

        let config = ChannelsConfig::resolve(&Settings::default()).expect("resolve");
        clear_channel_env();

        assert!(!config.repl_enabled);
        let telegram = config.telegram.expect("telegram configured");
        assert_eq!(telegram.bot_token.expose_secret(), "123:abc");
        assert_eq!(telegram.api_base_url, "http://127.0.0.1:9000");
        assert_eq!(telegram.poll_timeout_secs, 30);
    }

    #[test]
    fn rejects_non_boolean_cli_flag() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_channel_env();
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("CLI_ENABLED", "maybe");
        }

        let err = ChannelsConfig::resolve(&Settings::default()).unwrap_err();
        clear_channel_env();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CLI_ENABLED"));
    }
}
