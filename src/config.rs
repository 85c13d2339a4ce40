use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_QUESTIONS_FILE: &str = "questions.json";
const DEFAULT_RESULTS_FILE: &str = "results.json";
const DEFAULT_LEADERS_TOP_N: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BOT_TOKEN is not set")]
    MissingToken,
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime settings, read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub token: String,
    pub questions_file: PathBuf,
    pub results_file: PathBuf,
    pub leaders_top_n: usize,
    /// Telegram user allowed to reset the tournament. Nobody when unset.
    pub admin_user_id: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = var("BOT_TOKEN")
            .or_else(|| var("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::MissingToken)?;

        let leaders_top_n = match var("LEADERS_TOP_N") {
            None => DEFAULT_LEADERS_TOP_N,
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LEADERS_TOP_N",
                        expected: "a positive integer",
                        value,
                    })
                }
            },
        };

        let admin_user_id = match var("ADMIN_USER_ID") {
            None => None,
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::Invalid {
                    key: "ADMIN_USER_ID",
                    expected: "a Telegram user id",
                    value: value.clone(),
                }
            })?),
        };

        Ok(Self {
            token,
            questions_file: var("QUESTIONS_FILE")
                .unwrap_or_else(|| DEFAULT_QUESTIONS_FILE.to_string())
                .into(),
            results_file: var("RESULTS_FILE")
                .unwrap_or_else(|| DEFAULT_RESULTS_FILE.to_string())
                .into(),
            leaders_top_n,
            admin_user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.token, "123:abc");
        assert_eq!(config.questions_file, PathBuf::from("questions.json"));
        assert_eq!(config.results_file, PathBuf::from("results.json"));
        assert_eq!(config.leaders_top_n, 10);
        assert_eq!(config.admin_user_id, None);
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("TELOXIDE_TOKEN", "t"),
            ("QUESTIONS_FILE", "/data/q.json"),
            ("RESULTS_FILE", "/data/r.json"),
            ("LEADERS_TOP_N", " 5 "),
            ("ADMIN_USER_ID", "1001"),
        ])
        .unwrap();
        assert_eq!(config.token, "t");
        assert_eq!(config.questions_file, PathBuf::from("/data/q.json"));
        assert_eq!(config.results_file, PathBuf::from("/data/r.json"));
        assert_eq!(config.leaders_top_n, 5);
        assert_eq!(config.admin_user_id, Some(1001));
    }

    #[test]
    fn token_is_required() {
        assert_eq!(config(&[]), Err(ConfigError::MissingToken));
        assert_eq!(config(&[("BOT_TOKEN", "  ")]), Err(ConfigError::MissingToken));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(
            config(&[("BOT_TOKEN", "t"), ("LEADERS_TOP_N", "0")]),
            Err(ConfigError::Invalid {
                key: "LEADERS_TOP_N",
                ..
            })
        ));
        assert!(matches!(
            config(&[("BOT_TOKEN", "t"), ("ADMIN_USER_ID", "grandpa")]),
            Err(ConfigError::Invalid {
                key: "ADMIN_USER_ID",
                ..
            })
        ));
    }
}
