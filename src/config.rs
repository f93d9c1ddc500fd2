use log::*;
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/**
 * Credentials for the remote document store
 *
 * The remote backend is only chosen when `api_key` is non-empty
 */
#[derive(Clone, Debug, Default)]
pub struct RemoteConfig {
    pub api_key: String,
    pub project_id: String,
    pub database_url: String,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub remote: RemoteConfig,
    pub data_dir: PathBuf,
    pub listen: String,
    pub passcode: Option<String>,
    pub templates: PathBuf,
}

impl Config {
    /**
     * Build the configuration from the process environment, after loading `.env`
     */
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| {
                    debug!("{} not set, using default: {:?}", key, default);
                    default.to_string()
                })
        };

        let remote = RemoteConfig {
            api_key: get("DOCSTORE_API_KEY", ""),
            project_id: get("DOCSTORE_PROJECT_ID", "northpole"),
            database_url: get("DATABASE_URL", ""),
        };

        if remote.is_configured() && remote.database_url.is_empty() {
            return Err(Error::Config(
                "DATABASE_URL must be set when DOCSTORE_API_KEY is".to_string(),
            ));
        }

        let passcode = lookup("NORTHPOLE_PASSCODE")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if let Some(code) = &passcode {
            if !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::Config("NORTHPOLE_PASSCODE must be numeric".to_string()));
            }
        }
        else {
            warn!("No NORTHPOLE_PASSCODE set, admin actions are disabled");
        }

        Ok(Self {
            remote,
            data_dir: PathBuf::from(get("NORTHPOLE_DATA_DIR", "./data")),
            listen: get("NORTHPOLE_LISTEN", "127.0.0.1:8000"),
            passcode,
            templates: PathBuf::from(get("NORTHPOLE_TEMPLATES", "views")),
        })
    }
}
