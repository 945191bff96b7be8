use crate::providers::{EquifaxEnvironment, EquifaxSettings, MymSettings};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub api_key: Option<String>, // Optional: when unset the API is open
    pub equifax_base_url: String,
    pub equifax_client_id: String,
    pub equifax_client_secret: String,
    pub equifax_environment: EquifaxEnvironment,
    pub mym_base_url: String,
    pub mym_api_key: String,
    pub scoring_rules_path: Option<PathBuf>,
    pub strict_rules: bool,
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value.trim().to_string())
        })
}

fn required_url(name: &str) -> anyhow::Result<String> {
    let value = required(name)?;
    let parsed = url::Url::parse(&value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got '{}'", name, other),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            api_key: optional("API_KEY"),
            equifax_base_url: required_url("EQUIFAX_BASE_URL")?,
            equifax_client_id: required("EQUIFAX_CLIENT_ID")?,
            equifax_client_secret: required("EQUIFAX_CLIENT_SECRET")?,
            equifax_environment: match optional("EQUIFAX_ENVIRONMENT") {
                None => EquifaxEnvironment::default(),
                Some(env) => EquifaxEnvironment::parse(&env).ok_or_else(|| {
                    anyhow::anyhow!("EQUIFAX_ENVIRONMENT must be 'sandbox' or 'production'")
                })?,
            },
            mym_base_url: required_url("MYM_BASE_URL")?,
            mym_api_key: required("MYM_API_KEY")?,
            scoring_rules_path: optional("SCORING_RULES_PATH").map(PathBuf::from),
            strict_rules: match optional("SCORING_STRICT_RULES") {
                None => false,
                Some(value) => parse_bool("SCORING_STRICT_RULES", &value)?,
            },
        };

        // Never log credentials
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Equifax Base URL: {}", config.equifax_base_url);
        tracing::debug!("Equifax environment: {}", config.equifax_environment.as_str());
        tracing::debug!("MYM Base URL: {}", config.mym_base_url);
        if let Some(ref path) = config.scoring_rules_path {
            tracing::info!("Scoring rules file: {}", path.display());
        }
        tracing::debug!("Strict scoring rules: {}", config.strict_rules);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn equifax_settings(&self) -> EquifaxSettings {
        EquifaxSettings {
            base_url: self.equifax_base_url.clone(),
            client_id: self.equifax_client_id.clone(),
            client_secret: self.equifax_client_secret.clone(),
            environment: self.equifax_environment,
        }
    }

    pub fn mym_settings(&self) -> MymSettings {
        MymSettings {
            base_url: self.mym_base_url.clone(),
            api_key: self.mym_api_key.clone(),
        }
    }
}
