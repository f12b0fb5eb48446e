use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::analyzer::{GenerationSettings, TokenRates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Json,
    Sqlite,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            // "parquet" is what older .env files used for the columnar store.
            "sqlite" | "parquet" => Ok(Self::Sqlite),
            other => Err(anyhow!(
                "Unknown storage '{}'. Available: json, sqlite",
                other
            )),
        }
    }
}

/// Settings read once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    pub offers_dir: PathBuf,
    pub data_dir: PathBuf,
    pub context_dir: PathBuf,
    pub max_file_size_mb: u64,
    pub cleanup_days: u32,
    pub storage: StorageKind,
    pub model: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub rates: TokenRates,
    pub generation: GenerationSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // .env is optional
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let defaults = GenerationSettings::default();
        let default_rates = TokenRates::default();

        Ok(Config {
            offers_dir: lookup("OFFERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("offers")),
            context_dir: data_dir.join("context"),
            data_dir,
            max_file_size_mb: parse_or(&lookup, "MAX_FILE_SIZE_MB", 10)?,
            cleanup_days: parse_or(&lookup, "CLEANUP_DAYS", 30)?,
            storage: parse_or(&lookup, "PREFERRED_STORAGE", StorageKind::Sqlite)?,
            model: lookup("SETMATCH_MODEL").unwrap_or_else(|| "api-sonnet".to_string()),
            anthropic_api_key: lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            rates: TokenRates {
                input: parse_rate(&lookup, "INPUT_TOKEN_COST", default_rates.input)?,
                output: parse_rate(&lookup, "OUTPUT_TOKEN_COST", default_rates.output)?,
            },
            generation: GenerationSettings {
                max_tokens: parse_or(&lookup, "MAX_TOKENS", defaults.max_tokens)?,
                temperature: parse_or(&lookup, "ANALYSIS_TEMPERATURE", defaults.temperature)?,
                cover_letter_temperature: parse_or(
                    &lookup,
                    "COVER_LETTER_TEMPERATURE",
                    defaults.cover_letter_temperature,
                )?,
            },
        })
    }
}

fn default_data_dir() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "setmatch") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("data")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Invalid value '{raw}' for {key}")),
        _ => Ok(default),
    }
}

// Costs end up in stored records, so only finite, non-negative rates are usable.
fn parse_rate(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> Result<f64> {
    let rate = parse_or(lookup, key, default)?;
    if !rate.is_finite() || rate < 0.0 {
        return Err(anyhow!(
            "Invalid value '{rate}' for {key}: expected a non-negative cost per token"
        ));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATA_DIR", "/tmp/setmatch")]).unwrap();
        assert_eq!(config.max_file_size_mb, 10);
        assert_eq!(config.cleanup_days, 30);
        assert_eq!(config.storage, StorageKind::Sqlite);
        assert_eq!(config.offers_dir, PathBuf::from("offers"));
        assert_eq!(config.context_dir, PathBuf::from("/tmp/setmatch/context"));
        assert_eq!(config.model, "api-sonnet");
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.generation.max_tokens, 4096);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("MAX_FILE_SIZE_MB", "2"),
            ("CLEANUP_DAYS", "7"),
            ("PREFERRED_STORAGE", "JSON"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("INPUT_TOKEN_COST", "0.5"),
            ("OUTPUT_TOKEN_COST", "2"),
        ])
        .unwrap();
        assert_eq!(config.max_file_size_mb, 2);
        assert_eq!(config.cleanup_days, 7);
        assert_eq!(config.storage, StorageKind::Json);
        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.rates.input, 0.5);
        assert_eq!(config.rates.output, 2.0);
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = config_from(&[("CLEANUP_DAYS", "soon")]).unwrap_err();
        assert!(format!("{err:#}").contains("CLEANUP_DAYS"));
    }

    #[test]
    fn test_unusable_token_costs_are_rejected() {
        for (key, value) in [
            ("INPUT_TOKEN_COST", "NaN"),
            ("INPUT_TOKEN_COST", "inf"),
            ("OUTPUT_TOKEN_COST", "-0.001"),
        ] {
            let err = config_from(&[(key, value)]).unwrap_err();
            assert!(format!("{err:#}").contains(key), "{key}={value}");
        }
        assert_eq!(config_from(&[("INPUT_TOKEN_COST", "0")]).unwrap().rates.input, 0.0);
    }

    #[test]
    fn test_unknown_storage_is_rejected() {
        assert!(config_from(&[("PREFERRED_STORAGE", "csv")]).is_err());
        assert_eq!("parquet".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);
    }
}
