use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{query::OverlapPolicy, report::Granularity};

const DEFAULT_ORDERS: &str = "data/merged_data.csv";
const DEFAULT_USERS: &str = "data/users.csv";
const DEFAULT_START: &str = "2020-01-01";
const DEFAULT_END: &str = "2023-12-31";
const DEFAULT_LLM_HOST: &str = "http://127.0.0.1";
const DEFAULT_LLM_PORT: u16 = 11434;
const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";
const DEFAULT_MAX_ATTEMPTS: i64 = 3;
const DEFAULT_FORECAST_PERIODS: i64 = 30;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Print the filter extracted from UTTERANCE as JSON and exit.
    #[arg(long, value_name = "UTTERANCE")]
    pub parse: Option<String>,

    /// Print the Argon2 hash of PASSWORD for the users file and exit.
    #[arg(long, value_name = "PASSWORD")]
    pub hash_password: Option<String>,
}

impl Args {
    /// The given config path, or `config.toml` in the platform config directory.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .filter(|path| path.exists())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    pub orders: PathBuf,
    pub users: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Rule,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    pub strategy: Strategy,
    pub overlap: OverlapPolicy,
    pub default_start: NaiveDate,
    pub default_end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub max_attempts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSettings {
    pub periods: usize,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data: DataSettings,
    pub extractor: ExtractorSettings,
    pub llm: LlmSettings,
    pub forecast: ForecastSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Settings made only of the defaults.
    pub fn from_defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .set_default("data.orders", DEFAULT_ORDERS)?
            .set_default("data.users", DEFAULT_USERS)?
            .set_default("extractor.strategy", "rule")?
            .set_default("extractor.overlap", "allow")?
            .set_default("extractor.default_start", DEFAULT_START)?
            .set_default("extractor.default_end", DEFAULT_END)?
            .set_default("llm.host", DEFAULT_LLM_HOST)?
            .set_default("llm.port", i64::from(DEFAULT_LLM_PORT))?
            .set_default("llm.model", DEFAULT_LLM_MODEL)?
            .set_default("llm.max_attempts", DEFAULT_MAX_ATTEMPTS)?
            .set_default("forecast.periods", DEFAULT_FORECAST_PERIODS)?
            .set_default("forecast.granularity", "daily")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::from_defaults().unwrap();
        let window = crate::query::DateWindow::default();
        assert_eq!(settings.data.orders, PathBuf::from(DEFAULT_ORDERS));
        assert_eq!(settings.extractor.strategy, Strategy::Rule);
        assert_eq!(settings.extractor.overlap, OverlapPolicy::Allow);
        assert_eq!(settings.extractor.default_start, window.start);
        assert_eq!(settings.extractor.default_end, window.end);
        assert_eq!(settings.llm.port, 11434);
        assert_eq!(settings.llm.max_attempts, 3);
        assert_eq!(settings.forecast.periods, 30);
        assert_eq!(settings.forecast.granularity, Granularity::Daily);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[extractor]
strategy = "llm"
overlap = "longest"
default_start = "2019-01-01"

[llm]
model = "qwen3:8b"
max_attempts = 5

[forecast]
granularity = "monthly"
periods = 6
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.extractor.strategy, Strategy::Llm);
        assert_eq!(settings.extractor.overlap, OverlapPolicy::Longest);
        assert_eq!(
            settings.extractor.default_start,
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()
        );
        assert_eq!(settings.extractor.default_end.to_string(), DEFAULT_END);
        assert_eq!(settings.llm.model, "qwen3:8b");
        assert_eq!(settings.llm.max_attempts, 5);
        assert_eq!(settings.llm.host, DEFAULT_LLM_HOST);
        assert_eq!(settings.forecast.granularity, Granularity::Monthly);
        assert_eq!(settings.forecast.periods, 6);
        assert_eq!(settings.data.users, PathBuf::from(DEFAULT_USERS));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[extractor]\nstrategy = \"telepathy\"").unwrap();
        assert!(Settings::from_file(file.path()).is_err());
    }
}
