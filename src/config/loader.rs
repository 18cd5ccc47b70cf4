use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::repository::{AuthToken, FeatureRoutes};
use crate::tracker::Schedule;

/// The four timed features sharing the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Dig,
    Train,
    Explore,
    Quest,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Feature::Dig => "dig",
            Feature::Train => "train",
            Feature::Explore => "explore",
            Feature::Quest => "quest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub dig: FeatureRoutes,
    pub train: FeatureRoutes,
    pub explore: FeatureRoutes,
    pub quest: FeatureRoutes,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            dig: FeatureRoutes::conventional("dig-tasks"),
            train: FeatureRoutes::conventional("training"),
            explore: FeatureRoutes::conventional("explorations"),
            quest: FeatureRoutes::conventional("quests"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub tick_interval_ms: u64,
    pub poll_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            poll_interval_secs: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn to_schedule(&self) -> Schedule {
        Schedule {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default = "default_completing_soon_secs")]
    pub completing_soon_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_completing_soon_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            auth_token: None,
            schedule: ScheduleConfig::default(),
            http: HttpConfig::default(),
            features: FeaturesConfig::default(),
            completing_soon_secs: default_completing_soon_secs(),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path.unwrap_or_else(Self::default_config_path);

        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn default_config_path() -> PathBuf {
        if let Some(config_path) = std::env::var_os("VTASK_CONFIG") {
            PathBuf::from(config_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vtask")
                .join("config.yaml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.tick_interval_ms == 0 {
            bail!("schedule.tick_interval_ms must be greater than zero");
        }
        if self.schedule.poll_interval_secs == 0 {
            bail!("schedule.poll_interval_secs must be greater than zero");
        }
        if self.http.request_timeout_secs == 0 {
            bail!("http.request_timeout_secs must be greater than zero");
        }
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        Ok(())
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url;
        }
        self
    }

    /// `VTASK_TOKEN` wins over the file so credentials can stay out of it.
    pub fn auth_token(&self) -> AuthToken {
        std::env::var("VTASK_TOKEN")
            .ok()
            .or_else(|| self.auth_token.clone())
            .map(AuthToken::new)
            .unwrap_or_default()
    }

    pub fn routes(&self, feature: Feature) -> &FeatureRoutes {
        match feature {
            Feature::Dig => &self.features.dig,
            Feature::Train => &self.features.train,
            Feature::Explore => &self.features.explore,
            Feature::Quest => &self.features.quest,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }
}
