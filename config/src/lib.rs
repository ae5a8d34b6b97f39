// SPDX-License-Identifier: MPL-2.0-only

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

pub const NAME: &str = "telescreen";
pub const CONFIG_FILE: &str = "config.ron";
/// Environment variable overriding the config file location.
pub const PATH_ENV: &str = "TELESCREEN_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// Size of the display surface in pixels
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Player configuration, read from `config.ron`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Setters)]
#[serde(deny_unknown_fields, default)]
#[must_use]
pub struct Config {
    /// identity of this device, as known to the controller
    #[setters(into)]
    pub machine: String,
    /// plan file installed whenever it changes on disk
    #[setters(into)]
    pub plan_path: PathBuf,
    /// seconds between periodic scheduling passes
    pub tick_interval: u64,
    /// lookahead in seconds; tasks starting later stay queued
    pub horizon: u64,
    /// how often media pipelines are polled while items are live
    pub media_poll_ms: u64,
    /// size used to compute layout regions
    pub screen: ScreenSize,
    /// run without media pipelines, only logging playback
    pub headless: bool,
    /// number of displays switched on and off with the plan
    pub displays: usize,
    /// tracing filter used when `RUST_LOG` is unset
    #[setters(into)]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            machine: String::from(NAME),
            plan_path: default_plan_path(),
            tick_interval: 5,
            horizon: 60,
            media_poll_ms: 200,
            screen: ScreenSize::default(),
            headless: false,
            displays: 1,
            log_filter: String::from("info"),
        }
    }
}

impl Config {
    /// Location of the config file, if one can be determined.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        dirs::config_dir().map(|dir| dir.join(NAME).join(CONFIG_FILE))
    }

    /// Load the config from its default location.
    ///
    /// A missing file is not an error and yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, Error> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load the config stored at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid RON.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&contents).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(contents)
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_interval.max(1))
    }

    #[must_use]
    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.horizon)
    }

    #[must_use]
    pub fn media_poll(&self) -> Duration {
        Duration::from_millis(self.media_poll_ms.max(10))
    }
}

fn default_plan_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(NAME)
        .join("plan.json")
}
