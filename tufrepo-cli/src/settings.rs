//! The small TOML settings file a signing-event repository carries for its version-control
//! driver. The engine has no notion of `push-remote`/`pull-remote`; this shell reads them purely
//! to pass them through to its own output.

use crate::error::{self, Result};
use serde::Deserialize;
use snafu::ResultExt;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RepoSettings {
    #[serde(rename = "push-remote")]
    pub push_remote: Option<String>,
    #[serde(rename = "pull-remote")]
    pub pull_remote: Option<String>,
}

impl RepoSettings {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).context(error::SettingsReadSnafu { path })?;
        toml::from_str(&text).context(error::SettingsParseSnafu { path })
    }
}
