use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Locally persisted client state: the API token, the remote document id,
/// and the daily gate's last-run date. One small YAML file in the platform
/// data directory; everything else lives in the remote document.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub gist_id: Option<String>,
    #[serde(default)]
    pub last_run: Option<NaiveDate>,
}

/// Path of the state file. `DAYGIST_STATE` overrides the platform default.
pub fn state_path() -> Result<PathBuf> {
    if let Ok(path) = env::var("DAYGIST_STATE") {
        return Ok(PathBuf::from(path));
    }
    let dirs = ProjectDirs::from("", "", "daygist").context("locating data directory")?;
    Ok(dirs.data_dir().join("state.yml"))
}

pub fn load_state(path: &Path) -> Result<LocalState> {
    if path.exists() {
        let data =
            fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        let state = serde_yaml::from_str(&data).context("parsing state file")?;
        Ok(state)
    } else {
        Ok(LocalState::default())
    }
}

pub fn save_state(path: &Path, state: &LocalState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(state).context("serializing state")?;
    fs::write(path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}
