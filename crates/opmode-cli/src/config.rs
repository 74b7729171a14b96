//! Session profile – reads/writes `~/.opmode/session.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use opmode_runtime::RunPlan;
use opmode_types::SessionMeta;

pub const FLAGS_VAR: &str = "OPMODE_FLAGS";
pub const LOOPS_VAR: &str = "OPMODE_LOOPS";
pub const INIT_LOOPS_VAR: &str = "OPMODE_INIT_LOOPS";

/// The session the `opmode` binary runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Display name of the session (e.g. "TeleOp").
    #[serde(default = "default_name")]
    pub name: String,

    /// Flags attached to the session.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,

    /// Number of init-loop iterations before start.
    #[serde(default)]
    pub init_loops: usize,

    /// Number of main-loop iterations before stop.
    #[serde(default = "default_loops")]
    pub loops: usize,
}

fn default_name() -> String {
    "TeleOp".to_string()
}
fn default_flags() -> Vec<String> {
    vec!["teleop".to_string(), "red".to_string()]
}
fn default_loops() -> usize {
    3
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            name: default_name(),
            flags: default_flags(),
            init_loops: 0,
            loops: default_loops(),
        }
    }
}

impl SessionProfile {
    pub fn meta(&self) -> SessionMeta {
        self.flags
            .iter()
            .fold(SessionMeta::new(self.name.clone()), |meta, flag| {
                meta.with_flag(flag.as_str())
            })
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan {
            init_loops: self.init_loops,
            loops: self.loops,
        }
    }
}

/// Return the path to `~/.opmode/session.toml`.
pub fn profile_path() -> PathBuf {
    profile_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn profile_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".opmode").join("session.toml")
}

/// Load the profile from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<SessionProfile>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read profile at {}: {}", path.display(), e))?;
    let profile: SessionProfile =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse profile: {}", e))?;
    Ok(Some(profile))
}

/// Apply `OPMODE_*` environment variable overrides to `profile`.
///
/// | Variable | Profile field |
/// |---|---|
/// | `OPMODE_FLAGS` | `flags` (comma separated) |
/// | `OPMODE_LOOPS` | `loops` |
/// | `OPMODE_INIT_LOOPS` | `init_loops` |
pub fn apply_env_overrides(profile: &mut SessionProfile) {
    apply_overrides(profile, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(
    profile: &mut SessionProfile,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup(FLAGS_VAR) {
        profile.flags = v
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = lookup(LOOPS_VAR)
        && let Ok(n) = v.trim().parse::<usize>()
    {
        profile.loops = n;
    }
    if let Some(v) = lookup(INIT_LOOPS_VAR)
        && let Ok(n) = v.trim().parse::<usize>()
    {
        profile.init_loops = n;
    }
}

/// Save the profile to `path`, creating the parent directory if necessary.
pub fn save_to(profile: &SessionProfile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create profile directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(profile)
        .map_err(|e| format!("Failed to serialize profile: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write profile at {}: {}", path.display(), e))
}
