// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration directory that drives a setup run,
//! and the [`Environment`] value that carries everything a run needs to know
//! about the machine it is running on.
//!
//! # Configuration Directory
//!
//! The configuration directory is a flat directory of named files. Each setup
//! step that needs input has its own JSON file. If a step's file is missing,
//! then that step is simply disabled for the run:
//!
//! | File                     | Step     |
//! |--------------------------|----------|
//! | `apps-<platform>.json`   | apps     |
//! | `fonts.json`             | fonts    |
//! | `git.json`               | git      |
//! | `ssh.json`               | ssh      |
//! | `cursor-settings.json`   | cursor   |
//! | `repos.json`             | repos    |
//!
//! Devstrap's own behaviour can be tuned through an optional `settings.toml`
//! file in the same directory. The configuration directory is never written
//! to.

use crate::step::{Flags, StepName};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    path::{Component, Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Default number of concurrent workers for downloads and package queries.
pub const DEFAULT_JOBS: usize = 8;

/// Tool settings file name.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Font listing file name.
pub const FONTS_FILE: &str = "fonts.json";

/// Git configuration file name.
pub const GIT_FILE: &str = "git.json";

/// SSH key configuration file name.
pub const SSH_FILE: &str = "ssh.json";

/// Cursor editor settings file name.
pub const CURSOR_FILE: &str = "cursor-settings.json";

/// Repository listing file name.
pub const REPOS_FILE: &str = "repos.json";

/// Application listing file name for target platform.
pub fn apps_file(platform: Platform) -> String {
    format!("apps-{platform}.json")
}

/// Target platform of a setup run.
///
/// Each platform maps onto exactly one package manager, and owns its own
/// run state and rollback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    #[serde(rename = "macos")]
    MacOs,
    Ubuntu,
    Debian,
    Fedora,
    Arch,
}

impl Platform {
    /// All supported platforms.
    pub const ALL: [Platform; 6] = [
        Self::Windows,
        Self::MacOs,
        Self::Ubuntu,
        Self::Debian,
        Self::Fedora,
        Self::Arch,
    ];

    /// Name of platform as used in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Ubuntu => "ubuntu",
            Self::Debian => "debian",
            Self::Fedora => "fedora",
            Self::Arch => "arch",
        }
    }

    /// Detect platform of current machine.
    ///
    /// Linux distributions are identified through `/etc/os-release`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if os-release cannot be read.
    /// - Return [`ConfigError::UnknownPlatform`] if platform is unsupported.
    pub fn detect() -> Result<Self> {
        match std::env::consts::OS {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            "linux" => {
                let path = Path::new("/etc/os-release");
                let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                    source,
                    path: path.into(),
                })?;
                Self::from_os_release(&content)
            }
            other => Err(ConfigError::UnknownPlatform(other.into())),
        }
    }

    /// Identify Linux distribution from os-release content.
    ///
    /// Tries `ID` first, then every entry of `ID_LIKE`, so derivatives like
    /// Pop!_OS or Manjaro resolve to the distribution they are based on.
    pub fn from_os_release(content: &str) -> Result<Self> {
        let mut id = None;
        let mut id_like = Vec::new();
        for line in content.lines() {
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"');
                match key.trim() {
                    "ID" => id = Some(value.to_string()),
                    "ID_LIKE" => id_like = value.split_whitespace().map(str::to_owned).collect(),
                    _ => {}
                }
            }
        }

        id.iter()
            .chain(id_like.iter())
            .find_map(|candidate| candidate.parse::<Platform>().ok())
            .filter(|platform| !matches!(platform, Self::Windows | Self::MacOs))
            .ok_or_else(|| ConfigError::UnknownPlatform(id.clone().unwrap_or_default()))
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|platform| platform.as_str() == data.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnknownPlatform(data.into()))
    }
}

impl Display for Platform {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Tool settings layout.
///
/// Read from `settings.toml` at the top of the configuration directory.
/// Every field is optional, and command-line flags take precedence.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Settings that shape a setup run.
    #[serde(default)]
    pub run: RunSettings,
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Run settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSettings {
    /// Abort run on first failed step.
    pub fail_fast: bool,

    /// Number of concurrent workers for downloads and package queries.
    pub jobs: usize,

    /// Keep rollback session even after a clean run.
    pub keep_rollback: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            fail_fast: false,
            jobs: DEFAULT_JOBS,
            keep_rollback: false,
        }
    }
}

/// Application listing for one platform.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppsConfig {
    /// Package identifiers to install through the platform package manager.
    pub packages: Vec<String>,

    /// Shell commands to run once before installing packages.
    pub pre_install: Vec<String>,

    /// Shell commands to run once after installing packages.
    pub post_install: Vec<String>,
}

/// Font listing.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FontsConfig {
    pub fonts: Vec<FontEntry>,
}

/// Single downloadable font file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct FontEntry {
    /// Human readable font name.
    pub name: String,

    /// Direct URL to font file.
    pub url: String,

    /// Expected SHA-256 digest of font file in lowercase hex.
    pub sha256: Option<String>,
}

/// Global Git configuration entries, e.g., `user.name` to `John Doe`.
pub type GitConfig = BTreeMap<String, String>;

/// SSH key generation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    /// Email used as key comment.
    pub email: String,

    /// Key algorithm handed to ssh-keygen.
    #[serde(default = "default_key_type")]
    pub key_type: String,

    /// Private key location. Defaults to `~/.ssh/id_<key_type>`.
    pub key_path: Option<String>,
}

impl SshConfig {
    /// Resolve private key path with shell expansion.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if expansion fails.
    pub fn key_path(&self, home: &Path) -> Result<PathBuf> {
        match &self.key_path {
            Some(path) => expand_path(path),
            None => Ok(home.join(".ssh").join(format!("id_{}", self.key_type))),
        }
    }
}

fn default_key_type() -> String {
    "ed25519".into()
}

/// Repository listing.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ReposConfig {
    /// Directory to clone repositories into.
    pub directory: String,

    #[serde(default)]
    pub repositories: Vec<RepoEntry>,
}

/// Single repository to clone.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RepoEntry {
    /// Remote URL to clone from.
    pub url: String,

    /// Directory name to clone into. Derived from URL when absent.
    pub name: Option<String>,
}

impl RepoEntry {
    /// Directory name for repository clone.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidRepoName`] if name is not a single plain
    ///   path component, e.g., `..`, `a/b`, or an absolute path.
    pub fn dir_name(&self) -> Result<String> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .url
                .trim_end_matches('/')
                .rsplit(['/', ':'])
                .next()
                .unwrap_or(self.url.as_str())
                .trim_end_matches(".git")
                .to_string(),
        };

        let mut components = Path::new(&name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name.as_str() => Ok(name),
            _ => Err(ConfigError::InvalidRepoName(name)),
        }
    }
}

/// Perform shell expansion on a configured path.
///
/// # Errors
///
/// - Return [`ConfigError::ShellExpansion`] if a variable cannot be resolved.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(path)?.into_owned()))
}

/// Everything a setup run needs to know about the machine and invocation.
///
/// Built once at process start, and handed explicitly to the step registry,
/// the orchestrator, and every step action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Target platform.
    pub platform: Platform,

    /// Directory holding configuration files.
    pub config_dir: PathBuf,

    /// Directory holding run state, rollback sessions, and backups.
    pub state_dir: PathBuf,

    /// User's home directory.
    pub home_dir: PathBuf,

    /// Step selection and run mode flags.
    pub flags: Flags,

    /// Number of concurrent workers for pooled work.
    pub jobs: usize,
}

impl Environment {
    /// Construct new environment with default flags.
    pub fn new(
        platform: Platform,
        config_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        home_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform,
            config_dir: config_dir.into(),
            state_dir: state_dir.into(),
            home_dir: home_dir.into(),
            flags: Flags::default(),
            jobs: DEFAULT_JOBS,
        }
    }

    /// Replace step selection and run mode flags.
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Replace worker count. Zero is bumped to one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Check that configuration directory is usable.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingConfigDir`] if directory does not exist.
    pub fn ensure_config_dir(&self) -> Result<()> {
        if self.config_dir.is_dir() {
            Ok(())
        } else {
            Err(ConfigError::MissingConfigDir(self.config_dir.clone()))
        }
    }

    /// Path to named file in configuration directory.
    pub fn config_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.config_dir.join(name)
    }

    /// Configuration file associated with a step, if the step needs one.
    pub fn config_file_for(&self, step: StepName) -> Option<String> {
        match step {
            StepName::Validate | StepName::Backup | StepName::DevEnv => None,
            StepName::Fonts => Some(FONTS_FILE.into()),
            StepName::Apps => Some(apps_file(self.platform)),
            StepName::Git => Some(GIT_FILE.into()),
            StepName::Ssh => Some(SSH_FILE.into()),
            StepName::Cursor => Some(CURSOR_FILE.into()),
            StepName::Repos => Some(REPOS_FILE.into()),
        }
    }

    /// Load and parse named JSON file from configuration directory.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if file cannot be read.
    /// - Return [`ConfigError::Json`] if file is not valid for `T`.
    pub fn load_json<T: DeserializeOwned>(&self, name: impl AsRef<Path>) -> Result<T> {
        let path = self.config_path(name);
        debug!("load config file {:?}", path.display());
        let data = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            source,
            path: path.clone(),
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Json { source, path })
    }

    /// Load tool settings, falling back to defaults when file is absent.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid TOML.
    pub fn load_settings(&self) -> Result<Settings> {
        let path = self.config_path(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }

        fs::read_to_string(&path)
            .map_err(|source| ConfigError::ReadFile { source, path })?
            .parse()
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize TOML settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize TOML settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration file.
    #[error("invalid configuration file {:?}", path.display())]
    Json {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read {:?}", path.display())]
    ReadFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to perform shell expansion on configured path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Configuration directory does not exist.
    #[error("configuration directory {:?} does not exist", .0.display())]
    MissingConfigDir(PathBuf),

    /// Repository clone name escapes clone directory.
    #[error("repository name {0:?} must be a single directory name")]
    InvalidRepoName(String),

    /// Platform name not supported.
    #[error("unsupported platform {0:?}")]
    UnknownPlatform(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
