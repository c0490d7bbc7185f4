//! Layered configuration for voxport.
//!
//! Sources, from lowest to highest precedence:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. `config.toml`, `config.yaml` and `config.json` in the platform
//!    configuration directory (e.g. `~/.config/voxport/` on Linux).
//! 3. An explicitly requested file (TOML, YAML or JSON by extension).
//! 4. Environment variables prefixed with `VOXPORT_`, nested with `__`,
//!    e.g. `VOXPORT_EXPORT__SAMPLE_RATE=16000`.
//!
//! Command-line flags are applied on top by the binary.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use voxport_transcode::{DEFAULT_ARGS, DEFAULT_PROGRAM, DEFAULT_SAMPLE_RATE};

const ENV_PREFIX: &str = "VOXPORT_";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub export: ExportConfig,
    pub transcoder: TranscoderConfig,
}

/// Where the sharded databases live and how their files are named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory searched (recursively) for shards.
    pub root: Option<PathBuf>,
    /// Message metadata shards, e.g. `MSG0.db`.
    pub metadata_prefix: String,
    /// Media blob shards, e.g. `MediaMSG0.db`.
    pub media_prefix: String,
    /// Contact shards used to resolve an alias to an account. When unset the
    /// account is used exactly as given.
    pub contacts_prefix: Option<String>,
    /// Shard file extension, without the dot.
    pub extension: String,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            root: None,
            metadata_prefix: "MSG".to_string(),
            media_prefix: "MediaMSG".to_string(),
            contacts_prefix: Some("MicroMsg".to_string()),
            extension: "db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output files go to `<destination>/<account>/`.
    pub destination: PathBuf,
    pub sample_rate: u32,
    /// Output file extension, without the dot.
    pub format: String,
    /// Open the output directory when at least one file was exported.
    pub reveal: bool,
}
impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("."),
            sample_rate: DEFAULT_SAMPLE_RATE,
            format: "mp3".to_string(),
            reveal: true,
        }
    }
}

/// External program used as the transcoder. See
/// [`CommandTranscoder`](voxport_transcode::CommandTranscoder) for the
/// argument placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub program: String,
    pub args: Vec<String>,
}
impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load from every source, reading the platform configuration directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "voxport");
        Self::from_sources(dirs.as_ref().map(ProjectDirs::config_dir), explicit)
    }

    /// Load from defaults, an optional configuration directory, an optional
    /// explicit file and the environment.
    pub fn from_sources(config_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = config_dir {
            tracing::debug!(dir = %dir.display(), "Reading configuration directory");
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        if let Some(path) = explicit {
            // Figment silently skips missing files; an explicit one must exist.
            if !path.is_file() {
                exn::bail!(ErrorKind::MissingFile(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, half way through a run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(exn::Exn::from(ErrorKind::Invalid(reason.to_string())));
        let db = &self.database;
        if db.metadata_prefix.is_empty() || db.media_prefix.is_empty() {
            return invalid("shard prefixes must not be empty");
        }
        if db.contacts_prefix.as_ref().is_some_and(String::is_empty) {
            return invalid("contacts prefix must not be empty when set");
        }
        if db.extension.is_empty() {
            return invalid("shard extension must not be empty");
        }
        if self.export.sample_rate == 0 {
            return invalid("sample rate must be greater than zero");
        }
        if self.export.format.is_empty() || self.export.format.contains(['/', '\\', '.']) {
            return invalid("output format must be a bare file extension");
        }
        if self.transcoder.program.is_empty() {
            return invalid("transcoder program must not be empty");
        }
        if !self.transcoder.args.iter().any(|a| a.contains("{output}")) {
            return invalid("transcoder arguments must contain `{output}`");
        }
        Ok(())
    }
}
