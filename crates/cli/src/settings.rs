//! Config file discovery and the CLI-only `[lookup]` table.
//!
//! Resolution order for the config file:
//! 1. `--config <path>` (must exist)
//! 2. `./catalink.toml`
//! 3. `<config dir>/catalink/config.toml` (e.g. `~/.config/catalink/config.toml`)
//!
//! No file at all is fine: every setting has a default except the editor,
//! which may also come from `--editor` or `CATALINK_EDITOR`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use catalink_recon::ReconConfig;
use serde::Deserialize;

use crate::exit_codes::{EXIT_RECON_CONFIG, EXIT_USAGE};
use crate::lookup::{nominatim, wikidata};
use crate::CliError;

pub const LOCAL_CONFIG: &str = "catalink.toml";
pub const EDITOR_ENV: &str = "CATALINK_EDITOR";

// ---------------------------------------------------------------------------
// [lookup]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    pub sparql_endpoint: String,
    pub api_endpoint: String,
    pub geocoder_endpoint: String,
    pub timeout_secs: u64,
    /// Minimum spacing between requests to one service.
    pub request_interval_ms: u64,
    /// Pause after this many requests; 0 disables batching.
    pub batch_size: u32,
    pub batch_pause_secs: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            sparql_endpoint: wikidata::SPARQL_ENDPOINT.to_string(),
            api_endpoint: wikidata::API_ENDPOINT.to_string(),
            geocoder_endpoint: nominatim::GEOCODER_ENDPOINT.to_string(),
            timeout_secs: 30,
            request_interval_ms: 1000,
            batch_size: 25,
            batch_pause_secs: 5,
        }
    }
}

impl LookupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in [
            ("sparql_endpoint", &self.sparql_endpoint),
            ("api_endpoint", &self.api_endpoint),
            ("geocoder_endpoint", &self.geocoder_endpoint),
        ] {
            let url = url::Url::parse(value)
                .map_err(|e| format!("lookup.{key}: invalid URL '{value}': {e}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("lookup.{key}: expected http(s) URL, got '{value}'"));
            }
        }
        if self.timeout_secs == 0 {
            return Err("lookup.timeout_secs must be at least 1".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Whole file
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct LookupSection {
    #[serde(default)]
    lookup: LookupSettings,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub recon: ReconConfig,
    pub lookup: LookupSettings,
    /// File the settings came from, if any.
    pub source: Option<PathBuf>,
}

impl Settings {
    pub fn parse(text: &str) -> Result<(ReconConfig, LookupSettings), String> {
        let recon = ReconConfig::from_toml(text).map_err(|e| e.to_string())?;
        let section: LookupSection =
            toml::from_str(text).map_err(|e| format!("config parse error: {e}"))?;
        section.lookup.validate()?;
        Ok((recon, section.lookup))
    }

    /// Load from the resolved config file, or defaults when there is none.
    pub fn load(flag: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = resolve_config_path(flag, Path::new("."))? else {
            tracing::debug!("no config file; using defaults");
            return Ok(Self {
                recon: ReconConfig::default(),
                lookup: LookupSettings::default(),
                source: None,
            });
        };

        let text = std::fs::read_to_string(&path).map_err(|e| CliError {
            code: EXIT_RECON_CONFIG,
            message: format!("cannot read config {}: {e}", path.display()),
            hint: None,
        })?;
        let (recon, lookup) = Self::parse(&text).map_err(|message| CliError {
            code: EXIT_RECON_CONFIG,
            message: format!("{}: {message}", path.display()),
            hint: None,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");

        Ok(Self { recon, lookup, source: Some(path) })
    }
}

/// Pick the config file per the resolution order; `cwd` is where
/// `catalink.toml` is looked for.
pub fn resolve_config_path(flag: Option<&Path>, cwd: &Path) -> Result<Option<PathBuf>, CliError> {
    if let Some(path) = flag {
        if !path.is_file() {
            return Err(CliError {
                code: EXIT_USAGE,
                message: format!("config file not found: {}", path.display()),
                hint: None,
            });
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = cwd.join(LOCAL_CONFIG);
    if local.is_file() {
        return Ok(Some(local));
    }

    Ok(dirs::config_dir()
        .map(|dir| dir.join("catalink").join("config.toml"))
        .filter(|p| p.is_file()))
}

/// Editor for provenance stamps: `--editor` > config file > `CATALINK_EDITOR`.
pub fn resolve_editor(
    flag: Option<&str>,
    config: Option<&str>,
    env: Option<String>,
) -> Result<String, CliError> {
    flag.map(str::to_string)
        .or_else(|| config.map(str::to_string))
        .or(env)
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            CliError::args("no editor to stamp modified rows with").with_hint(format!(
                "pass --editor NAME, set `editor` in {LOCAL_CONFIG}, or set {EDITOR_ENV}"
            ))
        })
}
