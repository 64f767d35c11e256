use serde::Deserialize;

use crate::error::ReconError;
use crate::geo::RECONCILE_TOLERANCE;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine settings. Unknown tables (e.g. `[lookup]`, read by the CLI) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    /// Written to `last_modified_by` whenever a row changes.
    #[serde(default)]
    pub editor: Option<String>,
    /// Slate priority after the row's own language.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default)]
    pub geo: GeoConfig,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            editor: None,
            languages: default_languages(),
            geo: GeoConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Geo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    /// Per-axis tolerance, in degrees, between a local and a knowledge-base coordinate.
    #[serde(default = "default_tolerance")]
    pub tolerance_degrees: f64,
}

fn default_tolerance() -> f64 {
    RECONCILE_TOLERANCE
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            tolerance_degrees: default_tolerance(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if let Some(editor) = &self.editor {
            if editor.trim().is_empty() {
                return Err(ReconError::ConfigValidation("editor must not be empty".into()));
            }
        }

        if self.languages.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one language is required".into(),
            ));
        }

        for lang in &self.languages {
            let valid = !lang.is_empty()
                && lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
            if !valid {
                return Err(ReconError::ConfigValidation(format!(
                    "invalid language tag '{lang}'"
                )));
            }
        }

        let tol = self.geo.tolerance_degrees;
        if !(tol > 0.0 && tol <= 90.0) {
            return Err(ReconError::ConfigValidation(format!(
                "geo.tolerance_degrees must be in (0, 90], got {tol}"
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
