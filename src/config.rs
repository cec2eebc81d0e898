use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "opdpost.toml";

/// Settings read from an optional TOML file.
///
/// ```toml
/// database = "${HOME}/ledger.db"
///
/// [generator]
/// cash_account = "101100"
/// journal = "SAJ"
/// only_confirmed = true
/// include_draft = false
/// commit_every = 100
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub database: Option<String>,
    #[serde(default)]
    pub generator: GeneratorSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorSettings {
    pub cash_account: Option<String>,
    pub journal: Option<String>,
    pub only_confirmed: Option<bool>,
    pub include_draft: Option<bool>,
    pub commit_every: Option<usize>,
}

impl Settings {
    /// Load settings from `path`, or from `opdpost.toml` if it exists.
    /// With neither, built-in defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);
        toml::from_str(&content).context("Failed to parse TOML")
    }
}

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

/// Replace `${VAR}` with the environment value; unknown variables are left as-is.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR.replace_all(content, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
