//! Configuration file discovery and parsing
//!
//! Searches for `.config/fontscope.yaml` walking up from the current
//! directory, unless `--config=PATH` names a file. Command-line flags win
//! over file values; anything left unset falls back to the library defaults.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result, eyre};
use facet::Facet;
use fontscope::ScanSettings;

const CONFIG_DIR: &str = ".config";
const CONFIG_FILE_YAML: &str = "fontscope.yaml";
const DEFAULT_BIND: &str = "127.0.0.1:8080";

pub const USAGE: &str = "\
Usage: fontscope [--config=PATH] [--bind=ADDR] [--acquisition=static|browser]

Options:
  --config=PATH        configuration file (default: nearest .config/fontscope.yaml)
  --bind=ADDR          listen address (default: 127.0.0.1:8080)
  --acquisition=MODE   static (plain HTTP) or browser (headless Chromium)
  -h, --help           print this help";

/// fontscope configuration from `.config/fontscope.yaml`
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct FontscopeConfig {
    /// Listen address, e.g. `127.0.0.1:8080`
    #[facet(default)]
    pub bind: Option<String>,

    /// `static` or `browser`
    #[facet(default)]
    pub acquisition: Option<String>,

    /// Timeout for loading the scanned page
    #[facet(default)]
    pub page_timeout_secs: Option<u64>,

    /// Timeout for each stylesheet or kit fetch
    #[facet(default)]
    pub stylesheet_timeout_secs: Option<u64>,

    /// Levels of `@import` to follow
    #[facet(default)]
    pub max_import_depth: Option<usize>,

    /// User-Agent for HTTP requests and the browser
    #[facet(default)]
    pub user_agent: Option<String>,

    /// Run Chromium with its sandbox (disable when running as root)
    #[facet(default)]
    pub browser_sandbox: Option<bool>,
}

/// How pages are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// One HTTP GET, markup and stylesheets parsed as text
    Static,
    /// Headless Chromium, computed styles observed
    Browser,
}

impl FromStr for AcquisitionMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "browser" | "dynamic" => Ok(Self::Browser),
            other => Err(eyre!(
                "unknown acquisition '{other}', expected 'static' or 'browser'"
            )),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub config: Option<Utf8PathBuf>,
    pub bind: Option<String>,
    pub acquisition: Option<String>,
    pub help: bool,
}

impl Overrides {
    /// Parse `--key=value` flags (program name already skipped).
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut overrides = Self::default();

        for arg in args {
            if let Some(value) = arg.strip_prefix("--config=") {
                overrides.config = Some(Utf8PathBuf::from(value));
            } else if let Some(value) = arg.strip_prefix("--bind=") {
                overrides.bind = Some(value.to_string());
            } else if let Some(value) = arg.strip_prefix("--acquisition=") {
                overrides.acquisition = Some(value.to_string());
            } else if arg == "--help" || arg == "-h" {
                overrides.help = true;
            } else {
                return Err(eyre!("unexpected argument '{arg}'\n\n{USAGE}"));
            }
        }

        Ok(overrides)
    }
}

/// Configuration with every value settled
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The file the values came from, if any
    pub source: Option<Utf8PathBuf>,
    pub bind: SocketAddr,
    pub acquisition: AcquisitionMode,
    pub browser_sandbox: bool,
    pub scan: ScanSettings,
}

impl ResolvedConfig {
    /// Load the config file (explicit or discovered) and apply overrides.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let source = match &overrides.config {
            Some(path) => {
                if !path.exists() {
                    return Err(eyre!("config file not found: {path}"));
                }
                Some(path.clone())
            }
            None => find_config_file()?,
        };

        let file = match &source {
            Some(path) => load_config_file(path)?,
            None => FontscopeConfig::default(),
        };

        Self::resolve(file, source, overrides)
    }

    /// Merge file values, overrides and defaults.
    pub fn resolve(
        file: FontscopeConfig,
        source: Option<Utf8PathBuf>,
        overrides: &Overrides,
    ) -> Result<Self> {
        let bind = overrides
            .bind
            .as_deref()
            .or(file.bind.as_deref())
            .unwrap_or(DEFAULT_BIND);
        let bind: SocketAddr = bind
            .parse()
            .map_err(|e| eyre!("invalid bind address '{bind}': {e}"))?;

        let acquisition = match overrides.acquisition.as_deref().or(file.acquisition.as_deref()) {
            Some(mode) => mode.parse()?,
            None => AcquisitionMode::Static,
        };

        let defaults = ScanSettings::default();
        let page_timeout = seconds("page_timeout_secs", file.page_timeout_secs)?
            .unwrap_or(defaults.page_timeout);
        let stylesheet_timeout = seconds("stylesheet_timeout_secs", file.stylesheet_timeout_secs)?
            .unwrap_or(defaults.stylesheet_timeout);

        let scan = ScanSettings {
            user_agent: file
                .user_agent
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            page_timeout,
            stylesheet_timeout,
            max_import_depth: file.max_import_depth.unwrap_or(defaults.max_import_depth),
        };

        Ok(Self {
            source,
            bind,
            acquisition,
            browser_sandbox: file.browser_sandbox.unwrap_or(true),
            scan,
        })
    }
}

fn seconds(key: &str, value: Option<u64>) -> Result<Option<Duration>> {
    match value {
        Some(0) => Err(eyre!("{key} must be greater than zero")),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

/// Parse configuration text. An empty file is an empty configuration.
pub fn parse_config(content: &str) -> Result<FontscopeConfig> {
    if content.trim().is_empty() {
        return Ok(FontscopeConfig::default());
    }
    facet_yaml::from_str(content).map_err(|e| eyre!("{e}"))
}

/// Search for `.config/fontscope.yaml` walking up from current directory
fn find_config_file() -> Result<Option<Utf8PathBuf>> {
    let cwd = env::current_dir()?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
        eyre!(
            "Current directory is not valid UTF-8: {}",
            e.as_path().display()
        )
    })?;

    let mut current = cwd.as_path();
    loop {
        let yaml_file = current.join(CONFIG_DIR).join(CONFIG_FILE_YAML);
        if yaml_file.exists() {
            return Ok(Some(yaml_file));
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}

fn load_config_file(path: &Utf8Path) -> Result<FontscopeConfig> {
    let content = fs::read_to_string(path)?;
    parse_config(&content).map_err(|e| eyre!("Failed to parse {path}: {e}"))
}
