//! # Configuration
//!
//! Process-wide, read-mostly settings consumed at cookie-construction and
//! error-rendering time.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults (`debug: true`, no cookie domain, non-secure cookies)
//! 2. A YAML or TOML file, chosen by extension ([`Settings::load`])
//! 3. Environment variables ([`Settings::apply_env`])
//!
//! ## Environment Variables
//!
//! - `BRRTWEB_DEBUG`: `true`/`false`/`1`/`0`; controls diagnostic error bodies
//! - `BRRTWEB_COOKIE_DOMAIN`: default `Domain` for outgoing cookies
//! - `BRRTWEB_STACK_SIZE`: coroutine stack size for the HTTP transport,
//!   decimal or `0x` hexadecimal (default `0x4000`)
//!
//! ## Usage
//!
//! ```rust
//! use brrtweb::config::{self, Settings};
//!
//! let mut settings = Settings::default();
//! settings.debug = false;
//! config::configure(settings);
//! assert!(!config::settings().debug);
//! ```

use anyhow::Context;
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_STACK_SIZE: usize = 0x4000;

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Include diagnostic detail (error chains) in error bodies
    pub debug: bool,
    /// Default `Domain` attribute for outgoing cookies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Cookie attribute defaults
    pub cookie: CookieSettings,
    /// Coroutine stack size in bytes for the HTTP transport
    pub stack_size: usize,
}

/// Default attributes for outgoing cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub http_only: bool,
    pub secure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            domain: None,
            cookie: CookieSettings::default(),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from a `.yaml`/`.yml` or `.toml` file.
    ///
    /// Missing keys keep their defaults. Environment overrides are NOT applied;
    /// call [`Settings::apply_env`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown extension,
    /// or fails to parse.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> anyhow::Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(contents)
                .with_context(|| format!("Failed to parse settings: {}", path.display())),
            Some("toml") => toml::from_str(contents)
                .with_context(|| format!("Failed to parse settings: {}", path.display())),
            other => anyhow::bail!(
                "Unsupported settings format {:?}: {}",
                other.unwrap_or(""),
                path.display()
            ),
        }
    }

    /// Apply `BRRTWEB_*` environment overrides.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Ok(val) = env::var("BRRTWEB_DEBUG") {
            if let Some(debug) = parse_bool(&val) {
                self.debug = debug;
            }
        }
        if let Ok(domain) = env::var("BRRTWEB_COOKIE_DOMAIN") {
            self.domain = (!domain.is_empty()).then_some(domain);
        }
        if let Ok(val) = env::var("BRRTWEB_STACK_SIZE") {
            self.stack_size = parse_size(&val).unwrap_or(DEFAULT_STACK_SIZE);
        }
        self
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_size(val: &str) -> Option<usize> {
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

static SETTINGS: Lazy<ArcSwap<Settings>> = Lazy::new(|| ArcSwap::from_pointee(Settings::default()));

/// Snapshot of the current process-wide settings.
#[must_use]
pub fn settings() -> Arc<Settings> {
    SETTINGS.load_full()
}

/// Replace the process-wide settings.
///
/// Requests already in flight keep the snapshot they started with.
pub fn configure(settings: Settings) {
    SETTINGS.store(Arc::new(settings));
}
