//! # CLI Module
//!
//! The `brrtweb` binary: serve a directory through the [`crate::static_files::Static`]
//! controller.
//!
//! ```bash
//! brrtweb serve --dir ./public --default-document index.html --addr 127.0.0.1:8080
//! brrtweb serve --dir ./public --config settings.yaml --log-json
//! brrtweb version
//! ```
//!
//! Logging honours `RUST_LOG`; settings files are YAML or TOML and are
//! overridden by the `BRRTWEB_*` environment variables.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{init_logging, load_settings, run_cli, Cli, Commands};
