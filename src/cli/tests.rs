//! Unit tests for CLI commands

use crate::cli::{load_settings, Cli, Commands};
use clap::Parser;
use std::io::Write;

#[test]
fn test_serve_defaults() {
    let cli = Cli::try_parse_from(["brrtweb", "serve", "--dir", "public"]).unwrap();
    match cli.command {
        Commands::Serve {
            dir,
            default_document,
            addr,
            log_json,
            ..
        } => {
            assert_eq!(dir.to_string_lossy(), "public");
            assert_eq!(default_document, "index.html");
            assert_eq!(addr, "127.0.0.1:8080");
            assert!(!log_json);
        }
        other => panic!("Expected Serve command, got {other:?}"),
    }
}

#[test]
fn test_serve_with_flags() {
    let cli = Cli::try_parse_from([
        "brrtweb",
        "serve",
        "--dir",
        "site",
        "--default-document",
        "home.html",
        "--addr",
        "0.0.0.0:9000",
        "--config",
        "settings.toml",
        "--log-json",
    ])
    .unwrap();
    match cli.command {
        Commands::Serve {
            default_document,
            addr,
            config,
            log_json,
            ..
        } => {
            assert_eq!(default_document, "home.html");
            assert_eq!(addr, "0.0.0.0:9000");
            assert_eq!(config.unwrap().to_string_lossy(), "settings.toml");
            assert!(log_json);
        }
        other => panic!("Expected Serve command, got {other:?}"),
    }
}

#[test]
fn test_all_commands_parse() {
    let commands = vec![
        vec!["brrtweb", "version"],
        vec!["brrtweb", "serve", "--dir", "."],
    ];
    for args in commands {
        let cli = Cli::try_parse_from(&args);
        assert!(cli.is_ok(), "Failed to parse command: {:?}", args);
    }
    assert!(Cli::try_parse_from(["brrtweb", "serve"]).is_err());
}

#[test]
fn test_load_settings_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "debug = false").unwrap();
    let settings = load_settings(Some(&file.path().to_path_buf())).unwrap();
    assert!(!settings.debug);
}
