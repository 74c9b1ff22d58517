//! Configuration discovery and loading
//!
//! Discovery hierarchy:
//! 1. Current directory: ./foreman.toml or ./.foreman/config.toml
//! 2. User config: ~/.foreman/config.toml
//! 3. System config: /etc/foreman/config.toml
//! 4. Built-in defaults

use crate::config::EngineConfig;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return EngineConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(EngineConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("foreman.toml"),
            PathBuf::from(".foreman/config.toml"),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".foreman/config.toml"));
        }
        candidates.push(PathBuf::from("/etc/foreman/config.toml"));
        candidates
    }

    /// Print the discovery hierarchy and which candidate, if any, exists.
    pub fn show_discovery_info() {
        println!("Configuration discovery hierarchy:");
        for candidate in Self::get_config_candidates() {
            let marker = if candidate.is_file() { "found" } else { "absent" };
            println!("  [{marker}] {}", candidate.display());
        }
        match Self::find_config_file() {
            Some(path) => println!("Active: {}", path.display()),
            None => println!("Active: built-in defaults"),
        }
    }
}
