// Neutron Harness: Resource tracking and teardown for Neutron test topologies
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! This module contains the code for reading the configuration.
//!
//! The configuration is read from `$NEUTRON_HARNESS_CONFIG/config.toml`. When running the unit
//! tests, the configuration in `src/test/config` is used instead.

use std::path::{Path, PathBuf};

use ipnet::IpNet;
use lazy_static::lazy_static;
use serde::Deserialize;
use thiserror::Error;

macro_rules! expect {
    ($result:expr, $($rest:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!("Error: {}: {}\n", format!($($rest)*), e);
            panic!()
        })
    };
}

/// Environment variable that points to the configuration directory.
pub const CONFIG_ENV: &str = "NEUTRON_HARNESS_CONFIG";

lazy_static! {
    pub static ref CONFIG_DIR: String = {
        if cfg!(test) {
            concat!(env!("OUT_DIR"), "/.config").to_string()
        } else {
            expect!(
                std::env::var(CONFIG_ENV),
                "Environment variable '{}' is not defined!",
                CONFIG_ENV
            )
        }
    };
    pub static ref CONFIG: Config = expect!(
        Config::load(&*CONFIG_DIR),
        "Cannot load the configuration from '{}'",
        *CONFIG_DIR
    );
}

/// The harness configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tenant: TenantConfig,
    pub baseline: BaselineSection,
    #[serde(default)]
    pub teardown: TeardownConfig,
}

impl Config {
    /// Read `config.toml` from the given directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = dir.as_ref().join("config.toml");
        let config_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&config_str)
    }

    /// Parse the configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

/// Tenant (project) owning the resources created by the tests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfig {
    /// Tenant id attached to every created resource. If `None`, the control plane decides.
    pub id: Option<String>,
}

/// Whether and how to create the baseline topology before each test.
#[derive(Debug, Clone, Deserialize)]
pub struct BaselineSection {
    pub enabled: bool,
    #[serde(flatten)]
    pub topology: BaselineConfig,
}

/// Names and addresses of the baseline topology: a private network and subnet, a public (external)
/// network and subnet, and a router joining both.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BaselineConfig {
    pub network_name: String,
    pub cidr: IpNet,
    pub public_network_name: String,
    pub public_cidr: IpNet,
    pub router_name: String,
}

/// Configuration of the teardown.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeardownConfig {
    /// Log level for deletions that fail during teardown.
    #[serde(default)]
    pub failure_level: FailureLevel,
}

/// Log level used to report swallowed errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureLevel {
    #[default]
    Error,
    Warn,
}

impl From<FailureLevel> for log::Level {
    fn from(level: FailureLevel) -> Self {
        match level {
            FailureLevel::Error => log::Level::Error,
            FailureLevel::Warn => log::Level::Warn,
        }
    }
}

/// Error while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read the configuration file.
    #[error("Cannot read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Cannot parse the configuration file.
    #[error("Cannot parse the configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
