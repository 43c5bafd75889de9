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

use ipnet::IpNet;
use pretty_assertions::assert_eq;

use crate::{
    config::{Config, ConfigError, FailureLevel, CONFIG},
    lifecycle::SuiteConfig,
};

#[test]
fn test_config_is_loaded() {
    assert_eq!(CONFIG.tenant.id.as_deref(), Some("admin"));
    assert!(CONFIG.baseline.enabled);
    assert_eq!(CONFIG.baseline.topology.network_name, "net");
    assert_eq!(
        CONFIG.baseline.topology.cidr,
        "172.16.1.0/24".parse::<IpNet>().unwrap()
    );
    assert_eq!(CONFIG.teardown.failure_level, FailureLevel::Warn);
}

#[test]
fn suite_config_from_file() {
    let config = SuiteConfig::from_config();
    assert_eq!(config.tenant.as_deref(), Some("admin"));
    assert_eq!(
        config.baseline.as_ref().map(|b| b.router_name.as_str()),
        Some("router")
    );
    assert_eq!(config.failure_level, log::Level::Warn);
}

#[test]
fn defaults() {
    let config = Config::parse(
        r#"
        [baseline]
        enabled = false
        network_name = "private"
        cidr = "10.0.0.0/24"
        public_network_name = "public"
        public_cidr = "2001:db8::/64"
        router_name = "gw"
        "#,
    )
    .unwrap();
    assert_eq!(config.tenant.id, None);
    assert_eq!(config.teardown.failure_level, FailureLevel::Error);

    let suite = SuiteConfig::from(&config);
    assert_eq!(suite.baseline, None);
    assert_eq!(suite.failure_level, log::Level::Error);
}

#[test]
fn invalid_config() {
    let missing_baseline = Config::parse("[tenant]\nid = \"admin\"\n");
    assert!(matches!(missing_baseline, Err(ConfigError::Parse(_))));

    let bad_cidr = Config::parse(
        r#"
        [baseline]
        enabled = true
        network_name = "private"
        cidr = "10.0.0.0/33"
        public_network_name = "public"
        public_cidr = "200.0.0.0/16"
        router_name = "gw"
        "#,
    );
    assert!(bad_cidr.is_err());

    assert!(matches!(
        Config::load("/nonexistent/directory"),
        Err(ConfigError::Io { .. })
    ));
}
