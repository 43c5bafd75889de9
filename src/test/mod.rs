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

mod config;
mod registry;
mod teardown;

use neutron_api::ResourceId;

use crate::config::BaselineConfig;

pub(crate) fn id(s: &str) -> ResourceId {
    ResourceId::from(s)
}

pub(crate) fn baseline_config() -> BaselineConfig {
    BaselineConfig {
        network_name: "net".to_string(),
        cidr: "10.0.0.0/24".parse().unwrap(),
        public_network_name: "public".to_string(),
        public_cidr: "200.0.0.0/16".parse().unwrap(),
        router_name: "router".to_string(),
    }
}
