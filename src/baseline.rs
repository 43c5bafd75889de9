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

//! Baseline topology, created before each test of a suite that asks for it: a private network with
//! a subnet, a public (external) network with a subnet, and a router that has its gateway on the
//! public network and an interface in the private subnet.

use neutron_api::{
    spec::{NetworkSpec, RouterSpec, SubnetSpec},
    ResourceId,
};

use crate::{config::BaselineConfig, registrar::Registrar, HarnessError};

/// Identifiers of the baseline resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub network: ResourceId,
    pub subnet: ResourceId,
    pub public_network: ResourceId,
    pub public_subnet: ResourceId,
    pub router: ResourceId,
}

impl Baseline {
    /// Create the baseline through the registrar, such that it is removed during teardown like
    /// everything else. If any step fails, the resources created before remain registered.
    pub fn provision(
        registrar: &mut Registrar<'_>,
        config: &BaselineConfig,
    ) -> Result<Self, HarnessError> {
        let network = registrar
            .create_network(&NetworkSpec::new(&config.network_name))?
            .id()?;
        let subnet = registrar
            .create_subnet(
                &SubnetSpec::new(network.clone(), config.cidr)
                    .named(format!("{}-subnet", config.network_name)),
            )?
            .id()?;
        let public_network = registrar
            .create_network(&NetworkSpec::external(&config.public_network_name))?
            .id()?;
        let public_subnet = registrar
            .create_subnet(
                &SubnetSpec::new(public_network.clone(), config.public_cidr)
                    .named(format!("{}-subnet", config.public_network_name)),
            )?
            .id()?;
        let router = registrar
            .create_router(
                &RouterSpec::new(&config.router_name)
                    .with_gateway(public_network.clone())
                    .with_subnets([subnet.clone()]),
            )?
            .id()?;

        log::debug!("[baseline] network {network}, public network {public_network}, router {router}");

        Ok(Self {
            network,
            subnet,
            public_network,
            public_subnet,
            router,
        })
    }
}
