//! Build network provisioning
//!
//! Each job gets a fresh user-defined network. Subnets are picked from
//! `10.X.0.0/16` with the lowest free `X` starting at [`SUBNET_FLOOR`],
//! looking only at networks that carry the marker label.

use crate::driver::ContainerDriver;
use crate::error::{DriverError, DriverResult};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Lowest second octet handed out
pub const SUBNET_FLOOR: u8 = 100;

/// Highest second octet handed out
pub const SUBNET_CEILING: u8 = 254;

/// Second octet of a `10.X.0.0/16` subnet
pub fn subnet_octet(subnet: &str) -> Option<u8> {
    let address = subnet.strip_suffix("/16")?;
    let mut octets = address.split('.');
    match (octets.next(), octets.next(), octets.next(), octets.next(), octets.next()) {
        (Some("10"), Some(x), Some("0"), Some("0"), None) => x.parse().ok(),
        _ => None,
    }
}

/// Lowest free `10.X.0.0/16` not in `used`
pub fn allocate_subnet(used: &BTreeSet<u8>) -> DriverResult<String> {
    (SUBNET_FLOOR..=SUBNET_CEILING)
        .find(|octet| !used.contains(octet))
        .map(|octet| format!("10.{octet}.0.0/16"))
        .ok_or(DriverError::SubnetsExhausted {
            floor: SUBNET_FLOOR,
            ceiling: SUBNET_CEILING,
        })
}

/// Creates and removes the per-job network
#[derive(Debug, Clone)]
pub struct NetworkProvisioner {
    driver: ContainerDriver,
}

impl NetworkProvisioner {
    /// Provisioner issuing commands through `driver`
    pub fn new(driver: ContainerDriver) -> Self {
        Self { driver }
    }

    /// Subnets in use by tagged networks
    async fn used_octets(&self) -> DriverResult<BTreeSet<u8>> {
        let mut used = BTreeSet::new();
        for id in self.driver.list_tagged_network_ids().await? {
            let details = self.driver.inspect_network(&id).await?;
            if let Some(octet) = details.subnet.as_deref().and_then(subnet_octet) {
                debug!("Network {} uses 10.{}.0.0/16", details.name, octet);
                let _ = used.insert(octet);
            }
        }
        Ok(used)
    }

    /// Drop any network called `name` and create it again on a free subnet
    ///
    /// Returns the allocated subnet.
    pub async fn recreate(&self, name: &str) -> DriverResult<String> {
        if let Err(e) = self.driver.remove_network(name).await {
            debug!("No previous network {} to remove: {}", name, e);
        }

        let subnet = allocate_subnet(&self.used_octets().await?)?;
        self.driver.create_network(name, &subnet).await?;
        info!("Created network {} on {}", name, subnet);
        Ok(subnet)
    }

    /// Remove the network, logging instead of failing
    pub async fn release(&self, name: &str) {
        match self.driver.remove_network(name).await {
            Ok(()) => debug!("Removed network {}", name),
            Err(e) => warn!("Failed to remove network {}: {}", name, e),
        }
    }
}
