/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Service advertisement.
//!
//! Display clients find the service on the local network by its service
//! type, so they need no pre-shared address.  The advertisement protocol
//! itself is platform code; the service only calls
//! [`ServiceAdvertiser::register`] after binding and
//! [`ServiceAdvertiser::deregister`] on shutdown.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SERVICE_NAME: &str = "EasyLap Service";
pub const DEFAULT_SERVICE_TYPE: &str = "_easylap._udp.local.";
pub const DEFAULT_SERVICE_VERSION: &str = "0.0.1";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot advertise {instance}: {reason}")]
    InvalidRecord { instance: String, reason: &'static str },
}

/// Record published for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_type: String,
    /// `"<name>.<service_type>"`
    pub instance_name: String,
    pub address: IpAddr,
    pub port: u16,
    pub properties: BTreeMap<String, String>,
}

impl ServiceInfo {
    pub fn new(name: &str, service_type: &str, version: &str, address: IpAddr, port: u16) -> Self {
        let properties = BTreeMap::from([
            ("service".to_string(), name.to_string()),
            ("version".to_string(), version.to_string()),
        ]);
        Self {
            service_type: service_type.to_string(),
            instance_name: format!("{name}.{service_type}"),
            address,
            port,
            properties,
        }
    }
}

#[async_trait]
pub trait ServiceAdvertiser: Send {
    async fn register(&mut self, info: &ServiceInfo) -> Result<(), DiscoveryError>;

    /// Withdraw the advertisement.  No-op if nothing is registered.
    async fn deregister(&mut self);
}

/// Advertiser that only records and logs the registration.
#[derive(Debug, Default)]
pub struct LogAdvertiser {
    registered: Option<ServiceInfo>,
}

impl LogAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Option<&ServiceInfo> {
        self.registered.as_ref()
    }
}

#[async_trait]
impl ServiceAdvertiser for LogAdvertiser {
    async fn register(&mut self, info: &ServiceInfo) -> Result<(), DiscoveryError> {
        if info.port == 0 {
            return Err(DiscoveryError::InvalidRecord {
                instance: info.instance_name.clone(),
                reason: "port 0",
            });
        }
        info!(
            service = %info.service_type,
            instance = %info.instance_name,
            address = %info.address,
            port = info.port,
            "Registering service"
        );
        self.registered = Some(info.clone());
        Ok(())
    }

    async fn deregister(&mut self) {
        if let Some(info) = self.registered.take() {
            info!(instance = %info.instance_name, "Service deregistered");
        }
    }
}

/// Outward-facing IPv4 address of this host, for the advertisement.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// route, and thus the source address.  Falls back to loopback.
pub fn local_ipv4() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
        socket.connect(SocketAddr::from(([10, 255, 255, 255], 1)))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            debug!(error = %e, "cannot resolve local address, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ServiceInfo {
        ServiceInfo::new(
            DEFAULT_SERVICE_NAME,
            DEFAULT_SERVICE_TYPE,
            DEFAULT_SERVICE_VERSION,
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            5005,
        )
    }

    #[test]
    fn service_info_builds_instance_name_and_properties() {
        let i = info();
        assert_eq!(i.instance_name, "EasyLap Service._easylap._udp.local.");
        assert_eq!(i.properties["service"], "EasyLap Service");
        assert_eq!(i.properties["version"], "0.0.1");
    }

    #[tokio::test]
    async fn log_advertiser_tracks_registration() {
        let mut adv = LogAdvertiser::new();
        adv.register(&info()).await.unwrap();
        assert_eq!(adv.registered().unwrap().port, 5005);
        adv.deregister().await;
        assert!(adv.registered().is_none());
        // Second deregister is a no-op.
        adv.deregister().await;
    }

    #[tokio::test]
    async fn log_advertiser_rejects_record_without_port() {
        let mut adv = LogAdvertiser::new();
        let mut record = info();
        record.port = 0;
        assert!(matches!(
            adv.register(&record).await,
            Err(DiscoveryError::InvalidRecord { reason: "port 0", .. })
        ));
        assert!(adv.registered().is_none());
    }

    #[test]
    fn local_ipv4_is_ipv4() {
        assert!(local_ipv4().is_ipv4());
    }
}
