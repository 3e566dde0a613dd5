//! Network identity: IP literal detection, local-range checks and forward DNS.
//!
//! Resolution failures are not fatal: a domain without an address record is
//! simply not worth processing, and the orchestrator treats it that way.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a domain could not be turned into an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("lookup of {domain} failed: {reason}")]
    Lookup { domain: String, reason: String },

    #[error("empty list of a-records received for {0}")]
    NoRecords(String),
}

/// Forward lookup of a domain name. Abstracted so tests can count lookups
/// and the orchestrator never depends on a live resolver.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, ResolutionError>;
}

/// hickory-backed resolver.
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    /// Use the host's resolver configuration (/etc/resolv.conf on unix).
    pub fn from_system_conf() -> anyhow::Result<Self> {
        let resolver = Resolver::builder_tokio()?.build();
        Ok(Self { resolver })
    }

    /// Query the given nameservers over UDP instead of the system ones.
    pub fn with_nameservers(nameservers: &[SocketAddr]) -> Self {
        let mut config = ResolverConfig::new();
        for addr in nameservers {
            config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
        }
        let resolver =
            Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();
        Self { resolver }
    }

    /// System config when no nameservers are given.
    pub fn from_nameservers(nameservers: &[SocketAddr]) -> anyhow::Result<Self> {
        if nameservers.is_empty() {
            Self::from_system_conf()
        } else {
            Ok(Self::with_nameservers(nameservers))
        }
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, ResolutionError> {
        let lookup = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| ResolutionError::Lookup {
                domain: domain.to_string(),
                reason: e.to_string(),
            })?;
        Ok(lookup.iter().collect())
    }
}

/// Classifies host tokens and decides which addresses count as local.
pub struct NetworkInspector {
    local_nets: Vec<IpNetwork>,
    resolver: Arc<dyn HostResolver>,
}

impl NetworkInspector {
    pub fn new(local_nets: Vec<IpNetwork>, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            local_nets,
            resolver,
        }
    }

    /// Parse CIDR strings from configuration. Fails on the first bad entry.
    pub fn parse_nets(raw: &[String]) -> anyhow::Result<Vec<IpNetwork>> {
        raw.iter()
            .map(|net| {
                net.trim().parse::<IpNetwork>().map_err(|e| {
                    anyhow::anyhow!("parse local ip nets error {:?}: {}", net, e)
                })
            })
            .collect()
    }

    pub fn parse_ip(host: &str) -> Option<IpAddr> {
        host.parse().ok()
    }

    pub fn is_ip_literal(host: &str) -> bool {
        Self::parse_ip(host).is_some()
    }

    /// Loopback, link-local unicast, link-local multicast, or inside one of
    /// the configured local networks.
    pub fn is_local(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            IpAddr::V4(_) => ip,
        };

        let link_local = match ip {
            IpAddr::V4(v4) => v4.is_loopback() || is_link_local_v4(v4),
            IpAddr::V6(v6) => v6.is_loopback() || is_link_local_v6(v6),
        };
        if link_local {
            return true;
        }

        self.local_nets.iter().any(|net| net.contains(ip))
    }

    /// First address for the domain. IP literals come back unchanged without
    /// a lookup.
    pub async fn resolve(&self, domain: &str) -> Result<IpAddr, ResolutionError> {
        if let Some(ip) = Self::parse_ip(domain) {
            return Ok(ip);
        }

        let addrs = match self.resolver.lookup(domain).await {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("get a-record fail: {} > {}", domain, e);
                return Err(e);
            }
        };

        match addrs.first() {
            Some(ip) => {
                debug!("get a-record ok: {} > {}", domain, ip);
                Ok(*ip)
            }
            None => {
                warn!("get a-record fail (empty list received): {}", domain);
                Err(ResolutionError::NoRecords(domain.to_string()))
            }
        }
    }

    pub fn local_nets(&self) -> &[IpNetwork] {
        &self.local_nets
    }
}

fn is_link_local_v4(ip: Ipv4Addr) -> bool {
    // 169.254.0.0/16 unicast, 224.0.0.0/24 multicast
    let o = ip.octets();
    ip.is_link_local() || (o[0] == 224 && o[1] == 0 && o[2] == 0)
}

fn is_link_local_v6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();
    // fe80::/10 unicast, ff02::/16 (any flags) multicast
    (s[0] & 0xffc0) == 0xfe80 || (s[0] & 0xff0f) == 0xff02
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticResolver {
        answer: Vec<IpAddr>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HostResolver for StaticResolver {
        async fn lookup(&self, _domain: &str) -> Result<Vec<IpAddr>, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn inspector(nets: &[&str], answer: Vec<IpAddr>) -> (NetworkInspector, Arc<StaticResolver>) {
        let raw: Vec<String> = nets.iter().map(|n| n.to_string()).collect();
        let resolver = Arc::new(StaticResolver {
            answer,
            calls: AtomicUsize::new(0),
        });
        let inspector = NetworkInspector::new(
            NetworkInspector::parse_nets(&raw).unwrap(),
            resolver.clone(),
        );
        (inspector, resolver)
    }

    #[test]
    fn test_ip_literal_detection() {
        assert!(NetworkInspector::is_ip_literal("10.0.0.5"));
        assert!(NetworkInspector::is_ip_literal("2001:db8::1"));
        assert!(NetworkInspector::is_ip_literal("::ffff:10.0.0.5"));
        assert!(!NetworkInspector::is_ip_literal("example.com"));
        assert!(!NetworkInspector::is_ip_literal("10.0.0"));
        assert!(!NetworkInspector::is_ip_literal("[::1]"));
    }

    #[test]
    fn test_builtin_local_ranges() {
        let (inspector, _) = inspector(&[], vec![]);
        for ip in [
            "127.0.0.1",
            "127.8.8.8",
            "169.254.10.1",
            "224.0.0.251",
            "::1",
            "fe80::1",
            "ff02::fb",
        ] {
            assert!(inspector.is_local(ip.parse().unwrap()), "{} should be local", ip);
        }
        for ip in ["8.8.8.8", "224.0.1.1", "2001:4860::8888", "ff05::2"] {
            assert!(!inspector.is_local(ip.parse().unwrap()), "{} should not be local", ip);
        }
    }

    #[test]
    fn test_configured_local_nets() {
        let (inspector, _) = inspector(&["10.0.0.0/8", "fd00::/8"], vec![]);
        assert!(inspector.is_local("10.0.0.5".parse().unwrap()));
        assert!(inspector.is_local("fd12::5".parse().unwrap()));
        assert!(!inspector.is_local("11.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_ipv4_mapped_checked_as_ipv4() {
        let (inspector, _) = inspector(&["10.0.0.0/8"], vec![]);
        assert!(inspector.is_local("::ffff:10.1.2.3".parse().unwrap()));
        assert!(inspector.is_local("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!inspector.is_local("::ffff:8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_bad_cidr_rejected() {
        let raw = vec!["10.0.0.0/8".to_string(), "10.0.0.0/99".to_string()];
        assert!(NetworkInspector::parse_nets(&raw).is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal_skips_lookup() {
        let (inspector, resolver) = inspector(&[], vec!["1.2.3.4".parse().unwrap()]);
        let ip = inspector.resolve("93.184.216.34").await.unwrap();
        assert_eq!(ip, "93.184.216.34".parse::<IpAddr>().unwrap());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolve_returns_first_address() {
        let answer = vec!["1.2.3.4".parse().unwrap(), "5.6.7.8".parse().unwrap()];
        let (inspector, resolver) = inspector(&[], answer);
        let ip = inspector.resolve("example.com").await.unwrap();
        assert_eq!(ip, "1.2.3.4".parse::<IpAddr>().unwrap());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_empty_answer_is_error() {
        let (inspector, _) = inspector(&[], vec![]);
        let err = inspector.resolve("nxdomain.invalid").await.unwrap_err();
        assert_eq!(err, ResolutionError::NoRecords("nxdomain.invalid".to_string()));
    }
}
