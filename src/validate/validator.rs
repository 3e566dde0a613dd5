//! Validation orchestrator: decides whether a URL needs phishing processing.
//!
//! The chain runs cheapest-first and stops at the first exclusion:
//! 1. URL blacklist (no I/O)
//! 2. decision cache, keyed by domain
//! 3. for IP hosts: local-range check, then reputation of the IP
//! 4. for domains: reputation of the domain, then forward resolution
//!
//! Only a host that nothing excluded is admitted. Outcomes of steps 3-4 are
//! cached per domain, so URLs that differ only in path share one decision.

use crate::config::ValidationConfig;
use crate::validate::blacklist::UrlBlacklist;
use crate::validate::cache::DecisionCache;
use crate::validate::network::{DnsResolver, NetworkInspector};
use crate::validate::reputation::{HostKind, ReputationCheck, ReputationClient};
use crate::validate::types::{Decision, ValidationError, Verdict};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::{Host, Url};

pub struct Validator {
    blacklist: UrlBlacklist,
    network: NetworkInspector,
    reputation: Arc<dyn ReputationCheck>,
    decisions: DecisionCache,
}

impl Validator {
    pub fn new(
        blacklist: UrlBlacklist,
        network: NetworkInspector,
        reputation: Arc<dyn ReputationCheck>,
        decisions: DecisionCache,
    ) -> Self {
        Self {
            blacklist,
            network,
            reputation,
            decisions,
        }
    }

    /// Build the full pipeline from configuration: compiled blacklist, local
    /// networks, hickory resolver and HTTP reputation client.
    pub fn from_config(config: &ValidationConfig) -> anyhow::Result<Self> {
        let blacklist = UrlBlacklist::new(&config.url_blacklist_regexps)
            .context("validator init error (compile url blacklist)")?;
        let local_nets = NetworkInspector::parse_nets(&config.local_ip_nets)
            .context("validator init error (parse local ip nets)")?;
        let resolver = DnsResolver::from_nameservers(&config.nameservers)
            .context("validator init error (dns resolver)")?;
        let reputation = ReputationClient::new(&config.reputation)
            .context("validator init error (reputation client)")?;
        let decisions = DecisionCache::new(
            Duration::from_secs(config.decision_cache_ttl_secs),
            config.decision_cache_capacity,
        );

        Ok(Self::new(
            blacklist,
            NetworkInspector::new(local_nets, Arc::new(resolver)),
            Arc::new(reputation),
            decisions,
        ))
    }

    /// Whether the URL has to go to the phishing pipeline.
    pub async fn requires_processing(&self, url: &str) -> Result<bool, ValidationError> {
        Ok(self.decide(url).await?.requires_processing())
    }

    /// Full decision for a URL, including where the chain stopped.
    pub async fn decide(&self, url: &str) -> Result<Decision, ValidationError> {
        if let Some(pattern) = self.blacklist.matching_pattern(url) {
            info!("url is blacklisted (does not need processing): {} [{}]", url, pattern);
            return Ok(Decision {
                domain: None,
                verdict: Verdict::Blacklisted,
                cached: false,
            });
        }

        let domain = parse_domain(url)?;

        let (verdict, cached) = self
            .decisions
            .get_or_decide(&domain, self.decide_domain(&domain))
            .await;
        if cached {
            debug!("decision cache hit: {} > {}", domain, verdict);
        }

        Ok(Decision {
            domain: Some(domain),
            verdict,
            cached,
        })
    }

    /// The uncached part of the chain for one host token.
    async fn decide_domain(&self, domain: &str) -> Verdict {
        let verdict = if NetworkInspector::is_ip_literal(domain) {
            self.decide_ip(domain).await
        } else {
            self.decide_name(domain).await
        };
        info!("domain decision: {} > {}", domain, verdict);
        verdict
    }

    async fn decide_ip(&self, host: &str) -> Verdict {
        let Some(ip) = NetworkInspector::parse_ip(host) else {
            return Verdict::InvalidAddress;
        };

        if self.network.is_local(ip) {
            return Verdict::LocalAddress;
        }

        if self.reputation.check(HostKind::Ip, host).await.is_allow_listed() {
            return Verdict::AllowListed;
        }
        Verdict::Admitted
    }

    async fn decide_name(&self, domain: &str) -> Verdict {
        if self
            .reputation
            .check(HostKind::Domain, domain)
            .await
            .is_allow_listed()
        {
            return Verdict::AllowListed;
        }

        match self.network.resolve(domain).await {
            Ok(_) => Verdict::Admitted,
            Err(_) => Verdict::Unresolvable,
        }
    }

    pub fn blacklist(&self) -> &UrlBlacklist {
        &self.blacklist
    }

    pub fn decisions(&self) -> &DecisionCache {
        &self.decisions
    }
}

/// Host token of a URL: lowercased domain, or an IP address without the
/// IPv6 brackets.
pub fn parse_domain(url: &str) -> Result<String, ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let parsed = Url::parse(url)?;
    let domain = match parsed.host() {
        Some(Host::Domain(d)) => d.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => String::new(),
    };

    if domain.is_empty() {
        return Err(ValidationError::EmptyHost);
    }
    Ok(domain)
}
