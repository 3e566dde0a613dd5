pub mod blacklist;
pub mod cache;
pub mod network;
pub mod reputation;
pub mod types;
pub mod validator;

pub use blacklist::UrlBlacklist;
pub use cache::DecisionCache;
pub use network::{DnsResolver, HostResolver, NetworkInspector, ResolutionError};
pub use reputation::{HostKind, ReputationCheck, ReputationClient, ReputationVerdict};
pub use types::*;
pub use validator::{parse_domain, Validator};
