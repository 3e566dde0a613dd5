pub mod auth;
pub mod metrics;
pub mod protocol;
pub mod server;

pub use auth::{AuthTokens, Referrer};
pub use metrics::Metrics;
pub use server::{router, AppState, GatewayServer};
