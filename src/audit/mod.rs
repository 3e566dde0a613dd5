pub mod logger;
pub mod types;

pub use logger::{AuditLogger, AuditSink};
pub use types::*;
