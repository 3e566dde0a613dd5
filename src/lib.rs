//! phishgate: admission service for the phishing-detection pipeline.
//!
//! Decides for each submitted URL whether it needs phishing processing and, if
//! so, publishes it to the downstream pipeline. The binary entrypoint is in
//! `main.rs`.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod supervisor;
pub mod validate;
