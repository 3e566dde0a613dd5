//! Dispatch router: sends admitted tasks to the exchange for their source.
//!
//! A publish failure is not retried and not queued locally. The router marks
//! the sink as down, raises the fatal signal, and refuses every later dispatch
//! so no admitted task is accepted while it cannot be delivered.

use crate::config::DispatchConfig;
use crate::supervisor::FatalSignal;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Error)]
#[error("failed to publish to exchange '{exchange}': {reason}")]
pub struct PublishError {
    pub exchange: String,
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("task sink is down after an earlier publish failure")]
    SinkDown,
}

/// Message sink for admitted tasks.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError>;
}

pub struct DispatchRouter {
    publisher: Arc<dyn Publisher>,
    default_exchange: String,
    exchanges: HashMap<String, String>,
    sink_down: AtomicBool,
    fatal: FatalSignal,
}

impl DispatchRouter {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        default_exchange: impl Into<String>,
        exchanges: HashMap<String, String>,
        fatal: FatalSignal,
    ) -> Self {
        Self {
            publisher,
            default_exchange: default_exchange.into(),
            exchanges,
            sink_down: AtomicBool::new(false),
            fatal,
        }
    }

    pub fn from_config(
        config: &DispatchConfig,
        publisher: Arc<dyn Publisher>,
        fatal: FatalSignal,
    ) -> Self {
        Self::new(
            publisher,
            config.exchange.clone(),
            config.exchanges.clone(),
            fatal,
        )
    }

    /// Exchange for a task source: exact match, else the default.
    pub fn exchange_for(&self, source: &str) -> &str {
        self.exchanges
            .get(source)
            .map(String::as_str)
            .unwrap_or(&self.default_exchange)
    }

    /// Publish a task and return the exchange it went to.
    pub async fn dispatch(
        &self,
        source: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<String, DispatchError> {
        if self.sink_down.load(Ordering::SeqCst) {
            return Err(DispatchError::SinkDown);
        }

        let exchange = self.exchange_for(source);
        match self.publisher.publish(exchange, routing_key, payload).await {
            Ok(()) => {
                info!("pushed task to exchange '{}' (source: {})", exchange, source);
                Ok(exchange.to_string())
            }
            Err(e) => {
                self.sink_down.store(true, Ordering::SeqCst);
                self.fatal.raise(format!("failed to publish a message: {}", e));
                Err(e.into())
            }
        }
    }

    pub fn is_sink_down(&self) -> bool {
        self.sink_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            payload: &[u8],
        ) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError {
                    exchange: exchange.to_string(),
                    reason: "channel closed".to_string(),
                });
            }
            self.published.lock().await.push((
                exchange.to_string(),
                routing_key.to_string(),
                payload.to_vec(),
            ));
            Ok(())
        }
    }

    fn router(publisher: Arc<RecordingPublisher>, fatal: FatalSignal) -> DispatchRouter {
        let mut exchanges = HashMap::new();
        exchanges.insert("mail".to_string(), "phish.mail".to_string());
        DispatchRouter::new(publisher, "phish.default", exchanges, fatal)
    }

    #[tokio::test]
    async fn test_mapped_and_default_exchanges() {
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router(publisher.clone(), FatalSignal::new());

        assert_eq!(router.dispatch("mail", "", b"{}").await.unwrap(), "phish.mail");
        assert_eq!(router.dispatch("web", "", b"{}").await.unwrap(), "phish.default");
        // exact match only
        assert_eq!(router.exchange_for("Mail"), "phish.default");

        let published = publisher.published.lock().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "phish.mail");
        assert_eq!(published[1].0, "phish.default");
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let fatal = FatalSignal::new();
        let router = router(publisher, fatal.clone());

        let err = router.dispatch("mail", "", b"{}").await.unwrap_err();
        assert!(matches!(err, DispatchError::Publish(_)));
        assert!(fatal.is_raised());
        assert!(router.is_sink_down());

        let err = router.dispatch("web", "", b"{}").await.unwrap_err();
        assert!(matches!(err, DispatchError::SinkDown));
    }
}
