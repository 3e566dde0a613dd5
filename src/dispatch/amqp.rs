//! AMQP publisher backed by lapin.

use crate::dispatch::router::{PublishError, Publisher};
use crate::supervisor::FatalSignal;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::info;

const PERSISTENT: u8 = 2;

pub struct AmqpPublisher {
    connection: Connection,
    channel: Channel,
}

impl AmqpPublisher {
    /// Connect and open the producer channel in confirm mode. Connection and
    /// channel errors after this point raise `fatal`.
    pub async fn connect(dsn: &str, fatal: FatalSignal) -> Result<Self> {
        let connection = Connection::connect(dsn, ConnectionProperties::default())
            .await
            .context("failed to connect to amqp broker")?;

        let channel_fatal = fatal.clone();
        connection.on_error(move |err| {
            fatal.raise(format!("amqp connection error: {}", err));
        });

        let channel = connection
            .create_channel()
            .await
            .context("failed to open an amqp channel")?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .context("failed to enable publisher confirms")?;

        channel.on_error(move |err| {
            channel_fatal.raise(format!("amqp channel error: {}", err));
        });

        info!("connected to amqp broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.connection
            .close(200, "shutdown")
            .await
            .context("failed to close amqp connection")
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let to_error = |e: lapin::Error| PublishError {
            exchange: exchange.to_string(),
            reason: e.to_string(),
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(to_error)?
            .await
            .map_err(to_error)?;
        check_confirmation(exchange, confirmation)
    }
}

/// Only a plain ack means the broker took responsibility for the message.
fn check_confirmation(exchange: &str, confirmation: Confirmation) -> Result<(), PublishError> {
    let reason = match confirmation {
        Confirmation::Ack(None) => return Ok(()),
        Confirmation::Ack(Some(_)) => "message was returned by the broker",
        Confirmation::Nack(_) => "message was nacked by the broker",
        Confirmation::NotRequested => "broker did not confirm the message",
    };
    Err(PublishError {
        exchange: exchange.to_string(),
        reason: reason.to_string(),
    })
}
