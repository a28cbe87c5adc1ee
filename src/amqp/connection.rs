//! amqprs-backed implementation of the broker transport

use crate::amqp::transport::{
    BrokerChannel, BrokerConnection, Connector, SharedChannel, SharedConnection,
};
use crate::config::BrokerSettings;
use crate::error::DispatchError;
use crate::types::QueueOptions;
use amqprs::{
    callbacks::{DefaultChannelCallback, DefaultConnectionCallback},
    channel::{BasicPublishArguments, Channel, QueueDeclareArguments},
    connection::{Connection, OpenConnectionArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Opens connections to the configured broker, one attempt per call.
///
/// Retrying is left to the connection manager, which re-attempts on the next
/// demand rather than looping here.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    settings: BrokerSettings,
}

impl AmqpConnector {
    pub fn new(settings: BrokerSettings) -> Self {
        Self { settings }
    }

    fn open_arguments(&self) -> OpenConnectionArguments {
        let mut args = OpenConnectionArguments::new(
            &self.settings.host,
            self.settings.port,
            &self.settings.username,
            &self.settings.password,
        );
        args.virtual_host(&self.settings.vhost);
        args
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self) -> Result<SharedConnection, DispatchError> {
        let connection = Connection::open(&self.open_arguments())
            .await
            .map_err(|e| DispatchError::Connection {
                message: e.to_string(),
            })?;

        connection
            .register_callback(DefaultConnectionCallback)
            .await
            .map_err(|e| DispatchError::Connection {
                message: format!("failed to register connection callback: {}", e),
            })?;

        info!(endpoint = %self.endpoint(), "AMQP connection opened");
        Ok(Arc::new(AmqpConnection { connection }))
    }

    fn endpoint(&self) -> String {
        format!(
            "amqp://{}:{}{}",
            self.settings.host, self.settings.port, self.settings.vhost
        )
    }
}

/// Wrapper around an amqprs connection
pub struct AmqpConnection {
    connection: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    async fn open_channel(&self) -> Result<SharedChannel, DispatchError> {
        let channel =
            self.connection
                .open_channel(None)
                .await
                .map_err(|e| DispatchError::Channel {
                    message: e.to_string(),
                })?;

        channel
            .register_callback(DefaultChannelCallback)
            .await
            .map_err(|e| DispatchError::Channel {
                message: format!("failed to register channel callback: {}", e),
            })?;

        debug!(channel_id = channel.channel_id(), "AMQP channel opened");
        Ok(Arc::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> Result<(), DispatchError> {
        if !self.connection.is_open() {
            return Ok(());
        }
        self.connection
            .clone()
            .close()
            .await
            .map_err(|e| DispatchError::Connection {
                message: format!("failed to close connection: {}", e),
            })
    }
}

/// Wrapper around an amqprs channel
pub struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    async fn declare_queue(
        &self,
        queue: &str,
        options: QueueOptions,
    ) -> Result<(), DispatchError> {
        let args = QueueDeclareArguments::new(queue)
            .durable(options.durable)
            .auto_delete(false)
            .finish();

        self.channel
            .queue_declare(args)
            .await
            .map(|_| ())
            .map_err(|e| DispatchError::QueueDeclare {
                queue: queue.to_string(),
                message: e.to_string(),
            })
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), DispatchError> {
        // Default exchange routes by queue name.
        let args = BasicPublishArguments::new("", queue);
        let mut properties = BasicProperties::default();
        properties
            .with_content_type("application/json")
            .with_message_id(&uuid::Uuid::new_v4().to_string())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        self.channel
            .basic_publish(properties, body, args)
            .await
            .map_err(|e| DispatchError::Publish {
                queue: queue.to_string(),
                message: e.to_string(),
            })
    }
}
