// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable orchestration command stream.
//!
//! A Redis stream with a consumer group gives at-least-once delivery with
//! per-replica claiming: each message is delivered to exactly one consumer
//! at a time, and stays pending until acknowledged. The worker acknowledges
//! only after the dispatcher has either succeeded or recorded a definitive
//! failure, and never redelivers poison messages itself.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};
use thiserror::Error;

/// Stream carrying orchestration commands.
pub const STREAM_NAME: &str = "orchestration:commands";

/// Consumer group shared by all worker replicas.
pub const CONSUMER_GROUP: &str = "k8s-orchestrator";

/// How long a single read blocks waiting for a message.
const READ_BLOCK_MS: usize = 1_000;

/// Errors from stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
}

/// One claimed message: its stream id and decoded string fields.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Consumer-group handle on the orchestration stream.
pub struct CommandStream {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
}

impl CommandStream {
    /// Connect and idempotently create the consumer group at offset 0.
    ///
    /// A second worker starting against the same stream observes the group
    /// already exists and proceeds.
    pub async fn connect(
        redis_url: &str,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, StreamError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_connection_manager().await?;

        match conn.xgroup_create_mkstream::<_, _, _, String>(stream, group, "0").await {
            Ok(_) => {
                tracing::info!(%stream, %group, "created consumer group");
            }
            Err(e) if group_already_exists(&e) => {
                tracing::info!(%stream, %group, "consumer group already exists");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            conn,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
        })
    }

    /// Claim at most one new message, blocking up to one second.
    ///
    /// Returns `None` when the block times out with nothing to do, which is
    /// the loop's chance to notice a shutdown request.
    pub async fn read_one(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(READ_BLOCK_MS);

        let reply: StreamReadReply =
            self.conn.xread_options(&[&self.stream], &[">"], &options).await?;

        for key in reply.keys {
            if let Some(entry) = key.ids.into_iter().next() {
                let fields = entry
                    .map
                    .iter()
                    .filter_map(|(k, v)| {
                        redis::from_redis_value::<String>(v).ok().map(|s| (k.clone(), s))
                    })
                    .collect();
                return Ok(Some(StreamMessage { id: entry.id, fields }));
            }
        }
        Ok(None)
    }

    /// Acknowledge a processed message exactly once.
    pub async fn ack(&mut self, msg_id: &str) -> Result<(), StreamError> {
        let _: i64 = self.conn.xack(&self.stream, &self.group, &[msg_id]).await?;
        Ok(())
    }
}

/// Whether a group-create error means the group was already there.
///
/// Redis reports this as a `BUSYGROUP` error; it is the expected outcome for
/// every worker replica after the first.
pub fn group_already_exists(err: &RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}

/// Whether an error is a connection-level failure worth a reconnect, as
/// opposed to a protocol or data error.
pub fn is_connection_error(err: &StreamError) -> bool {
    let StreamError::Redis(e) = err;
    e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() || e.is_timeout()
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
