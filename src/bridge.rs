//! # bridge: stand-in collaborators for the binary
//!
//! The engine only talks to topics.  When run standalone these two tasks
//! play the outside world:
//!
//! * [`feed_lines`]: each input line (JSON trade event) is published to the
//!   input topic, keyed by its `token_address`.  Lines are forwarded as-is;
//!   validation is the engine's job.
//! * [`relay_output`]: every output-topic message is written, unmodified, as
//!   one line to a writer (stdout in the binary).

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::engine::shutdown_requested;

/// Consumer group the output relay reads with.
pub const RELAY_GROUP: &str = "rsi-relay";

/// Partition key for a raw line: its `token_address`, or `""` when absent.
pub fn partition_key(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("token_address")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Publish every non-blank line from `reader` to `topic`.  Returns the count.
pub async fn feed_lines<R>(reader: R, broker: &dyn Broker, topic: &str) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input line")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let key = partition_key(line);
        broker
            .publish(topic, &key, line.as_bytes().to_vec())
            .await
            .with_context(|| format!("Failed to publish to '{topic}'"))?;
        published += 1;
    }

    info!(published, topic, "📥 Input stream closed");
    Ok(published)
}

/// Forward `topic` to `writer` line by line until shutdown.
pub async fn relay_output<W>(
    broker: &dyn Broker,
    topic: &str,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    broker.ensure_topic(topic).await?;
    let streams = broker.assign(topic, RELAY_GROUP).await?;
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(256);

    for mut stream in streams {
        let tx = tx.clone();
        let mut stop = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    _ = shutdown_requested(&mut stop) => break,
                    record = stream.next() => record,
                };
                match record {
                    Ok(record) => {
                        let offset = record.offset;
                        if tx.send(record.payload).await.is_err() {
                            break;
                        }
                        if let Err(e) = stream.commit(offset).await {
                            warn!(error = %e, "Relay commit failed");
                        }
                    }
                    Err(e) => {
                        warn!(partition = stream.partition(), error = %e, "Relay stream ended");
                        break;
                    }
                }
            }
        });
    }
    drop(tx);

    loop {
        let payload = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            payload = rx.recv() => payload,
        };
        let Some(payload) = payload else { break };
        writer.write_all(&payload).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        debug!(bytes = payload.len(), "Relayed RSI event");
    }

    Ok(())
}
