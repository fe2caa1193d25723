use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::advisory;
use crate::config::ServerConfig;
use crate::error::DecodeError;
use crate::protocol::{self, Framing};
use crate::reading::Reading;
use crate::response::{self, Ack};
use crate::state::ServerState;

/// One request/response exchange. Lives only as long as the connection.
struct ConnCtx {
    received: Vec<u8>,
    framing: Framing,
    decoded: Result<Map<String, Value>, DecodeError>,
}

/// Serves a single connection: read one message, store it, acknowledge it.
///
/// Protocol and data problems are answered on the socket and are not errors
/// here. Errors returned are transport failures. The stream is closed when
/// this returns, whichever way it returns.
pub async fn handle<S>(state: &ServerState, config: &ServerConfig, mut stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(ctx) = read_message(&mut stream, config).await? else {
        debug!("peer closed without sending data");
        return Ok(());
    };

    debug!(bytes = ctx.received.len(), framing = ?ctx.framing, "message received");

    let ack = process(state, ctx.decoded);
    let reply = response::encode(ctx.framing, &ack).context("failed to encode response")?;

    stream
        .write_all(&reply)
        .await
        .context("failed to send response")?;
    stream.shutdown().await.context("failed to close stream")?;

    debug!(status = ?ack.status, bytes = reply.len(), "response sent");

    Ok(())
}

/// Reads until the buffered bytes decode, cannot decode, or the peer stops
/// sending. `None` means the peer closed before sending anything.
async fn read_message<S>(stream: &mut S, config: &ServerConfig) -> io::Result<Option<ConnCtx>>
where
    S: AsyncRead + Unpin,
{
    let mut received = Vec::with_capacity(config.read_buffer);
    let mut chunk = vec![0u8; config.read_buffer.max(1)];

    loop {
        let n = read_chunk(stream, &mut chunk, config.read_timeout).await?;

        if n == 0 {
            if received.is_empty() {
                return Ok(None);
            }
            let framing = protocol::framing(&received);
            let decoded = protocol::decode_final(framing, &received);
            return Ok(Some(ConnCtx {
                received,
                framing,
                decoded,
            }));
        }

        received.extend_from_slice(&chunk[..n]);

        // Re-classified on every read: framing is only settled once the
        // header block, if any, has fully arrived.
        let framing = protocol::framing(&received);
        let decoded = match protocol::decode(framing, &received) {
            Err(DecodeError::Incomplete) if received.len() < config.max_message_bytes => continue,
            Err(DecodeError::Incomplete) => Err(DecodeError::TooLarge {
                limit: config.max_message_bytes,
            }),
            other => other,
        };

        return Ok(Some(ConnCtx {
            received,
            framing,
            decoded,
        }));
    }
}

async fn read_chunk<S>(stream: &mut S, buf: &mut [u8], deadline: Option<Duration>) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, stream.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
        None => stream.read(buf).await,
    }
}

/// Turns a decoded message into its acknowledgment, storing the reading on
/// the way.
fn process(state: &ServerState, decoded: Result<Map<String, Value>, DecodeError>) -> Ack {
    let parsed = decoded.and_then(|document| {
        let reading = Reading::from_document(&document)?;
        Ok((document, reading))
    });

    let (document, reading) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "rejected message");
            return Ack::error(err.to_string());
        }
    };

    let message = match state.store(reading.clone()) {
        Some(station_id) => {
            info!(%station_id, "reading stored");
            "Weather data received successfully".to_string()
        }
        None => {
            warn!("reading has no station_id, not stored");
            "Weather data received but not stored: missing station_id".to_string()
        }
    };

    Ack::success(message, advisory::feedback(&reading), document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn exchange(state: &ServerState, config: &ServerConfig, request: &[u8]) -> Vec<u8> {
        let (mut client, server) = duplex(1024);

        let request = request.to_vec();
        let writer = tokio::spawn(async move {
            client.write_all(&request).await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            reply
        });

        handle(state, config, server).await.unwrap();
        writer.await.unwrap()
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_raw_reading_stored() {
        let state = ServerState::default();
        let config = ServerConfig::default();

        let reply = exchange(
            &state,
            &config,
            br#"{"station_id":"WS-1","temperature":36,"windspeed":5,"weathercode":0}"#,
        )
        .await;

        let value = json(&reply);
        assert_eq!(value["status"], "success");
        assert_eq!(value["data_received"]["station_id"], "WS-1");
        let feedback = value["weather_feedback"].as_array().unwrap();
        assert!(feedback[0].as_str().unwrap().contains("Heat advisory"));
        assert!(feedback.iter().any(|line| line.as_str().unwrap().contains("Clear sky")));

        let stored = state.registry.get("WS-1").unwrap();
        assert_eq!(stored.temperature.as_ref().and_then(|t| t.value()), Some(36.0));
    }

    #[tokio::test]
    async fn test_message_split_across_reads() {
        let state = ServerState::default();
        let config = ServerConfig {
            read_buffer: 8,
            ..ServerConfig::default()
        };

        let reply = exchange(&state, &config, br#"{"station_id":"WS-2","temperature":12}"#).await;

        assert_eq!(json(&reply)["status"], "success");
        assert!(state.registry.get("WS-2").is_some());
    }

    #[tokio::test]
    async fn test_oversized_message() {
        let state = ServerState::default();
        let config = ServerConfig {
            read_buffer: 8,
            max_message_bytes: 16,
            ..ServerConfig::default()
        };

        let reply = exchange(&state, &config, br#"{"station_id":"WS-3","temperature":12}"#).await;

        let value = json(&reply);
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "message exceeds 16 bytes");
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_message() {
        let state = ServerState::default();
        let config = ServerConfig::default();
        let (mut client, server) = duplex(1024);

        let writer = tokio::spawn(async move {
            client.write_all(br#"{"station_id":"WS"#).await.unwrap();
            client.shutdown().await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            reply
        });

        handle(&state, &config, server).await.unwrap();

        let value = json(&writer.await.unwrap());
        assert_eq!(value["status"], "error");
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_http_headers_split_across_writes() {
        let state = ServerState::default();
        let config = ServerConfig::default();
        let (mut client, server) = duplex(1024);

        let body = r#"{"station_id":"WS-10","temperature":22}"#;
        let request = format!(
            "POST / HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {body}",
            body.len()
        );

        let writer = tokio::spawn(async move {
            let (head, rest) = request.as_bytes().split_at(17);
            client.write_all(head).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.write_all(rest).await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            reply
        });

        handle(&state, &config, server).await.unwrap();

        let reply = writer.await.unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(state.registry.get("WS-10").is_some());
    }

    #[tokio::test]
    async fn test_missing_separator_answered_at_eof() {
        let state = ServerState::default();
        let (mut client, server) = duplex(1024);

        let writer = tokio::spawn(async move {
            client
                .write_all(b"POST / HTTP/1.1\r\nContent-Type: application/json\r\n{}")
                .await
                .unwrap();
            client.shutdown().await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            reply
        });

        handle(&state, &ServerConfig::default(), server).await.unwrap();

        let reply = writer.await.unwrap();
        assert!(reply.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_whitespace_only_answered() {
        let state = ServerState::default();
        let config = ServerConfig::default();

        let reply = tokio::time::timeout(Duration::from_secs(2), exchange(&state, &config, b"   \r\n"))
            .await
            .unwrap();

        assert_eq!(json(&reply)["status"], "error");
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_silent_peer_gets_no_reply() {
        let state = ServerState::default();
        let (mut client, server) = duplex(64);
        client.shutdown().await.unwrap();

        handle(&state, &ServerConfig::default(), server).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let state = ServerState::default();
        let config = ServerConfig::default().with_read_timeout(Duration::from_millis(20));
        let (_client, server) = duplex(64);

        let err = handle(&state, &config, server).await.unwrap_err();
        let io_err = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_invalid_reading_rejected() {
        let state = ServerState::default();
        let Value::Object(document) = serde_json::json!({"station_id": "X", "location": true}) else {
            unreachable!()
        };

        let ack = process(&state, Ok(document));

        assert_eq!(ack.status, response::Status::Error);
        assert!(ack.message.starts_with("invalid reading"));
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_missing_station_id_acknowledged() {
        let state = ServerState::default();
        let Value::Object(document) = serde_json::json!({"temperature": 20}) else {
            unreachable!()
        };

        let ack = process(&state, Ok(document));

        assert_eq!(ack.status, response::Status::Success);
        assert!(ack.message.contains("missing station_id"));
        assert!(state.registry.is_empty());
    }
}
