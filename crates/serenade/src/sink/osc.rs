//! OSC 1.0 over UDP.
//!
//! Each message is one datagram:
//!
//! ```text
//! address  : NUL-terminated string, padded to a multiple of 4
//! typetags : "," followed by one tag per argument, padded the same way
//! args     : f = big-endian f32, i = big-endian i32, s = padded string
//! ```

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use earshot::DescriptorValue;
use tokio::net::UdpSocket;
use tracing::{debug, instrument};

use super::{ResultSink, SinkError};
use crate::result::GameResult;

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    fn tag(&self) -> u8 {
        match self {
            OscArg::Int(_) => b'i',
            OscArg::Float(_) => b'f',
            OscArg::Str(_) => b's',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, arg: OscArg) -> Self {
        Self {
            address: address.into(),
            args: vec![arg],
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        put_padded_str(&mut buf, self.address.as_bytes());

        let mut tags = Vec::with_capacity(self.args.len() + 1);
        tags.push(b',');
        tags.extend(self.args.iter().map(OscArg::tag));
        put_padded_str(&mut buf, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => buf.put_i32(*v),
                OscArg::Float(v) => buf.put_f32(*v),
                OscArg::Str(s) => put_padded_str(&mut buf, s.as_bytes()),
            }
        }

        buf.freeze()
    }
}

/// String bytes, at least one NUL, then NULs up to a 4-byte boundary.
fn put_padded_str(buf: &mut BytesMut, s: &[u8]) {
    buf.put_slice(s);
    let pad = 4 - (s.len() % 4);
    buf.put_bytes(0, pad);
}

/// Messages for one result, in broadcast order. Absent fields are skipped.
pub fn result_messages(result: &GameResult, prefix: &str) -> Vec<OscMessage> {
    let prefix = prefix.trim_end_matches('/');
    let mut messages = Vec::new();

    if let Some(chord) = &result.chord {
        messages.push(OscMessage::new(
            format!("{prefix}/chord/label"),
            OscArg::Str(chord.label.clone()),
        ));
    }

    if let Some(key) = &result.key {
        messages.push(OscMessage::new(format!("{prefix}/key/label"), OscArg::Str(key.label())));
    }

    if let Some(emotion) = &result.emotion {
        messages.push(OscMessage::new(
            format!("{prefix}/emotion/label"),
            OscArg::Str(emotion.label.clone()),
        ));
        messages.push(OscMessage::new(
            format!("{prefix}/emotion/confidence"),
            OscArg::Float(emotion.confidence as f32),
        ));
        for (label, p) in &emotion.probabilities {
            messages.push(OscMessage::new(
                format!("{prefix}/emotion/probability/{label}"),
                OscArg::Float(*p as f32),
            ));
        }
    }

    if let Some(turn) = &result.dialogue {
        messages.push(OscMessage::new(
            format!("{prefix}/dialogue/content"),
            OscArg::Str(turn.content.clone()),
        ));
        messages.push(OscMessage::new(
            format!("{prefix}/dialogue/role"),
            OscArg::Str(turn.role.as_str().to_string()),
        ));
    }

    for (key, value) in result.descriptors.iter() {
        let arg = match value {
            DescriptorValue::Number(n) => OscArg::Float(*n as f32),
            DescriptorValue::Text(t) => OscArg::Str(t.clone()),
        };
        messages.push(OscMessage::new(format!("{prefix}/descriptor/{key}"), arg));
    }

    messages
}

/// Fire-and-forget UDP broadcaster to an external engine.
pub struct OscSink {
    socket: UdpSocket,
    target: std::net::SocketAddr,
    prefix: String,
}

impl OscSink {
    /// Resolve `target` (`host:port`) and bind an ephemeral local socket.
    pub async fn bind(target: &str, prefix: &str) -> Result<Self, SinkError> {
        let resolved = tokio::net::lookup_host(target)
            .await
            .map_err(|e| SinkError::Resolve {
                target: target.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| SinkError::Resolve {
                target: target.to_string(),
                reason: "no addresses".into(),
            })?;

        let local = if resolved.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;

        tracing::info!("OSC broadcast to {} under {}", resolved, prefix);

        Ok(Self {
            socket,
            target: resolved,
            prefix: prefix.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ResultSink for OscSink {
    fn name(&self) -> &str {
        "osc"
    }

    #[instrument(skip_all, fields(target = %self.target))]
    async fn send(&self, result: &GameResult) -> Result<(), SinkError> {
        let messages = result_messages(result, &self.prefix);
        for message in &messages {
            self.socket.send_to(&message.encode(), self.target).await?;
        }
        debug!(count = messages.len(), "OSC messages sent");
        Ok(())
    }
}
