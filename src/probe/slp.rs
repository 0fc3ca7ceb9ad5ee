//! Java Edition status handshake ("server list ping") over TCP.
//!
//! Every packet is `VarInt length | VarInt id | body`. The exchange is
//! handshake (next state = status), status request, JSON status response,
//! then an optional ping/pong used for latency.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::error::ProbeError;
use crate::types::ServerStatus;

/// Protocol number sent in the handshake. Servers answer status requests for any value.
pub const PROTOCOL_VERSION: i32 = 47;

/// Largest packet accepted from a server.
pub const MAX_PACKET_LEN: usize = 1 << 20;

const HANDSHAKE_ID: i32 = 0x00;
const STATUS_ID: i32 = 0x00;
const PING_ID: i32 = 0x01;
const NEXT_STATE_STATUS: i32 = 1;

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7f == 0 {
            buf.push(v as u8);
            return;
        }
        buf.push((v & 0x7f) as u8 | 0x80);
        v >>= 7;
    }
}

/// Decode a VarInt from the front of `buf`, returning the value and bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(i32, usize), ProbeError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate().take(5) {
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as i32, i + 1));
        }
    }
    if buf.len() < 5 {
        Err(ProbeError::Protocol("truncated varint".into()))
    } else {
        Err(ProbeError::Protocol("varint longer than 5 bytes".into()))
    }
}

pub async fn read_varint<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = r.read_u8().await?;
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("varint longer than 5 bytes".into()))
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

fn frame(id: i32, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(body.len() + 5);
    write_varint(&mut payload, id);
    payload.extend_from_slice(body);

    let mut out = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut out, payload.len() as i32);
    out.extend_from_slice(&payload);
    out
}

pub fn handshake_packet(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::new();
    write_varint(&mut body, PROTOCOL_VERSION);
    write_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);
    frame(HANDSHAKE_ID, &body)
}

pub fn status_request_packet() -> Vec<u8> {
    frame(STATUS_ID, &[])
}

pub fn ping_packet(payload: i64) -> Vec<u8> {
    frame(PING_ID, &payload.to_be_bytes())
}

/// Read one framed packet and return its id and body.
pub async fn read_packet<R: AsyncRead + Unpin>(r: &mut R) -> Result<(i32, Vec<u8>), ProbeError> {
    let len = read_varint(r).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|&n| n > 0 && n <= MAX_PACKET_LEN)
        .ok_or_else(|| ProbeError::Protocol(format!("bad packet length {len}")))?;

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    let (id, used) = decode_varint(&payload)?;
    payload.drain(..used);
    Ok((id, payload))
}

/// Extract the JSON document from a status response body.
pub fn status_json(body: &[u8]) -> Result<&str, ProbeError> {
    let (len, used) = decode_varint(body)?;
    let len = usize::try_from(len)
        .map_err(|_| ProbeError::Protocol(format!("negative string length {len}")))?;
    let bytes = body
        .get(used..used + len)
        .ok_or_else(|| ProbeError::Protocol("status string overruns packet".into()))?;
    std::str::from_utf8(bytes).map_err(|e| ProbeError::Protocol(format!("status is not utf-8: {e}")))
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    version: Option<RawVersion>,
    #[serde(default)]
    players: Option<RawPlayers>,
    #[serde(default)]
    description: Value,
}

#[derive(Deserialize)]
struct RawVersion {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawPlayers {
    #[serde(default)]
    online: Option<i64>,
    #[serde(default)]
    max: Option<i64>,
    #[serde(default)]
    sample: Option<Vec<Value>>,
}

/// Normalize a status JSON document. Latency is left unset.
pub fn parse_status(json: &str) -> Result<ServerStatus, ProbeError> {
    let raw: RawStatus = serde_json::from_str(json)?;

    let version_name = raw
        .version
        .and_then(|v| v.name)
        .unwrap_or_else(|| "Unknown".to_string());
    let (online, max, sample) = match raw.players {
        Some(p) => (p.online, p.max, p.sample.unwrap_or_default()),
        None => (None, None, Vec::new()),
    };

    Ok(ServerStatus {
        version_name,
        online_players: clamp_count(online),
        max_players: clamp_count(max),
        motd: flatten_chat(&raw.description),
        sample_names: sample.iter().filter_map(player_name).collect(),
        latency_ms: None,
    })
}

fn clamp_count(n: Option<i64>) -> u32 {
    n.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32
}

fn player_name(entry: &Value) -> Option<String> {
    match entry {
        Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Flatten a chat component (plain string, `{text, extra}` object, or array) to plain text.
pub fn flatten_chat(value: &Value) -> String {
    let mut out = String::new();
    flatten_into(value, &mut out);
    out
}

fn flatten_into(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(parts) => parts.iter().for_each(|p| flatten_into(p, out)),
        Value::Object(map) => {
            if let Some(text) = map.get("text") {
                flatten_into(text, out);
            }
            if let Some(extra) = map.get("extra") {
                flatten_into(extra, out);
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(_) | Value::Null => {}
    }
}

/// Run the status handshake against `addr`.
///
/// The whole exchange, ping included, shares one `timeout` budget. Latency is the
/// ping/pong round-trip when the server answers it, otherwise the status
/// request/response round-trip.
pub async fn request_status(addr: SocketAddr, timeout: Duration) -> Result<ServerStatus, ProbeError> {
    let deadline = Instant::now() + timeout;
    let (mut stream, mut status, status_rtt) = time::timeout_at(deadline, async {
        let mut stream = TcpStream::connect(addr).await?;
        stream
            .write_all(&handshake_packet(&addr.ip().to_string(), addr.port()))
            .await?;
        let sent = Instant::now();
        stream.write_all(&status_request_packet()).await?;

        let (id, body) = read_packet(&mut stream).await?;
        let rtt = sent.elapsed();
        if id != STATUS_ID {
            return Err(ProbeError::Protocol(format!("unexpected packet id {id:#x}")));
        }
        let status = parse_status(status_json(&body)?)?;
        Ok::<_, ProbeError>((stream, status, rtt))
    })
    .await??;

    let latency = match time::timeout_at(deadline, ping(&mut stream)).await {
        Ok(Ok(latency)) => latency,
        Ok(Err(e)) => {
            trace!(%addr, "ping failed, using status round-trip: {e}");
            status_rtt
        }
        Err(_) => {
            trace!(%addr, "ping timed out, using status round-trip");
            status_rtt
        }
    };
    status.latency_ms = Some(latency.as_secs_f64() * 1000.0);
    Ok(status)
}

async fn ping(stream: &mut TcpStream) -> Result<Duration, ProbeError> {
    let payload: i64 = rand::random();
    let start = Instant::now();
    stream.write_all(&ping_packet(payload)).await?;
    let (id, body) = read_packet(stream).await?;
    if id != PING_ID || body[..] != payload.to_be_bytes()[..] {
        return Err(ProbeError::Protocol("pong does not echo the ping".into()));
    }
    Ok(start.elapsed())
}
