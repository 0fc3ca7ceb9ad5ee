//! GameSpy4 UDP query, the optional "enable-query" interface.
//!
//! Handshake yields a challenge token; a full-stat request carrying it must be
//! answered with a stat packet echoing our session id.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time;

use crate::error::ProbeError;

const MAGIC: [u8; 2] = [0xfe, 0xfd];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
const SESSION_MASK: i32 = 0x0f0f_0f0f;

pub fn new_session_id() -> i32 {
    rand::random::<i32>() & SESSION_MASK
}

pub fn handshake_request(session: i32) -> Vec<u8> {
    let mut pkt = MAGIC.to_vec();
    pkt.push(TYPE_HANDSHAKE);
    pkt.extend_from_slice(&session.to_be_bytes());
    pkt
}

pub fn full_stat_request(session: i32, token: i32) -> Vec<u8> {
    let mut pkt = MAGIC.to_vec();
    pkt.push(TYPE_STAT);
    pkt.extend_from_slice(&session.to_be_bytes());
    pkt.extend_from_slice(&token.to_be_bytes());
    pkt.extend_from_slice(&[0, 0, 0, 0]);
    pkt
}

fn check_header(resp: &[u8], kind: u8, session: i32) -> Result<(), ProbeError> {
    if resp.len() < 5 || resp[0] != kind {
        return Err(ProbeError::Protocol(format!("expected query packet type {kind:#x}")));
    }
    let echoed = i32::from_be_bytes([resp[1], resp[2], resp[3], resp[4]]);
    if echoed & SESSION_MASK != session {
        return Err(ProbeError::Protocol("query session id mismatch".into()));
    }
    Ok(())
}

/// Parse a handshake answer: type, session id, then the token as NUL-terminated decimal text.
pub fn parse_challenge(resp: &[u8], session: i32) -> Result<i32, ProbeError> {
    check_header(resp, TYPE_HANDSHAKE, session)?;
    let text = resp[5..].split(|&b| b == 0).next().unwrap_or_default();
    let text = std::str::from_utf8(text)
        .map_err(|_| ProbeError::Protocol("challenge token is not text".into()))?;
    let token: i64 = text
        .trim()
        .parse()
        .map_err(|_| ProbeError::Protocol(format!("bad challenge token {text:?}")))?;
    Ok(token as i32)
}

pub fn check_stat_response(resp: &[u8], session: i32) -> Result<(), ProbeError> {
    check_header(resp, TYPE_STAT, session)
}

/// Handshake plus full-stat exchange, each receive bounded by `timeout`.
pub async fn query(addr: SocketAddr, timeout: Duration) -> Result<(), ProbeError> {
    let bind: SocketAddr = if addr.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(addr).await?;

    let session = new_session_id();
    let mut buf = vec![0u8; 8192];

    socket.send(&handshake_request(session)).await?;
    let n = time::timeout(timeout, socket.recv(&mut buf)).await??;
    let token = parse_challenge(&buf[..n], session)?;

    socket.send(&full_stat_request(session, token)).await?;
    let n = time::timeout(timeout, socket.recv(&mut buf)).await??;
    check_stat_response(&buf[..n], session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layouts() {
        assert_eq!(
            handshake_request(0x0102_0304),
            vec![0xfe, 0xfd, 0x09, 0x01, 0x02, 0x03, 0x04]
        );
        let stat = full_stat_request(1, 9_513_307);
        assert_eq!(stat.len(), 15);
        assert_eq!(&stat[..3], &[0xfe, 0xfd, 0x00]);
        assert_eq!(&stat[7..11], &9_513_307i32.to_be_bytes());
        assert_eq!(&stat[11..], &[0, 0, 0, 0]);
    }

    #[test]
    fn session_ids_are_masked() {
        for _ in 0..32 {
            assert_eq!(new_session_id() & !SESSION_MASK, 0);
        }
    }

    #[test]
    fn challenge_parsed() {
        let mut resp = vec![0x09, 0x00, 0x00, 0x00, 0x01];
        resp.extend_from_slice(b"9513307\0");
        assert_eq!(parse_challenge(&resp, 1).unwrap(), 9_513_307);
    }

    #[test]
    fn challenge_wrong_session_or_type() {
        let mut resp = vec![0x09, 0x00, 0x00, 0x00, 0x02];
        resp.extend_from_slice(b"1\0");
        assert!(parse_challenge(&resp, 1).is_err());
        resp[0] = 0x00;
        assert!(parse_challenge(&resp, 2).is_err());
        assert!(parse_challenge(&[0x09], 1).is_err());
    }

    #[test]
    fn stat_response_checked() {
        let resp = [0x00, 0x00, 0x00, 0x00, 0x07, b's', b'p'];
        assert!(check_stat_response(&resp, 7).is_ok());
        assert!(check_stat_response(&resp, 8).is_err());
    }

    #[tokio::test]
    async fn query_against_fake_responder() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = vec![0x09];
            reply.extend_from_slice(&buf[3..7]);
            reply.extend_from_slice(b"42\0");
            server.send_to(&reply, peer).await.unwrap();

            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = vec![0x00];
            reply.extend_from_slice(&buf[3..7]);
            reply.extend_from_slice(b"splitnum\0");
            server.send_to(&reply, peer).await.unwrap();
        });
        query(addr, Duration::from_secs(2)).await.unwrap();
    }
}
