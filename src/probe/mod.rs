//! Application-layer probing of open ports.
//!
//! The pipeline only sees [`ProbeClient`]; [`JavaProbe`] is the production
//! implementation speaking the Java Edition status protocol.

pub mod query;
pub mod slp;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::error::ProbeError;
use crate::types::ProbeReport;

/// Something that can ask an endpoint for its game-server status.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// Request a status from `addr`, giving up after `timeout`.
    ///
    /// Any error means "no server of this protocol here".
    async fn probe_status(&self, addr: SocketAddr, timeout: Duration) -> Result<ProbeReport, ProbeError>;
}

/// Status handshake plus an optional best-effort UDP query.
#[derive(Debug, Clone, Copy)]
pub struct JavaProbe {
    pub query: bool,
}

impl Default for JavaProbe {
    fn default() -> Self {
        Self { query: true }
    }
}

#[async_trait]
impl ProbeClient for JavaProbe {
    async fn probe_status(&self, addr: SocketAddr, timeout: Duration) -> Result<ProbeReport, ProbeError> {
        let status = slp::request_status(addr, timeout).await?;

        let query_ok = self.query
            && match query::query(addr, timeout).await {
                Ok(()) => true,
                Err(e) => {
                    trace!(%addr, "query unavailable: {e}");
                    false
                }
            };

        Ok(ProbeReport { status, query_ok })
    }
}
