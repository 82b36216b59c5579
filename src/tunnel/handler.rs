//! Accept handling
//!
//! Turns an accept event from the virtual network stack into a running
//! tunnel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::endpoint::VirtualEndpoint;
use super::stats::TunnelStats;
use super::tcp::{RelayStats, TcpTunnel};
use crate::config::TcpConfig;
use crate::error::TunnelError;
use crate::fakedns::HijackTable;
use crate::outbound::Dialer;

/// Starts a tunnel for every accepted TCP connection
pub struct TcpHandler {
    table: Option<Arc<HijackTable>>,
    dialer: Arc<dyn Dialer>,
    config: TcpConfig,
    stats: Arc<TunnelStats>,
}

impl TcpHandler {
    /// Create a handler
    ///
    /// Without a hijack table every destination is dialed by address.
    pub fn new(table: Option<Arc<HijackTable>>, dialer: Arc<dyn Dialer>, config: TcpConfig) -> Self {
        Self {
            table,
            dialer,
            config,
            stats: Arc::new(TunnelStats::new()),
        }
    }

    /// Handle one accepted connection to `dst`
    ///
    /// The tunnel is built before this returns, so blocked destinations and
    /// dial failures surface here; the endpoint is closed in that case. On
    /// success the relay runs on its own task.
    ///
    /// # Errors
    ///
    /// Returns the `TunnelError` from tunnel construction.
    pub async fn handle(
        &self,
        local: Arc<dyn VirtualEndpoint>,
        dst: SocketAddr,
    ) -> Result<JoinHandle<RelayStats>, TunnelError> {
        self.stats.record_accepted();

        let tunnel = match TcpTunnel::connect(
            Arc::clone(&local),
            dst.ip(),
            dst.port(),
            self.table.as_deref(),
            self.dialer.as_ref(),
            &self.config,
        )
        .await
        {
            Ok(tunnel) => tunnel,
            Err(e) => {
                if matches!(e, TunnelError::Blocked { .. }) {
                    info!(%dst, "{}", e);
                    self.stats.record_blocked();
                } else {
                    self.stats.record_failed();
                }
                local.close();
                return Err(e);
            }
        };

        debug!(%dst, target = tunnel.target(), "tcp tunnel established");
        self.stats.record_started();

        let stats = Arc::clone(&self.stats);
        Ok(tokio::spawn(async move {
            let result = tunnel.run().await;
            stats.record_finished(
                result.local_to_remote,
                result.remote_to_local,
                result.close_reason.is_none(),
            );
            result
        }))
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &Arc<TunnelStats> {
        &self.stats
    }

    /// Get the TCP configuration
    #[must_use]
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}
