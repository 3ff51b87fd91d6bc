//! The process-wide state shared by every connection of one member.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::info;

use crate::{
    cluster_config::{ClusterConfigurationHandler, ClusterConfigurationService},
    config::Config,
    connection::{BufferPool, CancelCriterion, CancelSignal, Connection},
    member::MemberId,
    wire::Version,
};

/// Everything one member shares between its connections.
///
/// Built once at startup and passed around by `Arc`. Connections created through
/// [`connection`](Self::connection) share the context's buffer pool and cancellation signal, so
/// [`shutdown`](Self::shutdown) reaches all of them.
#[derive(Debug)]
pub struct ClusterContext {
    local: MemberId,
    config: Config,
    cancel: Arc<CancelSignal>,
    pool: Arc<BufferPool>,
    service: Arc<ClusterConfigurationService>,
    handler: ClusterConfigurationHandler,
}

impl ClusterContext {
    /// Creates the context of the member `local`.
    pub fn new(local: MemberId, config: Config) -> Arc<Self> {
        let pool = Arc::new(BufferPool::new(
            config.buffer_pool_size,
            config.buffer_capacity,
            config.buffer_retain_limit,
        ));
        let service = Arc::new(if config.enable_cluster_configuration {
            ClusterConfigurationService::enabled()
        } else {
            ClusterConfigurationService::disabled()
        });
        let handler = ClusterConfigurationHandler::with_cache(
            service.clone(),
            config.snapshot_cache_capacity,
            config.snapshot_cache_ttl,
        );
        Arc::new(ClusterContext {
            local,
            config,
            cancel: Arc::new(CancelSignal::new()),
            pool,
            service,
            handler,
        })
    }

    /// This member.
    pub fn local(&self) -> MemberId {
        self.local
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared write buffer pool.
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// The cancellation signal raised by [`shutdown`](Self::shutdown).
    pub fn cancel_signal(&self) -> &Arc<CancelSignal> {
        &self.cancel
    }

    /// The cluster configuration service of this member.
    pub fn configuration_service(&self) -> &Arc<ClusterConfigurationService> {
        &self.service
    }

    /// The handler answering cluster configuration requests.
    pub fn configuration_handler(&self) -> &ClusterConfigurationHandler {
        &self.handler
    }

    /// Wraps the writing half of an established channel to `remote`.
    pub fn connection<W>(&self, remote: MemberId, version: Version, writer: W) -> Connection<W>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let cancel: Arc<dyn CancelCriterion> = self.cancel.clone();
        Connection::new(
            remote,
            version,
            writer,
            self.pool.clone(),
            cancel,
            &self.config,
        )
    }

    /// Raises the cancellation signal, stops the configuration service and closes the buffer
    /// pool. Idempotent; the first reason is kept.
    pub fn shutdown(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.cancel.is_cancelled() {
            info!(member = %self.local, %reason, "shutting down");
        }
        self.cancel.cancel(reason);
        self.service.stop();
        self.pool.close();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
