//! Service Class Provider (SCP) boundary for inbound DIMSE operations

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dicom_object::mem::InMemElement;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::DimseConfig;
use crate::types::{
    AssociationInfo, CommandContext, DimseStatus, FindResponse, RetrieveResponse,
};
use crate::{DimseError, Result};

/// Capacity of the per-query result channel.
///
/// A single slot gives rendezvous-style hand-off: the producer suspends until
/// the protocol engine has drained the previous item onto the wire.
const RESULT_BUFFER: usize = 1;

/// The three callback contracts the archive core implements.
///
/// One call per inbound command; result streaming happens through the sender
/// passed in, and the stream ends when the provider returns (dropping the
/// sender closes the channel).
#[async_trait]
pub trait QueryRetrieveProvider: Send + Sync {
    /// Service a C-ECHO verification request
    async fn on_echo(&self, association: &AssociationInfo) -> DimseStatus;

    /// Service a C-FIND query, streaming one item per matching record
    async fn on_find(
        &self,
        ctx: &CommandContext,
        filters: Vec<InMemElement>,
        results: mpsc::Sender<FindResponse>,
    );

    /// Service a C-MOVE or C-GET query, streaming full datasets with a
    /// remaining-count progress signal
    async fn on_retrieve(
        &self,
        ctx: &CommandContext,
        filters: Vec<InMemElement>,
        results: mpsc::Sender<RetrieveResponse>,
    );
}

/// DIMSE Service Class Provider shell.
///
/// Owns the listener and association accounting; the DICOM upper-layer state
/// machine (negotiation, PDU framing, command decode) lives behind this seam
/// and invokes the `dispatch_*` entry points once per decoded command.
pub struct DimseScp {
    config: DimseConfig,
    provider: Arc<dyn QueryRetrieveProvider>,
    active_associations: Arc<RwLock<u32>>,
}

impl DimseScp {
    /// Create a new SCP with the given configuration and provider
    pub fn new(config: DimseConfig, provider: Arc<dyn QueryRetrieveProvider>) -> Self {
        Self {
            config,
            provider,
            active_associations: Arc::new(RwLock::new(0)),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &DimseConfig {
        &self.config
    }

    /// Start the SCP listener
    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        info!(
            %addr,
            aet = %self.config.local_aet,
            "DIMSE listener ready"
        );

        let scp = Arc::new(self);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    // Check association limit
                    {
                        let active = scp.active_associations.read().await;
                        if *active >= scp.config.max_associations {
                            warn!(
                                peer = %peer_addr,
                                "association limit reached, dropping connection"
                            );
                            drop(stream);
                            continue;
                        }
                    }

                    let scp_clone = Arc::clone(&scp);
                    tokio::spawn(async move {
                        if let Err(e) = scp_clone.handle_association(stream, peer_addr).await {
                            error!(peer = %peer_addr, error = %e, "association error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error accepting connection");
                }
            }
        }
    }

    /// Handle a single association
    async fn handle_association(
        &self,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        {
            let mut active = self.active_associations.write().await;
            *active += 1;
        }

        let result = self.handle_association_inner(stream, peer_addr).await;

        {
            let mut active = self.active_associations.write().await;
            *active -= 1;
        }

        result
    }

    /// Inner association handler.
    ///
    /// Association negotiation and command decode belong to the external
    /// network stack; until that is wired in, the session is kept open and
    /// its traffic recorded, so unsolicited probes are still observed.
    // TODO: hand the accepted socket to the upper-layer acceptor and route
    // decoded commands through dispatch_echo/dispatch_find/dispatch_retrieve.
    async fn handle_association_inner(
        &self,
        mut stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let association = AssociationInfo::new(peer_addr);
        info!(
            association = %association.id,
            peer = %peer_addr,
            "inbound association"
        );

        let mut buf = [0u8; 4096];
        let mut received: u64 = 0;
        loop {
            match tokio::time::timeout(self.config.association_timeout(), stream.read(&mut buf))
                .await
            {
                Err(_) => {
                    debug!(association = %association.id, "association idle timeout");
                    break;
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => received += n as u64,
                Ok(Err(e)) => {
                    debug!(association = %association.id, error = %e, "association read error");
                    break;
                }
            }
        }

        info!(
            association = %association.id,
            peer = %peer_addr,
            bytes = received,
            "association closed"
        );
        Ok(())
    }

    /// Dispatch a C-ECHO command to the provider
    pub async fn dispatch_echo(&self, association: &AssociationInfo) -> DimseStatus {
        if !self.config.enable_echo {
            // 0x0122: SOP class not supported
            return DimseStatus::Failure(0x0122);
        }
        self.provider.on_echo(association).await
    }

    /// Dispatch a C-FIND command, returning the response stream.
    ///
    /// The producer runs on its own task and the channel closes when it
    /// finishes; dropping the stream cancels the query via the context token.
    pub fn dispatch_find(
        &self,
        ctx: CommandContext,
        filters: Vec<InMemElement>,
    ) -> ReceiverStream<FindResponse> {
        let (tx, rx) = mpsc::channel(RESULT_BUFFER);

        if !self.config.enable_find {
            tokio::spawn(async move {
                let _ = tx
                    .send(FindResponse::failed(DimseError::not_supported(
                        "C-FIND service disabled",
                    )))
                    .await;
            });
            return ReceiverStream::new(rx);
        }

        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            provider.on_find(&ctx, filters, tx).await;
        });
        ReceiverStream::new(rx)
    }

    /// Dispatch a C-MOVE or C-GET command, returning the response stream
    pub fn dispatch_retrieve(
        &self,
        ctx: CommandContext,
        filters: Vec<InMemElement>,
    ) -> ReceiverStream<RetrieveResponse> {
        let (tx, rx) = mpsc::channel(RESULT_BUFFER);

        if !self.config.enable_retrieve {
            tokio::spawn(async move {
                let _ = tx
                    .send(RetrieveResponse::failed(DimseError::not_supported(
                        "C-MOVE/C-GET service disabled",
                    )))
                    .await;
            });
            return ReceiverStream::new(rx);
        }

        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            provider.on_retrieve(&ctx, filters, tx).await;
        });
        ReceiverStream::new(rx)
    }
}
