//! Query and retrieve responders for the archive node.
//!
//! `ArchiveService` is the service-provider side of the DIMSE boundary: it
//! holds the shared catalog behind a single lock and turns incoming commands
//! into result streams. The match pass runs synchronously under the lock
//! (metadata only, fast); full-record re-reads for retrieval happen outside
//! the lock, one record at a time, so slow disk I/O for one peer never stalls
//! another peer's query.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dicom_object::mem::InMemElement;
use dimse::scp::QueryRetrieveProvider;
use dimse::types::{AssociationInfo, CommandContext, DimseStatus, FindResponse, RetrieveResponse};
use dimse::DimseError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::{self, Catalog};
use crate::matching::{self, MatchError, MatchResult};

/// The archive node's command dispatcher: a shared catalog and nothing else
pub struct ArchiveService {
    catalog: Arc<Mutex<Catalog>>,
}

impl ArchiveService {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
        }
    }

    /// Number of records currently served
    pub fn record_count(&self) -> usize {
        self.catalog.lock().expect("catalog lock").len()
    }

    /// Run one query's match pass under the catalog lock.
    ///
    /// The lock covers only this synchronous pass; it is released before any
    /// result is streamed or any file is re-read.
    fn match_pass(
        &self,
        ctx: &CommandContext,
        filters: &[InMemElement],
    ) -> Result<Vec<MatchResult>, MatchError> {
        let catalog = self.catalog.lock().expect("catalog lock");
        matching::find_matches(&catalog, filters, &ctx.cancel)
    }
}

#[async_trait]
impl QueryRetrieveProvider for ArchiveService {
    async fn on_echo(&self, association: &AssociationInfo) -> DimseStatus {
        info!(
            association = %association.id,
            peer = %association.peer,
            command = "C-ECHO",
            "command received"
        );
        DimseStatus::Success
    }

    async fn on_find(
        &self,
        ctx: &CommandContext,
        filters: Vec<InMemElement>,
        results: mpsc::Sender<FindResponse>,
    ) {
        info!(
            association = %ctx.association.id,
            command = %ctx.command,
            sop_class = %ctx.sop_class_uid,
            filters = filters.len(),
            "command received"
        );

        let matches = match self.match_pass(ctx, &filters) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(
                    association = %ctx.association.id,
                    error = %e,
                    "match pass failed, ending query"
                );
                let _ = results
                    .send(FindResponse::failed(DimseError::matching(e.to_string())))
                    .await;
                return;
            }
        };

        info!(
            association = %ctx.association.id,
            matches = matches.len(),
            "search result"
        );

        for matched in matches {
            if results
                .send(FindResponse::matched(matched.elements))
                .await
                .is_err()
            {
                debug!(association = %ctx.association.id, "find consumer gone, stopping");
                return;
            }
        }
    }

    async fn on_retrieve(
        &self,
        ctx: &CommandContext,
        filters: Vec<InMemElement>,
        results: mpsc::Sender<RetrieveResponse>,
    ) {
        info!(
            association = %ctx.association.id,
            command = %ctx.command,
            sop_class = %ctx.sop_class_uid,
            filters = filters.len(),
            "command received"
        );

        let matches = match self.match_pass(ctx, &filters) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(
                    association = %ctx.association.id,
                    error = %e,
                    "match pass failed, ending query"
                );
                let _ = results
                    .send(RetrieveResponse::failed(DimseError::matching(e.to_string())))
                    .await;
                return;
            }
        };

        let total = matches.len();
        info!(
            association = %ctx.association.id,
            matches = total,
            "search result"
        );

        for (index, matched) in matches.into_iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                debug!(association = %ctx.association.id, "retrieve cancelled mid-stream");
                return;
            }

            let remaining = total - index - 1;
            let path = matched.path;
            // Full read at emission time: one record's pixel payload in
            // memory at a time, and never under the catalog lock
            let response = match catalog::read_full(&path) {
                Ok(object) => RetrieveResponse::item(remaining, path, object),
                Err(e) => {
                    warn!(
                        association = %ctx.association.id,
                        path = %path.display(),
                        error = %e,
                        "failed to re-read matched file"
                    );
                    RetrieveResponse::item_failed(
                        remaining,
                        path,
                        DimseError::dataset_read(e.to_string()),
                    )
                }
            };

            if results.send(response).await.is_err() {
                debug!(association = %ctx.association.id, "retrieve consumer gone, stopping");
                return;
            }
        }
    }
}
