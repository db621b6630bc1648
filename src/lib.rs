//! phantom: a deception DICOM archive node.
//!
//! Presents a catalog of locally stored image records over the DIMSE
//! query/retrieve services and logs everything a remote peer does. The
//! catalog is built once at startup; C-FIND answers with matched metadata,
//! C-MOVE/C-GET answer with full datasets re-read from disk.

pub mod catalog;
pub mod config;
pub mod matching;
pub mod service;

use std::sync::Arc;

use tracing_subscriber::{self, prelude::*, EnvFilter};

use crate::config::config::Config;
use crate::service::ArchiveService;
use dimse::DimseScp;

pub async fn run(config: Config) {
    // Initialize logging
    if config.logging.log_to_file {
        let file_appender = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(
            std::fs::File::create(&config.logging.log_file_path)
                .expect("Failed to create log file"),
        );

        let stdout_appender = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry()
            .with(EnvFilter::new(&config.logging.log_level))
            .with(file_appender)
            .with(stdout_appender)
            .try_init()
            .expect("Failed to initialize logging");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&config.logging.log_level))
            .init();
    }

    config.validate().expect("Invalid configuration");

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        aet = %config.node.ae_title,
        "starting phantom archive node"
    );

    let catalog = catalog::Catalog::build(&config.node.image_dir)
        .expect("Failed to scan image directory");
    tracing::info!(
        records = catalog.len(),
        dir = %config.node.image_dir.display(),
        "image catalog loaded"
    );

    let service = Arc::new(ArchiveService::new(catalog));
    let scp = DimseScp::new(config.dimse_config(), service);
    scp.run().await.expect("DIMSE listener failed");
}
