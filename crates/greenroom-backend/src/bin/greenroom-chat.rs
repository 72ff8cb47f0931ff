//! Chat backend entry point. Spawned by the relay with
//! `GREENROOM_STATE_PATH` pointing at the shared state store.

use std::sync::Arc;

use greenroom_backend::{BackendServer, ChatBackend};
use greenroom_state::StateEngine;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries JSON-RPC; logs must go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let state = match std::env::var("GREENROOM_STATE_PATH") {
        Ok(path) => StateEngine::open(std::path::Path::new(&path))?,
        Err(_) => StateEngine::open_in_memory()?,
    };
    let backend = ChatBackend::new(Arc::new(state))?;
    BackendServer::new(backend).run().await
}
