//! The Event Bus.
//!
//! Everything the relay does is published here as [`ProxyEvent`]s and
//! retained in a bounded, oldest-evicted log. Observers connect over a
//! WebSocket channel on a separate port; on connect they receive the
//! full retained log in original order, then the live stream, with no
//! gap or duplicate in between. Inbound observer messages parse against
//! a small closed command set; unrecognized shapes are silently ignored
//! so malformed input can never crash a run.

mod bus;
mod observer;
mod server;

pub use bus::EventBus;
pub use observer::ObserverCommand;
pub use server::{serve_observers, ObserverServerConfig};

/// Event Bus errors. Only infrastructure failures surface here;
/// per-observer socket errors end that observer's session silently.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to bind observer listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Observer listener error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Refusing to serve observers without a shared secret on non-local host {0}")]
    InsecureBind(String),
}
