//! Simulated backend scaffolding.
//!
//! A backend is an independent process speaking line-delimited JSON-RPC
//! over stdio to the relay. This crate packages the server loop once,
//! generic over a [`ServiceTools`] implementation, plus two reference
//! services: `payments` (customers, charges, refunds) and `chat`
//! (messages). Real rehearsals supply their own backend processes; the
//! reference ones exist so an end-to-end run works out of the box.

mod chat;
mod payments;
mod server;

pub use chat::ChatBackend;
pub use payments::PaymentsBackend;
pub use server::{BackendServer, ServiceTools};
