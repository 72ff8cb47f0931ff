//! The Protocol Relay.
//!
//! Sits between the agent and the simulated backend processes: spawns
//! one connection per configured service, merges their tool catalogs
//! into a single surface, forwards `tools/call` requests (consulting
//! the fault queue first), applies a second layer of cross-cutting risk
//! checks, and publishes everything to the Event Bus. The agent sees one
//! synchronous tool API; internally each backend connection correlates
//! its own concurrent responses by request id.

mod connection;
mod registry;
mod relay;
mod risk;
mod server;

pub use connection::BackendConnection;
pub use registry::ToolRegistry;
pub use relay::{run_observer_commands, Relay};
pub use risk::RiskScanner;
pub use server::RelayServer;
