//! The Fault Injection Engine.
//!
//! Queued effects live in a single global FIFO: the next qualifying tool
//! call consumes exactly one effect, irrespective of which service or
//! tool it targets. Each effect is a pure function of
//! `(service, tool, args)` that yields an [`Intercept`]; growing the
//! fault catalog never requires touching the relay's forwarding logic.
//!
//! Immediate world mutations are not effects at all — they route through
//! a backend's hidden injection tool and never touch this queue.

mod effect;
mod queue;

pub use effect::{is_chaos_error, ChaosEffect, Followup, Intercept, CHAOS_PREFIX};
pub use queue::ChaosQueue;
