//! In-memory tier backends for strata.
//!
//! This crate implements the `SharedTier` and `DurableTier` contracts from
//! `strata-core` on top of `DashMap`, evaluating expiry against an injected
//! clock. They serve two purposes:
//!
//! - Single-process deployments that want the full tier pipeline without Redis
//!   or PostgreSQL.
//! - Tests: both backends support fault injection ([`Faults`]) so outages and
//!   slow tiers can be simulated deterministically.
//!
//! # Example
//!
//! ```ignore
//! use strata_core::ManualClock;
//! use strata_memory::MemorySharedTier;
//!
//! let clock = ManualClock::new();
//! let shared = MemorySharedTier::new(std::sync::Arc::new(clock.clone()));
//! shared.faults().set_available(false); // every call now fails with a connection error
//! ```

mod durable;
mod faults;
mod shared;

pub use durable::MemoryDurableTier;
pub use faults::Faults;
pub use shared::MemorySharedTier;
