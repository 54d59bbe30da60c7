//! Provider chain with per-key request deduplication.
//!
//! # Request lifecycle
//!
//! ```text
//! request(key, cb)
//!   ├─ invalid key / no providers / shut down ─► error delivered
//!   ├─ cache hit ─────────────────────────────► tile delivered
//!   ├─ key already in flight ─────────────────► cb joins the request
//!   └─ new RequestState ─► queue of provider i ─► worker fetch
//!                                                  ├─ Ok  ─► deliver to every cb
//!                                                  └─ Err ─► queue of provider i+1 ...
//! ```
//!
//! Loading notifications fire when the number of in-flight requests goes
//! from zero to one and back to zero.

mod scheduler;
mod state;

pub use scheduler::ProviderChain;
pub use state::{RequestState, RequestStatus, TileError};
