//! Application bootstrap and lifecycle management.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         TileService                           │
//! │                                                               │
//! │  TileCache (memory + disk) ◄──── write-through ────┐          │
//! │       ▲                                            │          │
//! │       │ lookup                                     │          │
//! │  ProviderChain ──► [archive pool] TileFetcher ─────┤          │
//! │       │        ──► [network pool] TileFetcher ─────┘          │
//! │       ▼                                                       │
//! │  DeliverySink ───────► DeliveryReceiver (consumer thread)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let (service, mut receiver) = TileServiceBuilder::new(config)
//!     .archive_provider("archive", archives)
//!     .network_provider("network", online)
//!     .build()?;
//!
//! service.request(key, |outcome| { /* runs on this thread */ });
//! while receiver.dispatch_blocking() {}
//! ```

mod bootstrap;
mod error;

pub use bootstrap::{TileService, TileServiceBuilder};
pub use error::AppError;
