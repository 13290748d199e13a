//! Stream registry for producer/viewer routing
//!
//! The registry tracks which camera streams have live producers. Every
//! (stream, quality) pair gets a bounded drop-oldest frame channel; the
//! producer connection keeps the sending half and the registry parks the
//! receiving half until a broadcast group claims it.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Id,    │
//!                     │   ProducerStream {      │
//!                     │     Low  -> receiver,   │
//!                     │     High -> receiver,   │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Producer Low]         [Producer High]        [BroadcastGroup]
//!    tx.send(frame)         tx.send(frame)         output_channel()
//!         │                       │                       │
//!         └──────────► frame channel ───────────► rx.recv() ──► viewers
//! ```
//!
//! The broadcast side only sees the [`StreamSource`] and [`StreamConnection`]
//! traits.

pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod source;
pub mod store;

pub use config::RegistryConfig;
pub use entry::ProducerStream;
pub use error::RegistryError;
pub use frame::{Frame, StreamId};
pub use source::{StreamConnection, StreamSource};
pub use store::StreamRegistry;
