//! Viewer fan-out
//!
//! One [`BroadcastGroup`] task per stream pulls frames from the stream's
//! quality feeds and pushes them into each [`Viewer`]'s bounded outbound
//! channel. The [`Broadcaster`] owns the groups and joins viewers to them.
//!
//! # Lock order
//!
//! `Broadcaster::groups` is always taken before a group's viewer list. Frame
//! delivery only holds the viewer list, and never across an await point.

pub mod broadcaster;
pub mod group;
pub mod viewer;

pub use broadcaster::{BroadcastConfig, Broadcaster, Subscription};
pub use group::BroadcastGroup;
pub use viewer::Viewer;
