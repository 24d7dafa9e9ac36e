//! # Convoroom Rooms Crate
//!
//! This crate provides the real-time room broadcast core for Convoroom.
//! It contains the room registry, connection manager, broadcast router,
//! history buffer, and lifecycle controller, composed behind a single
//! [`RoomService`] facade.
//!
//! ## Architecture
//!
//! - **Entities**: Domain models (Room, RoomMember, RoomMessage)
//! - **Registry**: Room ownership, admission, capacity enforcement
//! - **Connections**: Live connection bindings and fan-out sets
//! - **Broadcast**: Sequenced message fan-out to bound connections
//! - **History**: Bounded per-room message log and sequence allocation
//! - **Lifecycle**: Open → Closing → Closed orchestration, idle reaping
//! - **Collaborators**: Trait seams for persistence and response generation
//!
//! Everything outside the room core — HTTP routing, authentication, the AI
//! model, the storage engine — lives behind the collaborator traits.

pub mod broadcast;
pub mod collaborators;
pub mod connections;
pub mod entities;
pub mod history;
pub mod lifecycle;
pub mod registry;
pub mod service;
pub mod types;

mod retry;

// Re-export main types for convenience
pub use collaborators::{DurableStore, NullStore, ResponseGenerator};
pub use connections::{BoundConnection, ConnectionManager};
pub use entities::{Room, RoomMember, RoomMessage, RoomPhase, Sender};
pub use history::HistoryBuffer;
pub use lifecycle::LifecycleController;
pub use registry::{Admission, RoomRegistry};
pub use service::{JoinedRoom, PublishReceipt, RoomService};
pub use types::{RoomError, RoomEvent, RoomResult};
