//! Domain entity definitions

mod member;
mod message;
mod room;

pub use member::RoomMember;
pub use message::{RoomMessage, Sender};
pub use room::{Room, RoomPhase};
