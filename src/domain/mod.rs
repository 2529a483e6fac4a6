//! Plain domain types, decoupled from their SQLite row encoding.
//!
//! Spec §9 flags "shared ORM documents as typed payloads across layers" as
//! a pattern to re-architect away from; these structs are never written
//! directly to or read directly from a `rusqlite::Row` — that translation
//! happens in `crate::db`.

pub mod audit;
pub mod campaign;
pub mod invite;
pub mod misc;
pub mod order;
pub mod payout;
pub mod user;
pub mod wallet;

pub use audit::*;
pub use campaign::*;
pub use invite::*;
pub use misc::*;
pub use order::*;
pub use payout::*;
pub use user::*;
pub use wallet::*;
