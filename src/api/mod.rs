//! HTTP controllers, one module per spec §6 route group.

pub mod ops;
pub mod orders;
pub mod realtime;
