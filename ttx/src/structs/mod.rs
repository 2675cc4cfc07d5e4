//! Data structures representing teletext components.
//!
//! Contains cached pages and their addressing, per-magazine reception
//! buffers, packet field decoding and the Broadcast Service Data.

pub mod magazine;
pub mod packet;
pub mod page;
pub mod service_data;
