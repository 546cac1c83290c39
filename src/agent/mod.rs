//! Storage node agent
//!
//! The remote peer run on every storage node: stores, serves and
//! deletes chunk blobs, registers itself with the coordinator and
//! answers heartbeats.

pub mod http;
pub mod server;
pub mod store;

pub use server::NodeAgent;
