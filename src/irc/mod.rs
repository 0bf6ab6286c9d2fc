//! IRC protocol layer: line grammar, handler dispatch, join gate and the
//! connection pipeline.

pub mod error;
pub mod gate;
pub mod handler;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod transport;
