//! Services served by the gateway binary.

pub mod pingpong;
