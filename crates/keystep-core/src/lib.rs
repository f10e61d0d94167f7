//! Keystep Core - Shared types for the keystep simulation engine
//!
//! This crate provides the types every other keystep crate agrees on:
//! - `Keyframe` and fixed-point `SimTime` for bit-exact cross-peer arithmetic
//! - `NetRole` and `ReplicationTarget` for role dispatch
//! - The `Simulation` and `SimulationDriver` seams between engine,
//!   user code, and host

mod role;
mod simulation;
pub mod time;

pub use role::{NetRole, ReplicationTarget};
pub use simulation::{Simulation, SimulationDriver};
pub use time::{Keyframe, SimTime};
