//! Keystep Netcode - Deterministic prediction and reconciliation
//!
//! This crate keeps a locally predicted simulation in sync with an
//! authoritative one running on another peer:
//!
//! - **Prediction**: the owning client simulates its inputs immediately
//! - **Reconciliation**: authoritative corrections rewind and replay
//! - **Observation**: other peers interpolate or extrapolate a
//!   lower-rate sync stream
//! - **Propagation**: dependent simulations follow a parent's rollback
//!
//! # Architecture
//!
//! ```text
//!  owning client                         authority
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │ produce input ─▶ predict │      │ ingest inputs ─▶ update  │
//! │      │                ▲  │ rpc  │      │                │  │
//! │      ▼                │  │ ───▶ │      ▼                ▼  │
//! │ input ring      reconcile│      │ input ring      sync ring│
//! │ sync ring  ◀──────────── │ ◀─── │          sync packets ───┼──▶ observers
//! └──────────────────────────┘      └──────────────────────────┘
//! ```
//!
//! One `NetSimulation` instance owns the keyframed buffer set, the tick
//! state, and one proxy per role; the host calls `tick` every frame with
//! its role, `reconcile` when network data has arrived, and
//! `serialize`/`deserialize` to move channel bytes.
//!
//! # Example
//!
//! ```rust,ignore
//! use keystep_core::{NetRole, ReplicationTarget};
//! use keystep_netcode::{InitParams, NetSimulation, TickParams};
//!
//! let mut sim: NetSimulation<MySimulation> = NetSimulation::new();
//! sim.initialize_for_role(NetRole::AutonomousProxy, &InitParams::default());
//!
//! // Client loop
//! loop {
//!     sim.tick(&mut driver, TickParams {
//!         role: NetRole::AutonomousProxy,
//!         local_delta_time_seconds: dt,
//!     });
//!     if sim.should_send_server_rpc(dt) {
//!         let mut bytes = Vec::new();
//!         sim.serialize(ReplicationTarget::ServerRpc, &mut bytes)?;
//!         send_to_server(bytes);
//!     }
//!     for packet in receive_from_server() {
//!         sim.deserialize(ReplicationTarget::AutonomousProxy, &packet)?;
//!     }
//!     sim.reconcile(NetRole::AutonomousProxy);
//! }
//! ```

mod buffers;
mod config;
mod debug_frame;
mod engine;
mod error;
mod link;
mod orchestrator;
mod pacer;
mod proxy;
mod tick_state;
pub mod wire;

pub use buffers::{InputFrame, SimBuffers};
pub use config::InitParams;
pub use debug_frame::{DebugFrame, HistoricBuffers};
pub use error::{Error, Result};
pub use link::{
    LinkId, RollbackParticipant, RollbackReport, RollbackStep, SharedParticipant, WeakParticipant,
};
pub use orchestrator::{NetSimulation, TickParams};
pub use pacer::ServerRpcPacer;
pub use proxy::{
    AutonomousPredictor, ReplayRecorder, ServerReceiver, SimulatedObserver, SimulatedUpdateMode,
};
pub use tick_state::TickState;

#[cfg(feature = "diagnostics")]
pub use proxy::DebugChannel;

// Re-export the core seams for convenience
pub use keystep_core::{Keyframe, NetRole, ReplicationTarget, SimTime, Simulation, SimulationDriver};
