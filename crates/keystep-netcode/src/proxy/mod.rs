//! Role-specific replication proxies
//!
//! Each proxy owns one slice of the replication story and implements the
//! same triad - pre-tick, post-tick, reconcile - plus serialize and
//! deserialize for its channel. They are a closed set dispatched by role
//! at tick time, not a trait-object hierarchy: the orchestrator matches
//! on `NetRole` and calls the one proxy that applies.

mod autonomous;
mod replay;
mod server;
mod simulated;

#[cfg(feature = "diagnostics")]
mod debug_channel;

pub use autonomous::AutonomousPredictor;
pub use replay::ReplayRecorder;
pub use server::ServerReceiver;
pub(crate) use server::SyncChannel;
pub use simulated::{SimulatedObserver, SimulatedUpdateMode};

#[cfg(feature = "diagnostics")]
pub use debug_channel::DebugChannel;

use crate::buffers::SimBuffers;
use crate::tick_state::TickState;
use crate::wire::SyncPacket;
use keystep_core::Simulation;

/// Place an authoritative state at its keyframe, truncating any newer
/// local history, and move the clock to match. Shared by the predictor's
/// rollback and the observer's adoption paths.
pub(crate) fn adopt_authoritative<S: Simulation>(
    buffers: &mut SimBuffers<S>,
    tick_state: &mut TickState,
    packet: &SyncPacket<S::Sync, S::Aux>,
) {
    match packet.keyframe.checked_sub(1) {
        Some(previous) => {
            buffers.sync.reset_next_head_keyframe(previous);
            buffers.aux.reset_next_head_keyframe(previous);
        }
        None => {
            buffers.sync.clear();
            buffers.aux.clear();
        }
    }
    *buffers.sync.write_next() = packet.sync.clone();
    *buffers.aux.write_next() = packet.aux.clone();
    debug_assert_eq!(buffers.sync.head_keyframe(), Some(packet.keyframe));

    tick_state.set_last_processed_input_keyframe(packet.keyframe);
    tick_state.set_total_processed(packet.total_sim_time, packet.keyframe);
}
