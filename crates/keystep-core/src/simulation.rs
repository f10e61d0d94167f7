//! The two seams between the engine and user code
//!
//! `Simulation` is what the user supplies: the state triplet and the
//! deterministic update function. `SimulationDriver` is what the host
//! supplies: input production, initial state, and frame presentation.
//!
//! The engine never stores a driver; it borrows one for the duration of
//! each call, the same way storage backends are borrowed per operation
//! rather than owned.

use crate::SimTime;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A user-defined simulation: value types plus a deterministic step.
///
/// Determinism is the load-bearing contract: given identical prior sync
/// state and an identical input sequence, `update` must produce identical
/// results on every peer. No global reads, no wall-clock time, no
/// non-deterministic iteration orders.
pub trait Simulation: Sized + 'static {
    /// Per-frame input payload produced by the local driver.
    type Input: Clone + Default + Serialize + DeserializeOwned + 'static;

    /// The evolving simulation state; what peers compare and reconcile.
    type Sync: Clone + Default + PartialEq + Serialize + DeserializeOwned + 'static;

    /// Slowly-changing side input. Tracked per keyframe and compared
    /// exactly during reconcile.
    type Aux: Clone + Default + PartialEq + Serialize + DeserializeOwned + 'static;

    /// Identifier used by the host scheduler to group simulations.
    const GROUP_NAME: &'static str;

    /// Compute the state at the next keyframe from the previous state and
    /// the input for that keyframe. `aux` is the aux value valid at the
    /// keyframe being produced.
    fn update<D: SimulationDriver<Self>>(
        driver: &mut D,
        delta_seconds: f32,
        input: &Self::Input,
        prev: &Self::Sync,
        next: &mut Self::Sync,
        aux: &Self::Aux,
    );

    /// Equality tolerance used when comparing an authoritative state
    /// against a local prediction. Exact equality by default; override to
    /// ignore sub-epsilon drift in states that carry floats.
    fn sync_states_match(a: &Self::Sync, b: &Self::Sync) -> bool {
        a == b
    }

    /// Blend between two sync states for observer presentation.
    ///
    /// `alpha` is in `[0, 1]`: 0 is `from`, 1 is `to`. The default is a
    /// step function (snap to `to` only once the window completes), which
    /// is correct for any state without requiring it to be blendable.
    fn interpolate_sync(from: &Self::Sync, to: &Self::Sync, alpha: f32) -> Self::Sync {
        if alpha < 1.0 {
            from.clone()
        } else {
            to.clone()
        }
    }
}

/// The host object wrapping a simulation instance.
///
/// All callbacks must return without suspending; the tick is synchronous
/// and single-threaded.
pub trait SimulationDriver<S: Simulation> {
    /// Name for log lines and diagnostics.
    fn debug_name(&self) -> &str;

    /// Fully initialize a sync value. Called to seed keyframe 0 and to
    /// recover from continuity breaks.
    fn init_sync_state(&mut self, state: &mut S::Sync);

    /// Fill a new input command for the current local frame. `sim_time`
    /// is the total simulation time processed so far.
    fn produce_input(&mut self, sim_time: SimTime, input: &mut S::Input);

    /// Present a newly advanced sync head to the host.
    fn finalize_frame(&mut self, state: &S::Sync);
}
