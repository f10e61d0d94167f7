//! The budgeted input-consumption loop
//!
//! One call to [`advance`] consumes as many pending input keyframes as
//! the time budget allows, producing one new sync state per input via
//! `Simulation::update`. The loop never skips a gap in the input stream
//! and never advances past `max_allowed_input_keyframe`.

use crate::buffers::SimBuffers;
use crate::tick_state::TickState;
use keystep_core::{Keyframe, Simulation, SimulationDriver};
use tracing::warn;

/// What one advance pass did.
#[derive(Debug, Default)]
pub(crate) struct AdvanceOutcome {
    /// Input keyframes consumed, in order
    pub consumed: Vec<Keyframe>,
}

/// Consume pending inputs up to the budget, writing new sync states.
///
/// Ordering per call: advance condition, sync continuity check, then the
/// consumption loop, then one `finalize_frame` presenting the new head.
pub(crate) fn advance<S, D>(
    buffers: &mut SimBuffers<S>,
    tick_state: &mut TickState,
    staged_aux: &mut Option<S::Aux>,
    driver: &mut D,
) -> AdvanceOutcome
where
    S: Simulation,
    D: SimulationDriver<S>,
{
    let mut outcome = AdvanceOutcome::default();

    // Only enter the loop when inputs exist beyond the sync head. An
    // empty sync ring counts as head 0: the seed slot is written lazily,
    // on the first tick that actually has an input to consume.
    let input_head = buffers.input.head_keyframe().unwrap_or(0);
    let sync_head = buffers.sync.head_keyframe().unwrap_or(0);
    if input_head <= sync_head {
        return outcome;
    }

    let last_processed = tick_state.last_processed_input_keyframe();
    if buffers.sync.head_keyframe() != Some(last_processed) {
        let first_run = buffers.sync.is_empty() && last_processed == 0;
        if !first_run {
            warn!(
                driver = driver.debug_name(),
                sync_head = ?buffers.sync.head_keyframe(),
                last_processed, "sync head out of step with processed inputs; reseeding"
            );
        }
        reseed_sync(buffers, tick_state, driver, last_processed);
    }

    loop {
        let previous_keyframe = tick_state.last_processed_input_keyframe();
        let next_keyframe = previous_keyframe + 1;
        if next_keyframe > tick_state.max_allowed_input_keyframe() {
            break;
        }
        // A missing keyframe ends consumption for this tick; the engine
        // never advances across a gap.
        let Some(frame) = buffers.input.find(next_keyframe) else {
            break;
        };
        let delta = frame.delta;
        if tick_state.remaining_allowed_sim_time() < delta {
            break;
        }
        let command = frame.command.clone();

        let prev = buffers
            .sync
            .find(previous_keyframe)
            .cloned()
            .expect("prior sync state must be retained while consuming inputs");
        let aux = staged_aux
            .take()
            .or_else(|| buffers.aux.find(previous_keyframe).cloned())
            .unwrap_or_default();

        let next = buffers.sync.write_next();
        S::update(driver, delta.as_seconds(), &command, &prev, next, &aux);
        debug_assert_eq!(buffers.sync.head_keyframe(), Some(next_keyframe));
        *buffers.aux.write_next() = aux;

        tick_state.consume_budget(delta);
        tick_state.increment_processed(delta, next_keyframe);
        tick_state.set_last_processed_input_keyframe(next_keyframe);
        outcome.consumed.push(next_keyframe);
    }

    if !outcome.consumed.is_empty() {
        if let Some(head) = buffers.sync.head_keyframe() {
            if let Some(state) = buffers.sync.find(head) {
                driver.finalize_frame(state);
            }
        }
    }

    outcome
}

/// Re-anchor the sync (and aux) rings so their head sits at
/// `last_processed`, with the sync value freshly driver-seeded. Handles
/// both the first-run seed of keyframe 0 and recovery from a continuity
/// break.
fn reseed_sync<S, D>(
    buffers: &mut SimBuffers<S>,
    tick_state: &mut TickState,
    driver: &mut D,
    last_processed: Keyframe,
) where
    S: Simulation,
    D: SimulationDriver<S>,
{
    let carried_aux = buffers
        .aux
        .head_keyframe()
        .and_then(|head| buffers.aux.find(head))
        .cloned()
        .unwrap_or_default();

    match last_processed.checked_sub(1) {
        Some(previous) => {
            buffers.sync.reset_next_head_keyframe(previous);
            buffers.aux.reset_next_head_keyframe(previous);
        }
        None => {
            buffers.sync.clear();
            buffers.aux.clear();
        }
    }

    let state = buffers.sync.write_next();
    driver.init_sync_state(state);
    *buffers.aux.write_next() = carried_aux;
    debug_assert_eq!(buffers.sync.head_keyframe(), Some(last_processed));

    tick_state.restamp(last_processed);
}
