//! The observer's smoothing proxy
//!
//! Observers receive the authority's sync stream at a lower rate than
//! they render. This proxy either interpolates presentation between
//! received states behind a small delay window, or extrapolates forward
//! from the newest received state with a synthesized input and lets the
//! next received state correct it.

use crate::buffers::SimBuffers;
use crate::error::Result;
use crate::link::RollbackReport;
use crate::proxy::adopt_authoritative;
use crate::tick_state::TickState;
use crate::wire::{self, SyncPacket};
use keystep_core::{Keyframe, SimTime, Simulation, SimulationDriver};
use std::collections::VecDeque;
use tracing::debug;

/// How the observer advances between received sync states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedUpdateMode {
    /// Present a blend toward the latest received state, staying
    /// `delay_keyframes` behind it so there is usually a next state to
    /// blend toward.
    Interpolate {
        /// Keyframes of delay behind the newest received state
        delay_keyframes: u32,
    },
    /// Run the update function forward past the newest received state
    /// with a default input, accepting corrections on receipt.
    Extrapolate,
}

impl Default for SimulatedUpdateMode {
    fn default() -> Self {
        SimulatedUpdateMode::Interpolate { delay_keyframes: 2 }
    }
}

/// Received states kept for smoothing; old entries beyond this are
/// dropped regardless of the sync ring's capacity.
const RECEIVED_RETENTION: usize = 32;

/// Client-side observer of a remotely owned simulation.
pub struct SimulatedObserver<S: Simulation> {
    mode: SimulatedUpdateMode,
    /// Decoded sync packets awaiting reconcile
    inbox: VecDeque<SyncPacket<S::Sync, S::Aux>>,
    /// Reconciled packets ordered by keyframe, oldest first
    received: VecDeque<SyncPacket<S::Sync, S::Aux>>,
    /// Wall time accumulated toward the next interpolation target
    interp_elapsed: f32,
}

impl<S: Simulation> SimulatedObserver<S> {
    pub fn new() -> Self {
        Self {
            mode: SimulatedUpdateMode::default(),
            inbox: VecDeque::new(),
            received: VecDeque::new(),
            interp_elapsed: 0.0,
        }
    }

    /// The active smoothing mode.
    pub fn simulated_update_mode(&self) -> SimulatedUpdateMode {
        self.mode
    }

    pub fn set_simulated_update_mode(&mut self, mode: SimulatedUpdateMode) {
        self.mode = mode;
    }

    /// Decode one authoritative sync packet into the inbox.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        self.inbox.push_back(wire::decode(bytes)?);
        Ok(())
    }

    /// Fold newly received states into the smoothing window. In
    /// extrapolate mode, a received state that contradicts what was
    /// extrapolated at its keyframe rewinds the local history and
    /// returns a rollback window for dependents.
    pub fn reconcile(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
    ) -> Option<RollbackReport> {
        let mut report = None;
        while let Some(packet) = self.inbox.pop_front() {
            if matches!(self.mode, SimulatedUpdateMode::Extrapolate) {
                let diverged = buffers
                    .sync
                    .find(packet.keyframe)
                    .is_some_and(|local| !S::sync_states_match(local, &packet.sync));
                if diverged {
                    debug!(
                        keyframe = packet.keyframe,
                        "extrapolation diverged from received state; correcting"
                    );
                    let previous_total = tick_state.total_processed_sim_time();
                    adopt_authoritative(buffers, tick_state, &packet);
                    report = Some(RollbackReport {
                        delta: previous_total.saturating_sub(packet.total_sim_time),
                        keyframe: packet.keyframe,
                        steps: Vec::new(),
                    });
                }
            }
            self.store_received(packet);
        }
        report
    }

    fn store_received(&mut self, packet: SyncPacket<S::Sync, S::Aux>) {
        match self
            .received
            .iter()
            .position(|p| p.keyframe >= packet.keyframe)
        {
            Some(index) if self.received[index].keyframe == packet.keyframe => {
                self.received[index] = packet;
            }
            Some(index) => self.received.insert(index, packet),
            None => self.received.push_back(packet),
        }
        while self.received.len() > RECEIVED_RETENTION {
            self.received.pop_front();
        }
    }

    /// Advance presentation toward the received stream, per the active
    /// mode. The consumption loop never runs for observers (they have no
    /// inputs), so all forward motion happens here.
    pub fn pre_sim_tick<D: SimulationDriver<S>>(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
        driver: &mut D,
        local_delta_seconds: f32,
    ) {
        match self.mode {
            SimulatedUpdateMode::Interpolate { delay_keyframes } => {
                self.interpolate_tick(buffers, tick_state, driver, local_delta_seconds, delay_keyframes)
            }
            SimulatedUpdateMode::Extrapolate => {
                self.extrapolate_tick(buffers, tick_state, driver, local_delta_seconds)
            }
        }
    }

    fn interpolate_tick<D: SimulationDriver<S>>(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
        driver: &mut D,
        local_delta_seconds: f32,
        delay_keyframes: u32,
    ) {
        let Some(latest) = self.received.back().map(|p| p.keyframe) else {
            return;
        };
        let present_up_to = latest.saturating_sub(delay_keyframes);

        let mut adopted = false;
        for packet in &self.received {
            let head = buffers.sync.head_keyframe();
            let is_newer = head.map_or(true, |h| packet.keyframe > h);
            if packet.keyframe <= present_up_to && is_newer {
                adopt_authoritative(buffers, tick_state, packet);
                adopted = true;
            }
        }
        if adopted {
            self.interp_elapsed = 0.0;
        } else {
            self.interp_elapsed += local_delta_seconds.max(0.0);
        }

        let Some(head) = buffers.sync.head_keyframe() else {
            return;
        };
        let Some(from) = buffers.sync.find(head) else {
            return;
        };
        let presentation = match self.received.iter().find(|p| p.keyframe > head) {
            Some(next) => {
                let window = next
                    .total_sim_time
                    .saturating_sub(tick_state.total_processed_sim_time())
                    .as_seconds();
                let alpha = if window <= f32::EPSILON {
                    1.0
                } else {
                    (self.interp_elapsed / window).clamp(0.0, 1.0)
                };
                S::interpolate_sync(from, &next.sync, alpha)
            }
            None => from.clone(),
        };
        driver.finalize_frame(&presentation);
    }

    fn extrapolate_tick<D: SimulationDriver<S>>(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
        driver: &mut D,
        local_delta_seconds: f32,
    ) {
        // Adopt everything received that is newer than local history
        for packet in &self.received {
            let head = buffers.sync.head_keyframe();
            if head.map_or(true, |h| packet.keyframe > h) {
                adopt_authoritative(buffers, tick_state, packet);
            }
        }

        let Some(head) = buffers.sync.head_keyframe() else {
            return;
        };
        let delta = SimTime::from_seconds(local_delta_seconds);
        if delta.is_zero() {
            return;
        }
        let Some(prev) = buffers.sync.find(head).cloned() else {
            return;
        };
        let aux = buffers.aux.find(head).cloned().unwrap_or_default();
        let synthesized = S::Input::default();

        let next = buffers.sync.write_next();
        S::update(driver, delta.as_seconds(), &synthesized, &prev, next, &aux);
        *buffers.aux.write_next() = aux;

        let extrapolated = head + 1;
        tick_state.increment_processed(delta, extrapolated);
        tick_state.set_last_processed_input_keyframe(extrapolated);

        if let Some(state) = buffers.sync.find(extrapolated) {
            driver.finalize_frame(state);
        }
    }

    /// Observers emit nothing; the triad is kept for ordering symmetry.
    pub fn post_sim_tick(&mut self) {}

    /// Observers have no outbound channel.
    pub fn dirty_count(&self) -> usize {
        0
    }

    /// Newest received keyframe, if anything has arrived.
    pub fn latest_received_keyframe(&self) -> Option<Keyframe> {
        self.received.back().map(|p| p.keyframe)
    }
}

impl<S: Simulation> Default for SimulatedObserver<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InitParams;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct State {
        value: i64,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Command {
        value: i64,
    }

    struct Fixture;

    impl Simulation for Fixture {
        type Input = Command;
        type Sync = State;
        type Aux = ();

        const GROUP_NAME: &'static str = "simulated-fixture";

        fn update<D: SimulationDriver<Self>>(
            _driver: &mut D,
            _delta_seconds: f32,
            input: &Command,
            prev: &State,
            next: &mut State,
            _aux: &(),
        ) {
            // Default input drifts by one per extrapolated frame
            next.value = prev.value + input.value + 1;
        }

        fn interpolate_sync(from: &State, to: &State, alpha: f32) -> State {
            State {
                value: from.value + ((to.value - from.value) as f32 * alpha).round() as i64,
            }
        }
    }

    struct Driver {
        presented: Vec<i64>,
    }

    impl Driver {
        fn new() -> Self {
            Self {
                presented: Vec::new(),
            }
        }
    }

    impl SimulationDriver<Fixture> for Driver {
        fn debug_name(&self) -> &str {
            "simulated-test"
        }

        fn init_sync_state(&mut self, state: &mut State) {
            state.value = 0;
        }

        fn produce_input(&mut self, _sim_time: SimTime, _input: &mut Command) {}

        fn finalize_frame(&mut self, state: &State) {
            self.presented.push(state.value);
        }
    }

    fn setup() -> (SimulatedObserver<Fixture>, SimBuffers<Fixture>, TickState) {
        let mut buffers: SimBuffers<Fixture> = SimBuffers::new();
        buffers.resize(&InitParams::default());
        let mut tick_state = TickState::new();
        tick_state.set_time_capacity(32);
        (SimulatedObserver::new(), buffers, tick_state)
    }

    fn receive(observer: &mut SimulatedObserver<Fixture>, keyframe: Keyframe, value: i64) {
        let packet: SyncPacket<State, ()> = SyncPacket {
            keyframe,
            total_sim_time: SimTime::from_micros(10_000 * keyframe as u64),
            sync: State { value },
            aux: (),
        };
        let mut bytes = Vec::new();
        wire::encode(&packet, &mut bytes).unwrap();
        observer.deserialize(&bytes).unwrap();
    }

    #[test]
    fn test_interpolate_adopts_behind_delay_window() {
        let (mut observer, mut buffers, mut tick_state) = setup();
        let mut driver = Driver::new();

        for keyframe in 1..=5 {
            receive(&mut observer, keyframe, keyframe as i64 * 10);
        }
        observer.reconcile(&mut buffers, &mut tick_state);
        observer.pre_sim_tick(&mut buffers, &mut tick_state, &mut driver, 0.016);

        // Delay of 2 behind latest (5): adopted up to keyframe 3
        assert_eq!(buffers.sync.head_keyframe(), Some(3));
        assert_eq!(tick_state.last_processed_input_keyframe(), 3);
        // Presentation happened
        assert_eq!(driver.presented.len(), 1);
    }

    #[test]
    fn test_interpolate_blends_toward_next_state() {
        let (mut observer, mut buffers, mut tick_state) = setup();
        let mut driver = Driver::new();

        receive(&mut observer, 1, 0);
        receive(&mut observer, 2, 100);
        receive(&mut observer, 3, 100);
        observer.set_simulated_update_mode(SimulatedUpdateMode::Interpolate {
            delay_keyframes: 2,
        });
        observer.reconcile(&mut buffers, &mut tick_state);

        // First tick adopts keyframe 1 (total time 10ms); next received is
        // keyframe 2, 10ms ahead.
        observer.pre_sim_tick(&mut buffers, &mut tick_state, &mut driver, 0.005);
        // Second tick: no new adoption, elapsed 5ms of the 10ms window
        observer.pre_sim_tick(&mut buffers, &mut tick_state, &mut driver, 0.005);

        assert_eq!(driver.presented[0], 0);
        assert_eq!(driver.presented[1], 50);
    }

    #[test]
    fn test_extrapolate_steps_past_received_head() {
        let (mut observer, mut buffers, mut tick_state) = setup();
        let mut driver = Driver::new();

        observer.set_simulated_update_mode(SimulatedUpdateMode::Extrapolate);
        receive(&mut observer, 1, 10);
        observer.reconcile(&mut buffers, &mut tick_state);
        observer.pre_sim_tick(&mut buffers, &mut tick_state, &mut driver, 0.016);

        // Adopted keyframe 1, then extrapolated keyframe 2 with the
        // default input (+1 drift)
        assert_eq!(buffers.sync.head_keyframe(), Some(2));
        assert_eq!(buffers.sync.find(2), Some(&State { value: 11 }));
        assert_eq!(tick_state.last_processed_input_keyframe(), 2);
    }

    #[test]
    fn test_extrapolation_divergence_corrects_and_reports() {
        let (mut observer, mut buffers, mut tick_state) = setup();
        let mut driver = Driver::new();

        observer.set_simulated_update_mode(SimulatedUpdateMode::Extrapolate);
        receive(&mut observer, 1, 10);
        observer.reconcile(&mut buffers, &mut tick_state);
        observer.pre_sim_tick(&mut buffers, &mut tick_state, &mut driver, 0.016);
        assert_eq!(buffers.sync.find(2), Some(&State { value: 11 }));

        // Authority says keyframe 2 was 20, not the extrapolated 11
        receive(&mut observer, 2, 20);
        let report = observer
            .reconcile(&mut buffers, &mut tick_state)
            .expect("divergent extrapolation must report a rollback");

        assert_eq!(report.keyframe, 2);
        assert!(report.steps.is_empty());
        assert_eq!(buffers.sync.find(2), Some(&State { value: 20 }));
    }

    #[test]
    fn test_received_packets_stay_ordered() {
        let (mut observer, mut buffers, mut tick_state) = setup();

        receive(&mut observer, 3, 30);
        receive(&mut observer, 1, 10);
        receive(&mut observer, 2, 20);
        receive(&mut observer, 2, 25); // replacement
        observer.reconcile(&mut buffers, &mut tick_state);

        let keyframes: Vec<Keyframe> =
            observer.received.iter().map(|p| p.keyframe).collect();
        assert_eq!(keyframes, vec![1, 2, 3]);
        assert_eq!(observer.received[1].sync.value, 25);
        assert_eq!(observer.latest_received_keyframe(), Some(3));
    }
}
