//! The top-level simulation object
//!
//! `NetSimulation` owns the buffer set, the tick state, one proxy per
//! role, the replay recorder, the RPC pacer, and its node in the
//! dependent graph. The driver is borrowed per call, never stored.
//!
//! Everything here is single-threaded by contract: one thread per
//! instance, and a parent shares its thread with its dependents.

use crate::buffers::{InputFrame, SimBuffers};
use crate::config::InitParams;
use crate::debug_frame::{DebugFrame, HistoricBuffers};
use crate::engine::{self, AdvanceOutcome};
use crate::error::Result;
use crate::link::{
    LinkId, LinkNode, RollbackParticipant, SharedParticipant, WeakParticipant,
};
use crate::pacer::ServerRpcPacer;
use crate::proxy::{
    AutonomousPredictor, ReplayRecorder, ServerReceiver, SimulatedObserver, SimulatedUpdateMode,
    SyncChannel,
};
use crate::tick_state::TickState;
use keystep_core::{Keyframe, NetRole, ReplicationTarget, SimTime, Simulation, SimulationDriver};
use tracing::{debug, trace};

#[cfg(feature = "diagnostics")]
use crate::proxy::DebugChannel;

/// Per-call tick parameters.
#[derive(Debug, Clone, Copy)]
pub struct TickParams {
    /// The role this peer plays for the instance
    pub role: NetRole,
    /// Host frame delta, in seconds
    pub local_delta_time_seconds: f32,
}

/// A rollback window received from a parent, applied at the next tick.
struct PendingRollback {
    parent_keyframe: Keyframe,
    delta: SimTime,
    steps_seen: u32,
    finalized: bool,
}

/// One networked simulation instance.
pub struct NetSimulation<S: Simulation> {
    buffers: SimBuffers<S>,
    tick_state: TickState,
    server: ServerReceiver<S>,
    autonomous: AutonomousPredictor<S>,
    simulated: SimulatedObserver<S>,
    replay: ReplayRecorder<S>,
    #[cfg(feature = "diagnostics")]
    debug_channel: DebugChannel,
    #[cfg(feature = "diagnostics")]
    historic: Option<HistoricBuffers>,
    pacer: ServerRpcPacer,
    link: LinkNode,
    /// Aux change staged by the host, applied from the next consumed
    /// keyframe onward
    staged_aux: Option<S::Aux>,
    pending_rollback: Option<PendingRollback>,
    global_frame: u64,
}

impl<S: Simulation> NetSimulation<S> {
    pub fn new() -> Self {
        Self {
            buffers: SimBuffers::new(),
            tick_state: TickState::new(),
            server: ServerReceiver::new(),
            autonomous: AutonomousPredictor::new(),
            simulated: SimulatedObserver::new(),
            replay: ReplayRecorder::new(),
            #[cfg(feature = "diagnostics")]
            debug_channel: DebugChannel::new(),
            #[cfg(feature = "diagnostics")]
            historic: None,
            pacer: ServerRpcPacer::new(),
            link: LinkNode::new(),
            staged_aux: None,
            pending_rollback: None,
            global_frame: 0,
        }
    }

    /// Size every buffer and seed the keyframe-0 input sentinel. Must be
    /// called before the first tick.
    pub fn initialize_for_role(&mut self, role: NetRole, params: &InitParams) {
        debug!(?role, group = S::GROUP_NAME, "initializing simulation buffers");
        self.buffers.resize(params);
        // The empty sentinel occupies keyframe 0 and is never consumed
        *self.buffers.input.write_next() = InputFrame::default();

        self.tick_state = TickState::new();
        self.tick_state.set_time_capacity(params.synced_buffer_size);
        self.replay.set_capacity(params.replay_window_size);
        #[cfg(feature = "diagnostics")]
        {
            self.historic = (params.historic_buffer_size > 0)
                .then(|| HistoricBuffers::new(params.historic_buffer_size));
        }
        self.staged_aux = None;
        self.pending_rollback = None;
        self.global_frame = 0;
    }

    /// Run one tick: apply any propagated rollback, stamp diagnostics,
    /// run the role's pre-tick, consume inputs up to the budget, run the
    /// role's post-tick, and finalize diagnostics.
    pub fn tick<D: SimulationDriver<S>>(&mut self, driver: &mut D, params: TickParams) {
        self.apply_pending_rollback();

        self.debug_pre_record(params.role);
        self.debug_open_slot(&params);

        match params.role {
            NetRole::Authority => {
                self.server.pre_sim_tick(&mut self.buffers, &mut self.tick_state)
            }
            NetRole::AutonomousProxy => self.autonomous.pre_sim_tick(
                &mut self.buffers,
                &mut self.tick_state,
                driver,
                params.local_delta_time_seconds,
            ),
            NetRole::SimulatedProxy => self.simulated.pre_sim_tick(
                &mut self.buffers,
                &mut self.tick_state,
                driver,
                params.local_delta_time_seconds,
            ),
        }

        let outcome = engine::advance(
            &mut self.buffers,
            &mut self.tick_state,
            &mut self.staged_aux,
            driver,
        );
        for keyframe in &outcome.consumed {
            if let Some(state) = self.buffers.sync.find(*keyframe) {
                self.replay.record(*keyframe, state.clone());
            }
        }

        match params.role {
            NetRole::Authority => self.server.post_sim_tick(&self.buffers),
            NetRole::AutonomousProxy => self.autonomous.post_sim_tick(&self.buffers),
            NetRole::SimulatedProxy => self.simulated.post_sim_tick(),
        }

        self.debug_finalize(&outcome);
        self.global_frame += 1;
    }

    /// Process network updates received since the last tick, correcting
    /// local state where the authority disagrees. Completes any dependent
    /// rollback propagation before returning.
    pub fn reconcile(&mut self, role: NetRole) {
        let report = match role {
            NetRole::Authority => {
                self.server.reconcile();
                None
            }
            NetRole::AutonomousProxy => self
                .autonomous
                .reconcile(&mut self.buffers, &mut self.tick_state),
            NetRole::SimulatedProxy => self
                .simulated
                .reconcile(&mut self.buffers, &mut self.tick_state),
        };
        if let Some(report) = report {
            self.link.dispatch_rollback(&report);
        }
    }

    /// Emit the named channel's pending bytes onto `out`.
    pub fn serialize(&mut self, target: ReplicationTarget, out: &mut Vec<u8>) -> Result<()> {
        match target {
            ReplicationTarget::ServerRpc => self.autonomous.serialize(&self.buffers, out),
            ReplicationTarget::AutonomousProxy => self.server.serialize_sync(
                &self.buffers,
                &self.tick_state,
                SyncChannel::Autonomous,
                out,
            ),
            ReplicationTarget::SimulatedProxy => self.server.serialize_sync(
                &self.buffers,
                &self.tick_state,
                SyncChannel::Simulated,
                out,
            ),
            ReplicationTarget::Replay => self.replay.serialize(out),
            ReplicationTarget::Debug => {
                #[cfg(feature = "diagnostics")]
                {
                    self.debug_channel.serialize(out)
                }
                #[cfg(not(feature = "diagnostics"))]
                {
                    let _ = out;
                    Ok(())
                }
            }
        }
    }

    /// Ingest bytes produced by the matching proxy on the remote peer.
    pub fn deserialize(&mut self, target: ReplicationTarget, bytes: &[u8]) -> Result<()> {
        match target {
            ReplicationTarget::ServerRpc => self.server.deserialize(bytes),
            ReplicationTarget::AutonomousProxy => self.autonomous.deserialize(bytes),
            ReplicationTarget::SimulatedProxy => self.simulated.deserialize(bytes),
            ReplicationTarget::Replay => self.replay.deserialize(bytes),
            ReplicationTarget::Debug => {
                #[cfg(feature = "diagnostics")]
                {
                    self.debug_channel.deserialize(bytes)
                }
                #[cfg(not(feature = "diagnostics"))]
                {
                    let _ = bytes;
                    Ok(())
                }
            }
        }
    }

    /// How much the named channel has pending.
    pub fn dirty_count(&self, target: ReplicationTarget) -> usize {
        match target {
            ReplicationTarget::ServerRpc => self.autonomous.dirty_count(),
            ReplicationTarget::AutonomousProxy => {
                self.server.dirty_count(SyncChannel::Autonomous)
            }
            ReplicationTarget::SimulatedProxy => {
                self.server.dirty_count(SyncChannel::Simulated)
            }
            ReplicationTarget::Replay => self.replay.dirty_count(),
            ReplicationTarget::Debug => {
                #[cfg(feature = "diagnostics")]
                {
                    self.debug_channel.dirty_count()
                }
                #[cfg(not(feature = "diagnostics"))]
                {
                    0
                }
            }
        }
    }

    // --- aux -------------------------------------------------------------

    /// Stage an aux change; it takes effect from the next consumed
    /// keyframe and is tracked per keyframe thereafter.
    pub fn set_aux_state(&mut self, aux: S::Aux) {
        self.staged_aux = Some(aux);
    }

    /// The aux value the next consumed keyframe will see.
    pub fn current_aux_state(&self) -> Option<&S::Aux> {
        self.staged_aux.as_ref().or_else(|| {
            let head = self.buffers.aux.head_keyframe()?;
            self.buffers.aux.find(head)
        })
    }

    // --- RPC pacing ------------------------------------------------------

    /// Set how often the server-RPC channel should flush, in Hz.
    pub fn set_desired_server_rpc_send_frequency(&mut self, hz: f32) {
        self.pacer.set_desired_send_frequency(hz);
    }

    /// Account frame time toward the next server-RPC send.
    pub fn should_send_server_rpc(&mut self, dt_seconds: f32) -> bool {
        self.pacer.should_send(dt_seconds)
    }

    // --- dependent graph -------------------------------------------------

    /// Stable id of this instance in the dependent graph.
    pub fn link_id(&self) -> LinkId {
        self.link.id()
    }

    /// Install a parent edge. Panics if doing so would create a cycle.
    pub fn set_parent(&mut self, parent: &SharedParticipant) {
        self.link.set_parent(parent);
    }

    /// The parent, if one is set and still alive.
    pub fn parent(&self) -> Option<SharedParticipant> {
        self.link.parent_rc()
    }

    /// Register a dependent whose rollback follows this instance's.
    pub fn add_dependent(&mut self, dependent: &SharedParticipant) {
        self.link.add_dependent(dependent);
    }

    /// Remove one dependent edge, clearing its parent link in turn.
    pub fn remove_dependent(&mut self, dependent: &SharedParticipant) {
        if let Ok(mut guard) = dependent.try_borrow_mut() {
            self.link.remove_dependent(guard.link_id());
            guard.clear_parent_link();
        }
    }

    /// Drop every dependent edge, clearing their parent links in turn.
    pub fn clear_all_dependents(&mut self) {
        for weak in self.link.take_dependents() {
            if let Some(dependent) = weak.upgrade() {
                if let Ok(mut guard) = dependent.try_borrow_mut() {
                    guard.clear_parent_link();
                }
            }
        }
    }

    /// Number of live registered dependents.
    pub fn dependent_count(&self) -> usize {
        self.link.dependent_count()
    }

    // --- rollback propagation (called by the parent) ---------------------

    /// A parent's reconcile rewound `delta` back to `parent_keyframe`;
    /// arm a matching rewind here.
    pub fn begin_rollback(&mut self, delta: SimTime, parent_keyframe: Keyframe) {
        trace!(parent_keyframe, "rollback window opened by parent");
        self.pending_rollback = Some(PendingRollback {
            parent_keyframe,
            delta,
            steps_seen: 0,
            finalized: false,
        });
    }

    /// One keyframe of the parent's replay window. The final step arms
    /// the rewind; it is applied at the start of the next tick, after
    /// which this instance's own retained inputs replay.
    pub fn step_rollback(&mut self, step: SimTime, parent_keyframe: Keyframe, is_final_step: bool) {
        let _ = (step, parent_keyframe);
        if let Some(pending) = &mut self.pending_rollback {
            pending.steps_seen += 1;
            if is_final_step {
                pending.finalized = true;
            }
        }
    }

    fn apply_pending_rollback(&mut self) {
        if !self
            .pending_rollback
            .as_ref()
            .is_some_and(|pending| pending.finalized)
        {
            return;
        }
        let Some(pending) = self.pending_rollback.take() else {
            return;
        };
        let keyframe = pending.parent_keyframe;
        debug!(
            keyframe,
            steps = pending.steps_seen,
            "applying rollback window propagated by parent"
        );

        // Keep our own state at the window's base keyframe and truncate
        // everything after it; the retained inputs replay this tick.
        self.buffers.sync.reset_next_head_keyframe(keyframe);
        self.buffers.aux.reset_next_head_keyframe(keyframe);
        self.tick_state.set_last_processed_input_keyframe(keyframe);

        let previous_total = self.tick_state.total_processed_sim_time();
        let total = self
            .tick_state
            .processed_time_at(keyframe)
            .unwrap_or_else(|| previous_total.saturating_sub(pending.delta));
        self.tick_state.set_total_processed(total, keyframe);
        self.tick_state
            .refill_budget(previous_total.saturating_sub(total));
    }

    // --- observer mode ---------------------------------------------------

    /// The simulated-observer smoothing mode.
    pub fn simulated_update_mode(&self) -> SimulatedUpdateMode {
        self.simulated.simulated_update_mode()
    }

    pub fn set_simulated_update_mode(&mut self, mode: SimulatedUpdateMode) {
        self.simulated.set_simulated_update_mode(mode);
    }

    // --- introspection ---------------------------------------------------

    pub fn buffers(&self) -> &SimBuffers<S> {
        &self.buffers
    }

    /// Mutable buffer access, for hosts that need to inspect or repair
    /// history directly.
    pub fn buffers_mut(&mut self) -> &mut SimBuffers<S> {
        &mut self.buffers
    }

    pub fn tick_state(&self) -> &TickState {
        &self.tick_state
    }

    pub fn tick_state_mut(&mut self) -> &mut TickState {
        &mut self.tick_state
    }

    pub fn last_processed_input_keyframe(&self) -> Keyframe {
        self.tick_state.last_processed_input_keyframe()
    }

    pub fn total_processed_sim_time(&self) -> SimTime {
        self.tick_state.total_processed_sim_time()
    }

    pub fn global_frame(&self) -> u64 {
        self.global_frame
    }

    /// The replay window, oldest first.
    pub fn replay_frames(&self) -> impl Iterator<Item = (Keyframe, &S::Sync)> {
        self.replay.frames()
    }

    /// The live debug ring; `None` unless diagnostics are compiled in.
    pub fn debug_frames(&self) -> Option<&keystep_keyframe_buffer::KeyframeRing<DebugFrame>> {
        self.buffers.debug_frames()
    }

    /// Historic debug capture; `None` unless diagnostics are compiled in
    /// and a historic size was configured.
    pub fn historic(&self) -> Option<&HistoricBuffers> {
        #[cfg(feature = "diagnostics")]
        {
            self.historic.as_ref()
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            None
        }
    }

    /// Debug frames shipped by the remote peer; `None` unless
    /// diagnostics are compiled in.
    pub fn received_debug_frames(&self) -> Option<&[DebugFrame]> {
        #[cfg(feature = "diagnostics")]
        {
            Some(self.debug_channel.received_frames())
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            None
        }
    }

    // --- diagnostics plumbing --------------------------------------------

    #[allow(unused_variables)]
    fn debug_pre_record(&mut self, role: NetRole) {
        #[cfg(feature = "diagnostics")]
        {
            let last_sent = match role {
                NetRole::AutonomousProxy => self.autonomous.last_sent_input_keyframe(),
                NetRole::Authority | NetRole::SimulatedProxy => None,
            };
            if let Some(ring) = self.buffers.debug_frames_mut() {
                if let Some(head) = ring.head_keyframe() {
                    if let Some(frame) = ring.find_mut(head) {
                        frame.last_sent_input_keyframe = last_sent;
                    }
                }
            }
        }
    }

    #[allow(unused_variables)]
    fn debug_open_slot(&mut self, params: &TickParams) {
        #[cfg(feature = "diagnostics")]
        {
            let last_received = match params.role {
                NetRole::Authority => self.server.last_received_input_keyframe(),
                NetRole::AutonomousProxy | NetRole::SimulatedProxy => None,
            };
            let global_frame = self.global_frame;
            if let Some(ring) = self.buffers.debug_frames_mut() {
                let frame = ring.write_next();
                frame.local_delta_time = params.local_delta_time_seconds;
                frame.global_frame = global_frame;
                frame.last_received_input_keyframe = last_received;
            }
        }
    }

    #[allow(unused_variables)]
    fn debug_finalize(&mut self, outcome: &AdvanceOutcome) {
        #[cfg(feature = "diagnostics")]
        {
            let remaining = self.tick_state.remaining_allowed_sim_time();
            let mut finalized = None;
            if let Some(ring) = self.buffers.debug_frames_mut() {
                if let Some(head) = ring.head_keyframe() {
                    if let Some(frame) = ring.find_mut(head) {
                        frame.processed_keyframes = outcome.consumed.clone();
                        frame.remaining_budget = remaining;
                        finalized = Some(frame.clone());
                    }
                }
            }
            if let Some(frame) = finalized {
                if let Some(historic) = self.historic.as_mut() {
                    historic.merge(frame.clone());
                }
                self.debug_channel.queue(frame);
            }
        }
    }
}

impl<S: Simulation> Default for NetSimulation<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Simulation> RollbackParticipant for NetSimulation<S> {
    fn link_id(&self) -> LinkId {
        self.link.id()
    }

    fn parent_handle(&self) -> Option<WeakParticipant> {
        self.link.parent_handle()
    }

    fn detach_dependent(&mut self, id: LinkId) {
        self.link.remove_dependent(id);
    }

    fn clear_parent_link(&mut self) {
        self.link.clear_parent();
    }

    fn begin_rollback(&mut self, delta: SimTime, parent_keyframe: Keyframe) {
        NetSimulation::begin_rollback(self, delta, parent_keyframe);
    }

    fn step_rollback(&mut self, step: SimTime, parent_keyframe: Keyframe, is_final_step: bool) {
        NetSimulation::step_rollback(self, step, parent_keyframe, is_final_step);
    }
}

impl<S: Simulation> Drop for NetSimulation<S> {
    fn drop(&mut self) {
        // Weak edges must not dangle into a destroyed instance: detach
        // from the parent and orphan the dependents explicitly.
        if let Some(parent) = self.link.parent_rc() {
            if let Ok(mut guard) = parent.try_borrow_mut() {
                guard.detach_dependent(self.link.id());
            }
        }
        for weak in self.link.take_dependents() {
            if let Some(dependent) = weak.upgrade() {
                if let Ok(mut guard) = dependent.try_borrow_mut() {
                    guard.clear_parent_link();
                }
            }
        }
    }
}
