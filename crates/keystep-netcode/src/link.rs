//! Weak parent/dependent links between simulation instances
//!
//! A simulation whose reconcile rewinds must drag its dependents through
//! the same window: first `begin_rollback` on every dependent, then one
//! `step_rollback` per replayed keyframe, the last flagged final. Edges
//! are weak in both directions; neither side owns the other, and a
//! parent link must be cleared before the simulation it names is
//! destroyed.
//!
//! The graph is a tree. Parent and dependents share a thread by
//! contract, which is why plain `Rc<RefCell<..>>` handles are the right
//! shape here.

use indexmap::IndexMap;
use keystep_core::{Keyframe, SimTime};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one simulation instance in the dependent graph.
pub type LinkId = u64;

/// Strong handle to a graph participant.
pub type SharedParticipant = Rc<RefCell<dyn RollbackParticipant>>;

/// Weak edge to a graph participant.
pub type WeakParticipant = Weak<RefCell<dyn RollbackParticipant>>;

/// A simulation that can be driven through a parent's rollback window.
pub trait RollbackParticipant {
    /// Stable id of this instance.
    fn link_id(&self) -> LinkId;

    /// This instance's own parent edge, for cycle checks.
    fn parent_handle(&self) -> Option<WeakParticipant>;

    /// Drop the dependent edge with the given id, if present.
    fn detach_dependent(&mut self, id: LinkId);

    /// Drop the parent edge.
    fn clear_parent_link(&mut self);

    /// A parent has rewound `delta` of simulation time back to
    /// `parent_keyframe`; prepare to follow.
    fn begin_rollback(&mut self, delta: SimTime, parent_keyframe: Keyframe);

    /// One keyframe of the parent's replay window. `is_final_step` marks
    /// the window complete and arms the dependent's own rewind.
    fn step_rollback(&mut self, step: SimTime, parent_keyframe: Keyframe, is_final_step: bool);
}

/// One replayed keyframe within a rollback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackStep {
    /// Sim time the keyframe contributes
    pub step: SimTime,
    /// The keyframe being replayed
    pub keyframe: Keyframe,
}

/// A completed reconcile correction, ready to propagate to dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// Simulation time rewound
    pub delta: SimTime,
    /// Keyframe the state was corrected at
    pub keyframe: Keyframe,
    /// Retained keyframes that will replay, oldest first. May be empty
    /// when the correction landed at the head.
    pub steps: Vec<RollbackStep>,
}

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// The graph node embedded in each simulation instance.
pub(crate) struct LinkNode {
    id: LinkId,
    parent: Option<WeakParticipant>,
    dependents: IndexMap<LinkId, WeakParticipant>,
}

impl LinkNode {
    pub fn new() -> Self {
        Self {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
            dependents: IndexMap::new(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Install a parent edge, asserting the graph stays acyclic.
    ///
    /// # Panics
    ///
    /// Panics if `parent` (or any ancestor of it) is this node, or if an
    /// ancestor is currently mutably borrowed, which can only happen on
    /// a reentrant link through this node.
    pub fn set_parent(&mut self, parent: &SharedParticipant) {
        let mut cursor = Some(Rc::downgrade(parent));
        while let Some(weak) = cursor {
            let Some(strong) = weak.upgrade() else { break };
            let guard = strong
                .try_borrow()
                .expect("dependency cycle in simulation parent links");
            assert!(
                guard.link_id() != self.id,
                "dependency cycle in simulation parent links"
            );
            cursor = guard.parent_handle();
        }
        self.parent = Some(Rc::downgrade(parent));
    }

    pub fn parent_handle(&self) -> Option<WeakParticipant> {
        self.parent.clone()
    }

    pub fn parent_rc(&self) -> Option<SharedParticipant> {
        self.parent.as_ref()?.upgrade()
    }

    pub fn clear_parent(&mut self) {
        self.parent = None;
    }

    /// Register a dependent edge.
    ///
    /// # Panics
    ///
    /// Panics if `dependent` is the simulation this node belongs to (its
    /// cell is already mutably borrowed by the caller).
    pub fn add_dependent(&mut self, dependent: &SharedParticipant) {
        let id = dependent
            .try_borrow()
            .expect("a simulation cannot be its own dependent")
            .link_id();
        self.dependents.insert(id, Rc::downgrade(dependent));
    }

    pub fn remove_dependent(&mut self, id: LinkId) {
        self.dependents.shift_remove(&id);
    }

    /// Take every dependent edge, leaving the node childless.
    pub fn take_dependents(&mut self) -> Vec<WeakParticipant> {
        self.dependents.drain(..).map(|(_, weak)| weak).collect()
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }

    pub fn has_dependent(&self, id: LinkId) -> bool {
        self.dependents.contains_key(&id)
    }

    /// Drive every live dependent through the rollback window: begin on
    /// all, then each step on all, the last step flagged final. Dead
    /// edges are pruned first. A window with no replayed keyframes still
    /// sends one finalizing step so dependents arm their rewind.
    pub fn dispatch_rollback(&mut self, report: &RollbackReport) {
        self.dependents.retain(|_, weak| weak.strong_count() > 0);
        let live: Vec<SharedParticipant> = self
            .dependents
            .values()
            .filter_map(|weak| weak.upgrade())
            .collect();

        for dependent in &live {
            dependent
                .borrow_mut()
                .begin_rollback(report.delta, report.keyframe);
        }

        if report.steps.is_empty() {
            for dependent in &live {
                dependent
                    .borrow_mut()
                    .step_rollback(SimTime::ZERO, report.keyframe, true);
            }
            return;
        }

        let last = report.steps.len() - 1;
        for (index, step) in report.steps.iter().enumerate() {
            for dependent in &live {
                dependent
                    .borrow_mut()
                    .step_rollback(step.step, step.keyframe, index == last);
            }
        }
    }
}
