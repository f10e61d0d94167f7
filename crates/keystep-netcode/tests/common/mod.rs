//! Shared test fixture: a deterministic integer body simulation
//!
//! All state is integral so two runs are bit-identical by construction;
//! the frame delta only feeds the time accounting, never the physics.
#![allow(dead_code)] // not every test binary uses every helper

use keystep_core::{SimTime, Simulation, SimulationDriver};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: i64,
    pub velocity: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thrust {
    pub accel: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub gravity: i64,
}

pub struct BodySim;

impl Simulation for BodySim {
    type Input = Thrust;
    type Sync = BodyState;
    type Aux = Environment;

    const GROUP_NAME: &'static str = "test-body";

    fn update<D: SimulationDriver<Self>>(
        _driver: &mut D,
        _delta_seconds: f32,
        input: &Thrust,
        prev: &BodyState,
        next: &mut BodyState,
        aux: &Environment,
    ) {
        next.velocity = prev.velocity + input.accel + aux.gravity;
        next.position = prev.position + next.velocity;
    }
}

/// Driver that feeds a scripted acceleration sequence and records every
/// finalized frame.
pub struct ScriptedDriver {
    pub name: &'static str,
    pub script: Vec<i64>,
    pub cursor: usize,
    pub initial: BodyState,
    pub presented: Vec<BodyState>,
}

impl ScriptedDriver {
    pub fn new(name: &'static str, script: Vec<i64>) -> Self {
        Self {
            name,
            script,
            cursor: 0,
            initial: BodyState::default(),
            presented: Vec::new(),
        }
    }
}

impl SimulationDriver<BodySim> for ScriptedDriver {
    fn debug_name(&self) -> &str {
        self.name
    }

    fn init_sync_state(&mut self, state: &mut BodyState) {
        *state = self.initial.clone();
    }

    fn produce_input(&mut self, _sim_time: SimTime, input: &mut Thrust) {
        let accel = if self.script.is_empty() {
            0
        } else {
            self.script[self.cursor % self.script.len()]
        };
        self.cursor += 1;
        input.accel = accel;
    }

    fn finalize_frame(&mut self, state: &BodyState) {
        self.presented.push(state.clone());
    }
}

/// What the fixture computes at keyframe `k` under constant accel 1 and
/// zero gravity, from a zero initial state.
pub fn expected_state(keyframe: u32) -> BodyState {
    let k = keyframe as i64;
    BodyState {
        velocity: k,
        position: k * (k + 1) / 2,
    }
}
