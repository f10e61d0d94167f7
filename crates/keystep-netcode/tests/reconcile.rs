//! Reconcile behavior: rollback-and-replay, replay equivalence,
//! idempotence, aux participation, and prediction abandonment.

mod common;

use common::{BodySim, BodyState, Environment, ScriptedDriver, expected_state};
use keystep_core::{Keyframe, NetRole, ReplicationTarget, SimTime};
use keystep_netcode::wire::{self, SyncPacket};
use keystep_netcode::{InitParams, NetSimulation, TickParams};

fn autonomous_sim() -> NetSimulation<BodySim> {
    let mut sim: NetSimulation<BodySim> = NetSimulation::new();
    sim.initialize_for_role(NetRole::AutonomousProxy, &InitParams::default());
    sim
}

fn tick(sim: &mut NetSimulation<BodySim>, driver: &mut ScriptedDriver, dt: f32) {
    sim.tick(
        driver,
        TickParams {
            role: NetRole::AutonomousProxy,
            local_delta_time_seconds: dt,
        },
    );
}

fn receive_authoritative(
    sim: &mut NetSimulation<BodySim>,
    keyframe: Keyframe,
    sync: BodyState,
    aux: Environment,
) {
    let packet: SyncPacket<BodyState, Environment> = SyncPacket {
        keyframe,
        total_sim_time: SimTime::from_micros(100_000 * keyframe as u64),
        sync,
        aux,
    };
    let mut bytes = Vec::new();
    wire::encode(&packet, &mut bytes).expect("fixture packet always encodes");
    sim.deserialize(ReplicationTarget::AutonomousProxy, &bytes)
        .expect("fixture packet always decodes");
}

/// Ten predicted keyframes of accel 1 at 0.1s per frame.
fn predicted_to_ten() -> (NetSimulation<BodySim>, ScriptedDriver) {
    let mut sim = autonomous_sim();
    let mut driver = ScriptedDriver::new("reconcile", vec![1]);
    for _ in 0..10 {
        tick(&mut sim, &mut driver, 0.1);
    }
    assert_eq!(sim.last_processed_input_keyframe(), 10);
    assert_eq!(sim.buffers().sync.find(10), Some(&expected_state(10)));
    (sim, driver)
}

#[test]
fn divergent_authority_rewinds_then_replays_retained_inputs() {
    let (mut sim, mut driver) = predicted_to_ten();
    let before = sim.buffers().sync.find(10).cloned().expect("head retained");

    // The authority disagrees at keyframe 7
    let authoritative = BodyState {
        velocity: 70,
        position: 280,
    };
    receive_authoritative(&mut sim, 7, authoritative.clone(), Environment::default());
    sim.reconcile(NetRole::AutonomousProxy);

    // Rewound: head is the corrected keyframe, newer entries are gone
    assert_eq!(sim.buffers().sync.head_keyframe(), Some(7));
    assert_eq!(sim.buffers().sync.find(7), Some(&authoritative));
    assert_eq!(sim.buffers().sync.find(8), None);
    assert_eq!(sim.last_processed_input_keyframe(), 7);
    assert_eq!(sim.total_processed_sim_time(), SimTime::from_micros(700_000));
    // Inputs 8..=10 are retained for replay
    for k in 8..=10 {
        assert!(sim.buffers().input.find(k).is_some());
    }

    // The next tick replays 8..=10 and consumes the new input 11
    tick(&mut sim, &mut driver, 0.1);
    assert_eq!(sim.last_processed_input_keyframe(), 11);

    let after = sim.buffers().sync.find(10).cloned().expect("head retained");
    assert_ne!(before, after);
    // Replay equivalence: identical to stepping the authoritative state
    // forward by hand with the same inputs
    assert_eq!(
        after,
        BodyState {
            velocity: 73,
            position: 280 + 71 + 72 + 73,
        }
    );
}

#[test]
fn matching_authority_is_a_no_op() {
    let (mut sim, _driver) = predicted_to_ten();

    receive_authoritative(&mut sim, 7, expected_state(7), Environment::default());
    sim.reconcile(NetRole::AutonomousProxy);

    // Nothing was rewound
    assert_eq!(sim.buffers().sync.head_keyframe(), Some(10));
    assert_eq!(sim.buffers().sync.find(10), Some(&expected_state(10)));
    assert_eq!(sim.last_processed_input_keyframe(), 10);
}

#[test]
fn applying_the_same_correction_twice_changes_nothing() {
    let (mut sim, mut driver) = predicted_to_ten();
    let authoritative = BodyState {
        velocity: 70,
        position: 280,
    };

    receive_authoritative(&mut sim, 7, authoritative.clone(), Environment::default());
    sim.reconcile(NetRole::AutonomousProxy);
    tick(&mut sim, &mut driver, 0.1);

    let head_before = sim.buffers().sync.head_keyframe();
    let state_before = sim.buffers().sync.find(7).cloned();

    // Same packet again: the prediction now agrees with it
    receive_authoritative(&mut sim, 7, authoritative, Environment::default());
    sim.reconcile(NetRole::AutonomousProxy);

    assert_eq!(sim.buffers().sync.head_keyframe(), head_before);
    assert_eq!(sim.buffers().sync.find(7).cloned(), state_before);
}

#[test]
fn aux_divergence_triggers_rollback_and_replays_with_new_aux() {
    let (mut sim, mut driver) = predicted_to_ten();

    // Sync agrees at 7, but the authority says gravity changed there
    receive_authoritative(
        &mut sim,
        7,
        expected_state(7),
        Environment { gravity: 1 },
    );
    sim.reconcile(NetRole::AutonomousProxy);
    assert_eq!(sim.buffers().sync.head_keyframe(), Some(7));

    tick(&mut sim, &mut driver, 0.1);

    // Replayed keyframes feel the new gravity: velocity grows by 2/frame
    assert_eq!(
        sim.buffers().sync.find(8),
        Some(&BodyState {
            velocity: 9,
            position: 28 + 9
        })
    );
    assert_eq!(sim.buffers().aux.find(8), Some(&Environment { gravity: 1 }));
}

#[test]
fn correction_older_than_the_ring_abandons_prediction() {
    let mut sim: NetSimulation<BodySim> = NetSimulation::new();
    sim.initialize_for_role(
        NetRole::AutonomousProxy,
        &InitParams {
            input_buffer_size: 4,
            synced_buffer_size: 4,
            aux_buffer_size: 4,
            ..InitParams::default()
        },
    );
    let mut driver = ScriptedDriver::new("abandon", vec![1]);
    for _ in 0..10 {
        tick(&mut sim, &mut driver, 0.1);
    }
    assert_eq!(sim.buffers().sync.tail_keyframe(), Some(7));

    // Keyframe 2 was evicted long ago
    let origin = BodyState {
        velocity: 5,
        position: 50,
    };
    receive_authoritative(&mut sim, 2, origin.clone(), Environment::default());
    sim.reconcile(NetRole::AutonomousProxy);

    // The authoritative state became a new origin
    assert_eq!(sim.buffers().sync.head_keyframe(), Some(2));
    assert_eq!(sim.buffers().sync.find(2), Some(&origin));
    assert_eq!(sim.last_processed_input_keyframe(), 2);

    // Prediction resumes cleanly from the new origin
    tick(&mut sim, &mut driver, 0.1);
    assert_eq!(sim.last_processed_input_keyframe(), 3);
    assert_eq!(
        sim.buffers().sync.find(3),
        Some(&BodyState {
            velocity: 6,
            position: 56
        })
    );
}
