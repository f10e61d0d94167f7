//! Full replication loop: client inputs to the authority, authoritative
//! sync back to the client and out to an observer, plus RPC pacing.

mod common;

use common::{BodySim, BodyState, ScriptedDriver};
use keystep_core::{NetRole, ReplicationTarget};
use keystep_netcode::{InitParams, NetSimulation, SimulatedUpdateMode, TickParams};

fn sim_for(role: NetRole) -> NetSimulation<BodySim> {
    let mut sim: NetSimulation<BodySim> = NetSimulation::new();
    sim.initialize_for_role(role, &InitParams::default());
    sim
}

fn tick(sim: &mut NetSimulation<BodySim>, driver: &mut ScriptedDriver, role: NetRole, dt: f32) {
    sim.tick(
        driver,
        TickParams {
            role,
            local_delta_time_seconds: dt,
        },
    );
}

#[test]
fn client_inputs_replicate_and_confirm_prediction() {
    let mut client = sim_for(NetRole::AutonomousProxy);
    let mut server = sim_for(NetRole::Authority);
    let mut client_driver = ScriptedDriver::new("client", vec![1]);
    let mut server_driver = ScriptedDriver::new("server", vec![]);

    // Client predicts three frames ahead
    for _ in 0..3 {
        tick(&mut client, &mut client_driver, NetRole::AutonomousProxy, 0.1);
    }
    assert_eq!(client.dirty_count(ReplicationTarget::ServerRpc), 3);

    // Ship the input window to the authority
    let mut rpc = Vec::new();
    client
        .serialize(ReplicationTarget::ServerRpc, &mut rpc)
        .expect("input window encodes");
    server
        .deserialize(ReplicationTarget::ServerRpc, &rpc)
        .expect("input window decodes");

    // The authority consumes exactly what the client sent
    tick(&mut server, &mut server_driver, NetRole::Authority, 0.016);
    assert_eq!(server.last_processed_input_keyframe(), 3);
    assert_eq!(
        server.buffers().sync.find(3),
        client.buffers().sync.find(3)
    );
    assert_eq!(server.dirty_count(ReplicationTarget::AutonomousProxy), 1);

    // Authoritative sync returns to the owning client
    let mut sync_bytes = Vec::new();
    server
        .serialize(ReplicationTarget::AutonomousProxy, &mut sync_bytes)
        .expect("sync packet encodes");
    assert_eq!(server.dirty_count(ReplicationTarget::AutonomousProxy), 0);

    client
        .deserialize(ReplicationTarget::AutonomousProxy, &sync_bytes)
        .expect("sync packet decodes");
    client.reconcile(NetRole::AutonomousProxy);

    // Prediction confirmed: nothing rewound, inputs acknowledged
    assert_eq!(client.last_processed_input_keyframe(), 3);
    tick(&mut client, &mut client_driver, NetRole::AutonomousProxy, 0.1);
    assert_eq!(client.dirty_count(ReplicationTarget::ServerRpc), 1);
}

#[test]
fn observer_adopts_the_authoritative_stream() {
    let mut client = sim_for(NetRole::AutonomousProxy);
    let mut server = sim_for(NetRole::Authority);
    let mut observer = sim_for(NetRole::SimulatedProxy);
    observer.set_simulated_update_mode(SimulatedUpdateMode::Interpolate { delay_keyframes: 0 });

    let mut client_driver = ScriptedDriver::new("client", vec![1]);
    let mut server_driver = ScriptedDriver::new("server", vec![]);
    let mut observer_driver = ScriptedDriver::new("observer", vec![]);

    for _ in 0..4 {
        tick(&mut client, &mut client_driver, NetRole::AutonomousProxy, 0.1);

        let mut rpc = Vec::new();
        client
            .serialize(ReplicationTarget::ServerRpc, &mut rpc)
            .expect("input window encodes");
        server
            .deserialize(ReplicationTarget::ServerRpc, &rpc)
            .expect("input window decodes");
        tick(&mut server, &mut server_driver, NetRole::Authority, 0.016);

        let mut sync_bytes = Vec::new();
        server
            .serialize(ReplicationTarget::SimulatedProxy, &mut sync_bytes)
            .expect("sync packet encodes");
        observer
            .deserialize(ReplicationTarget::SimulatedProxy, &sync_bytes)
            .expect("sync packet decodes");
        observer.reconcile(NetRole::SimulatedProxy);
        tick(&mut observer, &mut observer_driver, NetRole::SimulatedProxy, 0.016);
    }

    // With no delay, the observer tracks the authority exactly
    assert_eq!(observer.last_processed_input_keyframe(), 4);
    assert_eq!(
        observer.buffers().sync.find(4),
        server.buffers().sync.find(4)
    );
    // Presentation reached the host every frame something was received
    assert!(!observer_driver.presented.is_empty());
}

#[test]
fn replay_window_tracks_recent_sync_states() {
    let mut client = sim_for(NetRole::AutonomousProxy);
    let mut driver = ScriptedDriver::new("replay", vec![1]);

    for _ in 0..5 {
        tick(&mut client, &mut driver, NetRole::AutonomousProxy, 0.1);
    }

    let window: Vec<(u32, BodyState)> = client
        .replay_frames()
        .map(|(k, s)| (k, s.clone()))
        .collect();
    assert_eq!(window.len(), 3);
    assert_eq!(window[0].0, 3);
    assert_eq!(window[2].0, 5);

    assert_eq!(client.dirty_count(ReplicationTarget::Replay), 3);
    let mut bytes = Vec::new();
    client
        .serialize(ReplicationTarget::Replay, &mut bytes)
        .expect("replay window encodes");
    assert_eq!(client.dirty_count(ReplicationTarget::Replay), 0);
}

#[test]
fn rpc_pacer_grants_the_configured_rate() {
    let mut client = sim_for(NetRole::AutonomousProxy);
    client.set_desired_server_rpc_send_frequency(60.0);

    let sends = (0..1000)
        .filter(|_| client.should_send_server_rpc(1.0 / 120.0))
        .count();
    assert!((499..=501).contains(&sends), "got {sends} sends");
}

#[test]
fn debug_accessors_match_the_compiled_feature() {
    let client = sim_for(NetRole::AutonomousProxy);

    #[cfg(feature = "diagnostics")]
    {
        assert!(client.debug_frames().is_some());
        assert!(client.historic().is_some());
        assert!(client.received_debug_frames().is_some());
    }
    #[cfg(not(feature = "diagnostics"))]
    {
        assert!(client.debug_frames().is_none());
        assert!(client.historic().is_none());
        assert!(client.received_debug_frames().is_none());
        assert_eq!(client.dirty_count(ReplicationTarget::Debug), 0);
    }
}
