//! Network roles and replication targets

use serde::{Deserialize, Serialize};

/// The role a peer plays for a given simulation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetRole {
    /// The authoritative peer. Consumes remote inputs, publishes sync state.
    Authority,
    /// The locally controlled client. Predicts ahead of the authority and
    /// reconciles against its corrections.
    AutonomousProxy,
    /// A client observing a simulation someone else controls.
    SimulatedProxy,
}

/// A replication channel the orchestrator can serialize to or ingest from.
///
/// Each target maps to exactly one proxy; the enum being closed is what
/// makes "unknown target" unrepresentable at the dispatch sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationTarget {
    /// Client -> server input stream
    ServerRpc,
    /// Server -> owning client sync stream
    AutonomousProxy,
    /// Server -> observer sync stream
    SimulatedProxy,
    /// Local rolling window of recent sync states for scrubbing
    Replay,
    /// Server -> client diagnostic frame stream
    Debug,
}
