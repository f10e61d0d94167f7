//! Buffer sizing for simulation initialization

/// Buffer capacities, in keyframes, used by
/// [`NetSimulation::initialize_for_role`](crate::NetSimulation::initialize_for_role).
///
/// The defaults retain roughly half a second of history at 60 Hz for the
/// live buffers, with deeper diagnostic retention.
#[derive(Debug, Clone)]
pub struct InitParams {
    /// Capacity of the input command ring
    pub input_buffer_size: usize,
    /// Capacity of the sync state ring
    pub synced_buffer_size: usize,
    /// Capacity of the aux state ring
    pub aux_buffer_size: usize,
    /// Capacity of the per-frame debug ring (used only with the
    /// `diagnostics` feature)
    pub debug_buffer_size: usize,
    /// Capacity of the historic debug ring; 0 disables historic capture
    pub historic_buffer_size: usize,
    /// Number of recent sync states retained for replay scrubbing
    pub replay_window_size: usize,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            input_buffer_size: 32,
            synced_buffer_size: 32,
            aux_buffer_size: 32,
            debug_buffer_size: 64,
            historic_buffer_size: 256,
            replay_window_size: 3,
        }
    }
}
