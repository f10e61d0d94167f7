//! Send pacing for the client's server-RPC channel
//!
//! The predictor produces inputs every host frame but should not flush
//! them to the wire at render rate. The pacer accumulates frame time and
//! grants one send each time a full threshold's worth has elapsed.

/// Accumulator-based send pacer.
#[derive(Debug, Clone)]
pub struct ServerRpcPacer {
    /// Seconds between granted sends (1 / desired frequency)
    threshold_seconds: f32,
    /// Unspent frame time
    accumulator_seconds: f32,
}

impl ServerRpcPacer {
    /// Default send rate, in Hz
    const DEFAULT_FREQUENCY_HZ: f32 = 60.0;

    pub fn new() -> Self {
        Self {
            threshold_seconds: 1.0 / Self::DEFAULT_FREQUENCY_HZ,
            accumulator_seconds: 0.0,
        }
    }

    /// Set the desired send frequency. The send threshold becomes
    /// `1 / hz` seconds.
    pub fn set_desired_send_frequency(&mut self, hz: f32) {
        assert!(hz > 0.0, "send frequency must be positive");
        self.threshold_seconds = 1.0 / hz;
    }

    /// Seconds between granted sends.
    pub fn threshold_seconds(&self) -> f32 {
        self.threshold_seconds
    }

    /// Account `dt_seconds` of elapsed frame time; returns true when a
    /// send is due, consuming one threshold's worth of accumulated time.
    ///
    /// TODO: a frame hitch much longer than the threshold banks several
    /// sends' worth of credit in one call; clamp the accumulated delta at
    /// `threshold_seconds` once both peers handle the lower send rate.
    pub fn should_send(&mut self, dt_seconds: f32) -> bool {
        self.accumulator_seconds += dt_seconds.max(0.0);
        if self.accumulator_seconds >= self.threshold_seconds {
            self.accumulator_seconds -= self.threshold_seconds;
            true
        } else {
            false
        }
    }
}

impl Default for ServerRpcPacer {
    fn default() -> Self {
        Self::new()
    }
}
