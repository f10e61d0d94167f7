//! Diagnostic frame shipping, authority to client
//!
//! Finalized debug frames queue here after each tick and drain into
//! `DebugPacket`s on serialize. The receiving side accumulates them for
//! diagnostic replay. The whole channel exists only with the
//! `diagnostics` feature; without it the orchestrator's debug accessors
//! return nothing.

use crate::debug_frame::DebugFrame;
use crate::error::Result;
use crate::wire::{self, DebugPacket};

/// Frames retained on either side before the oldest are dropped
const RETENTION: usize = 256;

/// Outbound queue and inbound store for diagnostic frames.
pub struct DebugChannel {
    outbox: Vec<DebugFrame>,
    received: Vec<DebugFrame>,
}

impl DebugChannel {
    pub fn new() -> Self {
        Self {
            outbox: Vec::new(),
            received: Vec::new(),
        }
    }

    /// Queue one finalized frame for shipping.
    pub fn queue(&mut self, frame: DebugFrame) {
        self.outbox.push(frame);
        if self.outbox.len() > RETENTION {
            let excess = self.outbox.len() - RETENTION;
            self.outbox.drain(..excess);
        }
    }

    /// Emit and clear the queued frames.
    pub fn serialize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let packet = DebugPacket {
            frames: std::mem::take(&mut self.outbox),
        };
        wire::encode(&packet, out)
    }

    /// Decode a shipped packet into the received store.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        let packet: DebugPacket = wire::decode(bytes)?;
        self.received.extend(packet.frames);
        if self.received.len() > RETENTION {
            let excess = self.received.len() - RETENTION;
            self.received.drain(..excess);
        }
        Ok(())
    }

    /// Frames queued and not yet shipped.
    pub fn dirty_count(&self) -> usize {
        self.outbox.len()
    }

    /// Frames received from the remote peer, oldest first.
    pub fn received_frames(&self) -> &[DebugFrame] {
        &self.received
    }
}

impl Default for DebugChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ship_and_receive() {
        let mut sender = DebugChannel::new();
        let mut receiver = DebugChannel::new();

        for frame in 0..3u64 {
            sender.queue(DebugFrame {
                global_frame: frame,
                ..DebugFrame::default()
            });
        }
        assert_eq!(sender.dirty_count(), 3);

        let mut bytes = Vec::new();
        sender.serialize(&mut bytes).unwrap();
        assert_eq!(sender.dirty_count(), 0);

        receiver.deserialize(&bytes).unwrap();
        let frames: Vec<u64> = receiver
            .received_frames()
            .iter()
            .map(|f| f.global_frame)
            .collect();
        assert_eq!(frames, vec![0, 1, 2]);
    }
}
