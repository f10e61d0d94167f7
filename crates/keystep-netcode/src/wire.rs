//! Packet types for the replication channels
//!
//! Each proxy owns the framing of its channel; the only cross-peer
//! contract is that the matching proxy on the other side can decode what
//! was emitted. Bytes are produced with `bincode` over serde derives.

use crate::buffers::InputFrame;
use crate::debug_frame::DebugFrame;
use crate::error::{Error, Result};
use keystep_core::{Keyframe, SimTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Authoritative sync state for one keyframe, server to client.
#[derive(Clone, Serialize, Deserialize)]
pub struct SyncPacket<St, Ax> {
    /// Keyframe this state belongs to
    pub keyframe: Keyframe,
    /// Total simulation time processed as of this keyframe
    pub total_sim_time: SimTime,
    /// The sync state itself
    pub sync: St,
    /// Aux state valid at this keyframe
    pub aux: Ax,
}

/// A window of input commands, client to server.
///
/// Frames are consecutive: frame `i` carries keyframe
/// `first_keyframe + i`. The window is resent until acknowledged, so
/// overlapping packets are expected and duplicates are skipped on
/// ingest.
#[derive(Clone, Serialize, Deserialize)]
pub struct InputPacket<I> {
    /// Keyframe of the first frame in the window
    pub first_keyframe: Keyframe,
    /// The input frames, oldest first
    pub frames: Vec<InputFrame<I>>,
}

/// A window of recent sync states for replay scrubbing.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReplayPacket<St> {
    /// Recent states, oldest first
    pub frames: Vec<(Keyframe, St)>,
}

/// Finalized debug frames, server to client.
#[derive(Clone, Serialize, Deserialize)]
pub struct DebugPacket {
    /// The diagnostic frames, oldest first
    pub frames: Vec<DebugFrame>,
}

/// Encode a packet onto the end of `out`.
pub fn encode<T: Serialize>(value: &T, out: &mut Vec<u8>) -> Result<()> {
    let bytes = bincode::serialize(value).map_err(|e| Error::Encode(e.to_string()))?;
    out.extend_from_slice(&bytes);
    Ok(())
}

/// Decode one packet from `bytes`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// Order-insensitive checksum of any serializable state, for cheap
/// divergence logging. Not a substitute for the real comparison.
pub fn state_checksum<T: Serialize>(value: &T) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    match bincode::serialize(value) {
        Ok(bytes) => bytes.hash(&mut hasher),
        Err(_) => 0u8.hash(&mut hasher),
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_packet_round_trip() {
        let packet: SyncPacket<i64, u8> = SyncPacket {
            keyframe: 7,
            total_sim_time: SimTime::from_micros(116_669),
            sync: -42,
            aux: 3,
        };

        let mut bytes = Vec::new();
        encode(&packet, &mut bytes).unwrap();
        let decoded: SyncPacket<i64, u8> = decode(&bytes).unwrap();

        assert_eq!(decoded.keyframe, 7);
        assert_eq!(decoded.total_sim_time, packet.total_sim_time);
        assert_eq!(decoded.sync, -42);
        assert_eq!(decoded.aux, 3);
    }

    #[test]
    fn test_input_packet_round_trip() {
        let packet: InputPacket<i32> = InputPacket {
            first_keyframe: 4,
            frames: vec![
                InputFrame {
                    delta: SimTime::from_micros(16_667),
                    command: 1,
                },
                InputFrame {
                    delta: SimTime::from_micros(16_667),
                    command: 2,
                },
            ],
        };

        let mut bytes = Vec::new();
        encode(&packet, &mut bytes).unwrap();
        let decoded: InputPacket<i32> = decode(&bytes).unwrap();

        assert_eq!(decoded.first_keyframe, 4);
        assert_eq!(decoded.frames.len(), 2);
        assert_eq!(decoded.frames[1].command, 2);
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        let result: Result<InputPacket<i32>> = decode(&[0xff, 0x01]);
        assert!(result.is_err());
    }

    #[test]
    fn test_checksum_tracks_content() {
        assert_eq!(state_checksum(&(1u32, 2u32)), state_checksum(&(1u32, 2u32)));
        assert_ne!(state_checksum(&(1u32, 2u32)), state_checksum(&(1u32, 3u32)));
    }
}
