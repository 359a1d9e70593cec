//! Grain codec: wire <-> in-memory conversion and snapshot blobs.
//!
//! Snapshot blobs are the JSON encoding of [`ChunkSnapshot`]. Consumers
//! must treat them as opaque; there is no version tag.

use crate::chunk::ChunkSnapshot;
use crate::grain::{Grain, WireGrain};

/// Errors produced while encoding or decoding snapshot blobs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The grain set could not be serialized.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    /// The blob is not a valid snapshot.
    #[error("corrupt snapshot blob: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Convert a wire grain into its in-memory form.
pub fn decode_grain(wire: WireGrain) -> Grain {
    Grain {
        id: wire.id,
        position: wire.pos,
        velocity: wire.vel,
        kind: wire.kind,
        cell_prop: wire.cell_prop,
    }
}

/// Convert an in-memory grain into its wire form.
pub fn encode_grain(grain: &Grain) -> WireGrain {
    WireGrain {
        id: grain.id,
        pos: grain.position,
        vel: grain.velocity,
        kind: grain.kind,
        cell_prop: grain.cell_prop.clone(),
    }
}

/// Encode every grain of a slice.
pub fn encode_grains(grains: &[Grain]) -> Vec<WireGrain> {
    grains.iter().map(encode_grain).collect()
}

/// Decode a wire grain set.
pub fn decode_grains(wire: Vec<WireGrain>) -> Vec<Grain> {
    wire.into_iter().map(decode_grain).collect()
}

/// Serialize a chunk's grain set into a snapshot blob.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails (e.g. a cell
/// payload that is not representable).
pub fn encode_snapshot(grains: &[Grain]) -> Result<Vec<u8>, CodecError> {
    let snapshot = ChunkSnapshot {
        grains: encode_grains(grains),
    };
    serde_json::to_vec(&snapshot).map_err(CodecError::Encode)
}

/// Parse a snapshot blob.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the blob is corrupt.
pub fn decode_snapshot(blob: &[u8]) -> Result<ChunkSnapshot, CodecError> {
    serde_json::from_slice(blob).map_err(CodecError::Decode)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::Vec3f;
    use crate::grain::GrainKind;
    use crate::ids::GrainId;

    fn cell() -> Grain {
        Grain {
            id: GrainId(9),
            position: Vec3f::new(0.25, 0.75, 1.5),
            velocity: Vec3f::new(0.0, -0.1, 0.0),
            kind: GrainKind::Cell,
            cell_prop: Some(serde_json::json!({ "generation": 3 })),
        }
    }

    #[test]
    fn snapshot_blob_preserves_cell_payload() {
        let blob = encode_snapshot(&[cell()]).unwrap();
        let snapshot = decode_snapshot(&blob).unwrap();
        let grains = decode_grains(snapshot.grains);
        assert_eq!(grains, vec![cell()]);
    }

    #[test]
    fn corrupt_blob_is_a_decode_error() {
        let err = decode_snapshot(b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn wire_omits_absent_payload() {
        let mut soil = cell();
        soil.kind = GrainKind::Soil;
        soil.cell_prop = None;
        let json = serde_json::to_value(encode_grain(&soil)).unwrap();
        assert!(json.get("cell_prop").is_none());
        assert_eq!(json["kind"], "soil");
    }
}
