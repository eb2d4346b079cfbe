// saveg/error.rs — Structured error taxonomy for the save subsystem
//
// Low-level format errors are never caught and retried at intermediate
// layers; they propagate unchanged to the session manager's top-level
// save/load call, the only layer that downgrades them into a
// user-visible "could not load" outcome.

use thiserror::Error;

use hxd_common::compression::CompressionError;
use hxd_common::stream::StreamError;

use super::material_archive::MaterialGroup;
use super::segment::SegmentTag;

#[derive(Debug, Error)]
pub enum SaveError {
    /// Structural drift between paired write/read functions. Always
    /// fatal to the load attempt; there is no partial-state recovery.
    #[error("alignment check failed: expected segment {expected:?}, found tag {actual}")]
    SegmentMismatch { expected: SegmentTag, actual: i32 },

    #[error("unknown thinker class tag {tag}")]
    UnknownThinkerClass { tag: i32 },

    #[error("bad {kind} index {index}")]
    BadElementIndex { kind: &'static str, index: u32 },

    #[error("bad material serial {serial} in group {group:?}")]
    BadMaterialSerial { serial: u16, group: MaterialGroup },

    /// Sizing was computed from the wrong population. An internal
    /// invariant violation, not a user-facing condition.
    #[error("thing archive exhausted ({capacity} slots)")]
    ThingArchiveExhausted { capacity: usize },

    #[error("save version {found} is newer than the supported maximum {supported}")]
    VersionTooNew { found: i32, supported: i32 },

    #[error("file matches no recognized save format")]
    UnrecognizedFormat,

    #[error("corrupt save: {0}")]
    Consistency(&'static str),

    #[error("slot {0} does not exist")]
    BadSlot(u32),

    #[error("slot {0} is not loadable")]
    NotLoadable(u32),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
