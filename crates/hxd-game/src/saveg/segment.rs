// saveg/segment.rs — Tagged-block framing over the save stream
//
// A cheap structural checksum: each coarse stage of the save is bracketed
// by a 32-bit tag. On read, a tag that differs from the expected one
// means the paired write/read functions have drifted, and the load aborts
// outright.

use hxd_common::stream::{Reader, Writer};

use super::error::SaveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SegmentTag {
    GameHeader = 101,
    MapHeader = 102,
    MapElements = 103,
    Polyobjs = 104,
    /// Historical: mobjs were their own segment before they became a
    /// thinker class. Never written by the current format.
    Mobjs = 105,
    Thinkers = 106,
    /// Historical: per-map interpreter segment; interpreters are now
    /// thinkers and session script state moved to GlobalScriptData.
    Scripts = 107,
    Players = 108,
    Sounds = 109,
    Misc = 110,
    End = 111,
    MaterialArchive = 112,
    PlayerHeader = 114,
    GlobalScriptData = 115,
}

/// Write mode: open a segment.
pub fn begin_segment(w: &mut Writer, tag: SegmentTag) {
    w.write_i32(tag as i32);
}

/// Read mode: consume a tag and demand it matches.
pub fn assert_segment(r: &mut Reader, tag: SegmentTag) -> Result<(), SaveError> {
    let actual = r.read_i32()?;
    if actual != tag as i32 {
        return Err(SaveError::SegmentMismatch { expected: tag, actual });
    }
    Ok(())
}

/// Write mode: close the current segment with the reserved End tag.
pub fn end_segment(w: &mut Writer) {
    w.write_i32(SegmentTag::End as i32);
}

/// Read mode: consume the segment terminator.
pub fn assert_end(r: &mut Reader) -> Result<(), SaveError> {
    assert_segment(r, SegmentTag::End)
}
