// saveg/mod.rs — Game-state archive/unarchive engine
//
// The save and load contexts bundle the two cooperating archives (thing
// archive, material archive) with the stream, replacing what were once
// process-wide statics. One context exists per save or load operation and
// is threaded by reference through every serializer call.

pub mod acs;
pub mod error;
pub mod map_archive;
pub mod material_archive;
pub mod mobj;
pub mod player;
pub mod registry;
pub mod sector;
pub mod segment;
pub mod specials;
pub mod thing_archive;

use hxd_common::stream::{Reader, Writer};

use crate::thinkers::MobjRef;
use crate::world::{MobjLink, World};

pub use error::SaveError;
pub use material_archive::MaterialArchive;
pub use thing_archive::{ResolvedThing, ThingArchive};

/// Native save-file magic.
pub const SAVE_MAGIC: i32 = 0x1DEA_D666;
/// Client-session save magic. Same layout, non-authoritative origin.
pub const CLIENT_SAVE_MAGIC: i32 = 0x2DEA_D666;

/// Current save format version. Loaders refuse anything newer, and decode
/// every older version down to 1.
pub const SAVE_VERSION: i32 = 8;

/// Format versions before this one stored thing IDs as 16-bit shorts.
pub const FIRST_LONG_THING_ID_VERSION: i32 = 4;

/// Format versions before this one sized the thing archive to a fixed
/// ceiling instead of writing the count to the stream.
pub const FIRST_SIZED_THING_ARCHIVE_VERSION: i32 = 5;

/// The thinker stasis byte is in-band from this version on.
pub const FIRST_STASIS_BYTE_VERSION: i32 = 6;

/// Whether this session is the authoritative (file-owning) role. Client
/// roles skip archive classes that are resynchronized over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Authoritative,
    Client,
}

// ============================================================
// Save context
// ============================================================

pub struct SaveContext {
    pub writer: Writer,
    pub things: ThingArchive,
    pub materials: MaterialArchive,
    pub role: SessionRole,
}

impl SaveContext {
    /// Build a context for one save operation over `world`.
    pub fn new(world: &World, role: SessionRole, exclude_players: bool) -> Self {
        let mut materials = MaterialArchive::new();
        materials.prepopulate(world);
        Self {
            writer: Writer::new(),
            things: ThingArchive::init_for_save(world, exclude_players),
            materials,
            role,
        }
    }

    /// Archive a mobj cross-reference as its serial ID (long form).
    pub fn write_thing_id(&mut self, world: &World, link: MobjLink) -> Result<(), SaveError> {
        let id = self.things.serial_id_for(world, link.as_ref())?;
        self.writer.write_u32(id);
        Ok(())
    }
}

// ============================================================
// Load context
// ============================================================

/// A cross-reference decoded from the stream whose resolution must wait
/// for the player roster (target-is-a-player sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPlayerLink {
    MobjTarget(MobjRef),
    MobjTracer(MobjRef),
    MobjOnMobj(MobjRef),
    MobjGenerator(MobjRef),
    AcsActivator(usize),
    SectorSoundTarget(u32),
}

pub struct LoadContext {
    pub reader: Reader,
    pub things: ThingArchive,
    pub materials: MaterialArchive,
    pub role: SessionRole,
    /// Format version from the file header; per-record version bytes
    /// refine this for individual entities.
    pub version: i32,
    /// Deferred player-mobj bindings, flushed after reconciliation.
    pub deferred_player_links: Vec<PendingPlayerLink>,
}

impl LoadContext {
    pub fn new(reader: Reader, role: SessionRole, version: i32) -> Self {
        Self {
            reader,
            things: ThingArchive::init_for_load(0),
            materials: MaterialArchive::new(),
            role,
            version,
            deferred_player_links: Vec::new(),
        }
    }

    /// Decode a thing ID in the form this format version uses.
    pub fn read_thing_id(&mut self) -> Result<u32, SaveError> {
        if self.version >= FIRST_LONG_THING_ID_VERSION {
            Ok(self.reader.read_u32()?)
        } else {
            let short = self.reader.read_u16()?;
            if short == thing_archive::TARGET_PLAYER_ID_SHORT {
                Ok(thing_archive::TARGET_PLAYER_ID)
            } else {
                Ok(short as u32)
            }
        }
    }
}
