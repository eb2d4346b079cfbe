// world.rs — Live map state: geometry elements, players, misc directors
//
// The world owns every entity the save subsystem archives. Map geometry
// lives in flat element arrays addressed by 0-based index; mobjs live in
// the thinker table (see thinkers.rs) and are addressed by MobjRef.

use bitflags::bitflags;

use crate::thinkers::{MobjRef, ThinkerData, Thinkers};

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];

/// Maximum simultaneous players in a session.
pub const MAXPLAYERS: usize = 8;

pub const NUM_POWERS: usize = 6;
pub const NUM_KEYS: usize = 6;
pub const NUM_WEAPONS: usize = 9;
pub const NUM_AMMO: usize = 4;

/// Corpses beyond this count are recycled oldest-first.
pub const CORPSE_QUEUE_SIZE: usize = 16;

// ============================================================
// Cross-reference links
// ============================================================

/// A mobj cross-reference as it exists in the live world.
///
/// During load, fields decoded from the stream hold `Pending` serial IDs
/// until the link-fixup pass converts every one of them to `Live` or
/// `None`. No `Pending` value survives a completed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MobjLink {
    #[default]
    None,
    Live(MobjRef),
    Pending(u32),
}

impl MobjLink {
    pub fn as_ref(&self) -> Option<MobjRef> {
        match self {
            MobjLink::Live(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MobjLink::Pending(_))
    }
}

// ============================================================
// Flags
// ============================================================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MobjFlags: i32 {
        const SPECIAL      = 0x0000_0001;
        const SOLID        = 0x0000_0002;
        const SHOOTABLE    = 0x0000_0004;
        const NOSECTOR     = 0x0000_0008;
        const NOBLOCKMAP   = 0x0000_0010;
        const AMBUSH       = 0x0000_0020;
        const JUSTHIT      = 0x0000_0040;
        const NOGRAVITY    = 0x0000_0200;
        const DROPOFF      = 0x0000_0400;
        const PICKUP       = 0x0000_0800;
        const NOCLIP       = 0x0000_1000;
        const FLOAT        = 0x0000_4000;
        const MISSILE      = 0x0001_0000;
        const DROPPED      = 0x0002_0000;
        const SHADOW       = 0x0004_0000;
        const NOBLOOD      = 0x0008_0000;
        const CORPSE       = 0x0010_0000;
        const COUNTKILL    = 0x0040_0000;
        const COUNTITEM    = 0x0080_0000;
        const SKULLFLY     = 0x0100_0000;
        const NOTDMATCH    = 0x0200_0000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MobjFlags2: i32 {
        const LOGRAV        = 0x0000_0001;
        const WINDTHRUST    = 0x0000_0002;
        const FLOORBOUNCE   = 0x0000_0004;
        const BLASTED       = 0x0000_0008;
        const FLY           = 0x0000_0010;
        const FLOORCLIP     = 0x0000_0020;
        const SPAWNFLOAT    = 0x0000_0040;
        const NOTELEPORT    = 0x0000_0080;
        const RIP           = 0x0000_0100;
        const PUSHABLE      = 0x0000_0200;
        const SLIDE         = 0x0000_0400;
        const PASSMOBJ      = 0x0000_2000;
        const CANNOTPUSH    = 0x0000_4000;
        const BOSS          = 0x0001_0000;
        const SEEKERMISSILE = 0x0004_0000;
        const REFLECTIVE    = 0x0020_0000;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MobjFlags3: i32 {
        const NOINFIGHT   = 0x0000_0001;
        const NOMORPH     = 0x0000_0002;
        const CRUSHABLE   = 0x0000_0004;
        const NOBLAST     = 0x0000_0008;
    }
}

bitflags! {
    /// Engine-side line flags. Game-side "extended" flags are kept in
    /// `Line::xflags`; saves before format v4 stored both merged into a
    /// single word.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LineFlags: i16 {
        const BLOCKING      = 0x0001;
        const BLOCK_MONSTERS = 0x0002;
        const TWO_SIDED     = 0x0004;
        const DONT_PEG_TOP  = 0x0008;
        const DONT_PEG_BOTTOM = 0x0010;
        const SECRET        = 0x0020;
        const SOUND_BLOCK   = 0x0040;
        const DONT_DRAW     = 0x0080;
        const MAPPED        = 0x0100;
    }
}

// ============================================================
// Map geometry elements
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

/// One face of a wall segment. Materials are referenced by name in the
/// live world; the archive stores serial IDs from the material archive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Side {
    pub sector: u32,
    pub offset: Vec2,
    pub top_material: String,
    pub middle_material: String,
    pub bottom_material: String,
    pub top_rgb: [u8; 3],
    pub middle_rgba: [u8; 4],
    pub bottom_rgb: [u8; 3],
    pub blend_mode: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    pub v: [u32; 2],
    pub flags: LineFlags,
    /// Game-side flags, split from `flags` on the wire as of format v4.
    pub xflags: i16,
    pub special: i16,
    pub tag: i16,
    pub args: [u8; 5],
    pub activated: bool,
    pub sides: [Option<u32>; 2],
    /// Which players have seen this line on the automap.
    pub mapped: [bool; MAXPLAYERS],
    /// Transient traversal marker; never archived.
    pub valid_count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sector {
    pub floor_height: f32,
    pub ceiling_height: f32,
    pub floor_material: String,
    pub ceiling_material: String,
    pub light_level: u8,
    pub rgb: [u8; 3],
    pub special: i16,
    pub tag: i16,
    pub seq_type: u8,
    pub sound_target: MobjLink,
    /// Back-link to the thinker currently running a special on this
    /// sector. Re-derived after load, never written to the stream.
    pub special_data: Option<usize>,
    /// Cached plane base heights, re-derived after load.
    pub floor_base: f32,
    pub ceiling_base: f32,
}

impl Default for Sector {
    fn default() -> Self {
        Self {
            floor_height: 0.0,
            ceiling_height: 128.0,
            floor_material: String::new(),
            ceiling_material: String::new(),
            light_level: 255,
            rgb: [255, 255, 255],
            special: 0,
            tag: 0,
            seq_type: 0,
            sound_target: MobjLink::None,
            special_data: None,
            floor_base: 0.0,
            ceiling_base: 128.0,
        }
    }
}

/// Movable, rotatable cluster of map geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polyobj {
    pub tag: i32,
    pub angle: f32,
    pub origin: Vec2,
    pub line_count: u32,
    pub seq_type: u8,
    pub crush: bool,
}

// BSP tree and lookup structures. Static per map build; archived only by
// the cached-map (dam) protocol, never by saves.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Seg {
    pub v: [u32; 2],
    pub angle: u16,
    pub line: i32,
    pub side: u8,
    pub offset: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BspLeaf {
    pub seg_count: u32,
    pub first_seg: u32,
    pub sector: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BspNode {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub bbox: [[f32; 4]; 2],
    pub children: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blockmap {
    pub origin: Vec2,
    pub dimensions: [u32; 2],
    pub table: Vec<i32>,
}

// ============================================================
// Players
// ============================================================

/// Per-player game state. Identity across sessions is the stable `id`,
/// never the roster slot index.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub in_game: bool,
    pub mobj: MobjLink,
    pub health: i32,
    pub armor_points: i32,
    pub armor_type: i32,
    pub powers: [i32; NUM_POWERS],
    pub keys: [bool; NUM_KEYS],
    pub weapons_owned: [bool; NUM_WEAPONS],
    pub ready_weapon: i32,
    pub pending_weapon: i32,
    pub ammo: [i32; NUM_AMMO],
    pub max_ammo: [i32; NUM_AMMO],
    pub cheats: i32,
    pub refire: i32,
    pub kill_count: i32,
    pub item_count: i32,
    pub secret_count: i32,
    pub view_height: f32,
    pub look_dir: f32,
    pub morph_tics: i32,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            id: 0,
            in_game: false,
            mobj: MobjLink::None,
            health: 100,
            armor_points: 0,
            armor_type: 0,
            powers: [0; NUM_POWERS],
            keys: [false; NUM_KEYS],
            weapons_owned: [false; NUM_WEAPONS],
            ready_weapon: 0,
            pending_weapon: 0,
            ammo: [0; NUM_AMMO],
            max_ammo: [200, 50, 300, 50],
            cheats: 0,
            refire: 0,
            kill_count: 0,
            item_count: 0,
            secret_count: 0,
            view_height: 41.0,
            look_dir: 0.0,
            morph_tics: 0,
        }
    }
}

// ============================================================
// Misc directors and script state
// ============================================================

/// Boss-director state (Doom variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrainState {
    pub easy: i32,
    pub targets_on: bool,
}

/// A script queued to start once its map becomes current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredScript {
    pub map: u32,
    pub script: i32,
    pub args: [u8; 4],
}

pub const NUM_WORLD_VARS: usize = 64;

/// Session-wide script interpreter state (Hexen variant). Active
/// interpreters are thinkers; this holds everything that outlives them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptState {
    pub world_vars: [i32; NUM_WORLD_VARS],
    pub deferred: Vec<DeferredScript>,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self { world_vars: [0; NUM_WORLD_VARS], deferred: Vec::new() }
    }
}

// ============================================================
// World container
// ============================================================

/// Full live simulation state for one map plus the session-scoped parts
/// (players, script state) that travel across hub transitions.
#[derive(Debug, Default)]
pub struct World {
    pub episode: u32,
    pub map: u32,
    pub map_time: i32,

    pub vertexes: Vec<Vertex>,
    pub lines: Vec<Line>,
    pub sides: Vec<Side>,
    pub sectors: Vec<Sector>,
    pub polyobjs: Vec<Polyobj>,

    pub segs: Vec<Seg>,
    pub bsp_leafs: Vec<BspLeaf>,
    pub bsp_nodes: Vec<BspNode>,
    pub blockmap: Blockmap,
    pub reject: Vec<u8>,

    pub thinkers: Thinkers,
    pub players: Vec<Player>,

    pub brain: BrainState,
    pub script_state: ScriptState,
    /// Rebuilt after load by scanning the thinker list; never archived.
    pub corpse_queue: Vec<MobjRef>,
}

impl World {
    /// Fresh, empty simulation for the given map. Geometry is populated
    /// by the map loader (or the cached-map archive) before play begins.
    pub fn new_for_map(episode: u32, map: u32) -> Self {
        Self {
            episode,
            map,
            players: (0..MAXPLAYERS).map(|_| Player::default()).collect(),
            ..Self::default()
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|p| p.in_game).count()
    }

    /// Rebuild the corpse queue from the reconstructed thinker list.
    pub fn rebuild_corpse_queue(&mut self) {
        self.corpse_queue.clear();
        for (r, mobj) in self.thinkers.mobjs() {
            if mobj.flags.contains(MobjFlags::CORPSE) {
                if self.corpse_queue.len() == CORPSE_QUEUE_SIZE {
                    break;
                }
                self.corpse_queue.push(r);
            }
        }
    }

    /// Erase every reference to a mobj that is about to be removed. Its
    /// slot is reused by the next spawn, so a stale link would silently
    /// retarget the referrer at whatever lands there.
    pub fn unlink_mobj(&mut self, r: MobjRef) {
        let dead = MobjLink::Live(r);
        for (_, t) in self.thinkers.iter_mut() {
            match &mut t.data {
                ThinkerData::Mobj(m) => {
                    for link in [&mut m.target, &mut m.tracer, &mut m.on_mobj, &mut m.generator] {
                        if *link == dead {
                            *link = MobjLink::None;
                        }
                    }
                }
                ThinkerData::Acs(a) => {
                    if a.activator == dead {
                        a.activator = MobjLink::None;
                    }
                }
                _ => {}
            }
        }
        for sector in &mut self.sectors {
            if sector.sound_target == dead {
                sector.sound_target = MobjLink::None;
            }
        }
        for player in &mut self.players {
            if player.mobj == dead {
                player.mobj = MobjLink::None;
            }
        }
        self.corpse_queue.retain(|c| *c != r);
    }

    /// Re-derive cached plane bases that are intentionally not archived.
    pub fn update_plane_bases(&mut self) {
        for sector in &mut self.sectors {
            sector.floor_base = sector.floor_height;
            sector.ceiling_base = sector.ceiling_height;
        }
    }
}
