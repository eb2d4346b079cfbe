// thinkers.rs — The per-tick update scheduler's object table
//
// Everything registered with the ticker lives here: mobjs, plane movers,
// polyobj movers, lights, and script interpreters. Slots are reused on
// removal, so a MobjRef stays valid for the lifetime of the thinker it
// names.

use crate::world::{MobjFlags, MobjFlags2, MobjFlags3, MobjLink, Vec2, Vec3};

/// Index of a mobj's slot in the thinker table. The save subsystem never
/// serializes one of these directly; it archives them as small serial
/// IDs through the thing archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MobjRef(pub usize);

// ============================================================
// Mobj
// ============================================================

/// A movable map object: monster, player avatar, projectile, decoration.
#[derive(Debug, Clone, PartialEq)]
pub struct Mobj {
    /// Index into the static mobj info table (see info.rs).
    pub type_id: u16,
    pub state: i32,
    pub pos: Vec3,
    pub mom: Vec3,
    pub angle: f32,
    pub sprite: i32,
    pub frame: i32,
    pub radius: f32,
    pub height: f32,
    pub floor_z: f32,
    pub ceiling_z: f32,
    /// Rendering sink into the floor (format v5+).
    pub floor_clip: f32,
    pub health: i32,
    pub flags: MobjFlags,
    pub flags2: MobjFlags2,
    pub flags3: MobjFlags3,
    pub tics: i32,
    pub move_dir: i32,
    pub move_count: i32,
    pub reaction_time: i32,
    pub threshold: i32,
    pub special1: i32,
    pub special2: i32,
    /// Roster index of the controlling player, if any.
    pub player: Option<usize>,
    pub target: MobjLink,
    pub tracer: MobjLink,
    pub on_mobj: MobjLink,
    pub generator: MobjLink,
    /// Where this thing respawns (format v6+).
    pub spawn_spot: SpawnSpot,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnSpot {
    pub pos: Vec3,
    pub angle: f32,
    pub flags: i16,
}

impl Default for Mobj {
    fn default() -> Self {
        Self {
            type_id: 0,
            state: 0,
            pos: [0.0; 3],
            mom: [0.0; 3],
            angle: 0.0,
            sprite: 0,
            frame: 0,
            radius: 16.0,
            height: 56.0,
            floor_z: 0.0,
            ceiling_z: 128.0,
            floor_clip: 0.0,
            health: 0,
            flags: MobjFlags::default(),
            flags2: MobjFlags2::default(),
            flags3: MobjFlags3::default(),
            tics: 0,
            move_dir: 0,
            move_count: 0,
            reaction_time: 0,
            threshold: 0,
            special1: 0,
            special2: 0,
            player: None,
            target: MobjLink::None,
            tracer: MobjLink::None,
            on_mobj: MobjLink::None,
            generator: MobjLink::None,
            spawn_spot: SpawnSpot::default(),
        }
    }
}

// ============================================================
// Sector and polyobj specials
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Door {
    pub sector: u32,
    pub kind: i32,
    pub top_height: f32,
    pub speed: f32,
    /// 1 = up, 0 = waiting, -1 = down.
    pub direction: i32,
    pub top_wait: i32,
    pub top_countdown: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Floor {
    pub sector: u32,
    pub kind: i32,
    pub crush: bool,
    pub direction: i32,
    pub new_special: i16,
    /// Material the floor changes to on arrival. Absent before record
    /// v2; derived from the sector's current floor when missing.
    pub material: String,
    pub dest_height: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ceiling {
    pub sector: u32,
    pub kind: i32,
    pub bottom_height: f32,
    pub top_height: f32,
    pub speed: f32,
    pub crush: bool,
    pub direction: i32,
    pub tag: i16,
    pub old_direction: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Platform {
    pub sector: u32,
    pub speed: f32,
    pub low: f32,
    pub high: f32,
    pub wait: i32,
    pub count: i32,
    pub state: i32,
    pub old_state: i32,
    pub crush: bool,
    pub tag: i16,
    pub kind: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightFlash {
    pub sector: u32,
    pub count: i32,
    pub max_light: i32,
    pub min_light: i32,
    pub max_time: i32,
    pub min_time: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Strobe {
    pub sector: u32,
    pub count: i32,
    pub min_light: i32,
    pub max_light: i32,
    pub dark_time: i32,
    pub bright_time: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Glow {
    pub sector: u32,
    pub min_light: i32,
    pub max_light: i32,
    pub direction: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Flicker {
    pub sector: u32,
    pub count: i32,
    pub max_light: i32,
    pub min_light: i32,
}

/// Phased (wave) lighting, Hexen variant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Phase {
    pub sector: u32,
    pub index: i32,
    pub base_light: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pillar {
    pub sector: u32,
    pub ceiling_speed: f32,
    pub floor_speed: f32,
    pub floor_dest: f32,
    pub ceiling_dest: f32,
    pub direction: i32,
    pub crush: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Waggle {
    pub sector: u32,
    pub original_height: f32,
    pub accumulator: f32,
    pub acc_delta: f32,
    pub target_scale: f32,
    pub scale: f32,
    pub scale_delta: f32,
    pub ticker: i32,
    pub state: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RotatePoly {
    pub polyobj: u32,
    pub speed: f32,
    pub dist: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovePoly {
    pub polyobj: u32,
    pub speed: f32,
    pub dist: f32,
    pub angle: f32,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolyDoor {
    pub polyobj: u32,
    pub kind: i32,
    pub speed: f32,
    pub dist: f32,
    pub angle: f32,
    pub velocity: Vec2,
    pub total_dist: f32,
    pub direction: i32,
    pub tics: i32,
    pub wait_tics: i32,
    pub close: bool,
}

/// A running ACS script interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct AcsInterpreter {
    pub script: i32,
    pub delay_count: i32,
    pub ip: u32,
    pub stack: Vec<i32>,
    pub vars: [i32; 10],
    pub activator: MobjLink,
    pub line: Option<u32>,
    pub side: u8,
}

impl Default for AcsInterpreter {
    fn default() -> Self {
        Self {
            script: 0,
            delay_count: 0,
            ip: 0,
            stack: Vec::new(),
            vars: [0; 10],
            activator: MobjLink::None,
            line: None,
            side: 0,
        }
    }
}

/// Swaps a side section's material after a countdown.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaterialChanger {
    pub timer: i32,
    pub side: u32,
    /// 0 = top, 1 = middle, 2 = bottom.
    pub section: u8,
    pub material: String,
}

/// Texture scroller on a side (kind 0) or a sector plane (kind 1).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scroller {
    pub kind: u8,
    pub element: u32,
    pub offset: Vec2,
}

// ============================================================
// Thinker table
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ThinkerData {
    Mobj(Mobj),
    Door(Door),
    Floor(Floor),
    Ceiling(Ceiling),
    Platform(Platform),
    LightFlash(LightFlash),
    Strobe(Strobe),
    Glow(Glow),
    Flicker(Flicker),
    Phase(Phase),
    Pillar(Pillar),
    Waggle(Waggle),
    RotatePoly(RotatePoly),
    MovePoly(MovePoly),
    PolyDoor(PolyDoor),
    Acs(AcsInterpreter),
    MaterialChanger(MaterialChanger),
    Scroller(Scroller),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thinker {
    /// Paused thinkers stay registered but are skipped by the ticker.
    pub in_stasis: bool,
    pub data: ThinkerData,
}

impl Thinker {
    pub fn new(data: ThinkerData) -> Self {
        Self { in_stasis: false, data }
    }

    pub fn as_mobj(&self) -> Option<&Mobj> {
        match &self.data {
            ThinkerData::Mobj(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mobj_mut(&mut self) -> Option<&mut Mobj> {
        match &mut self.data {
            ThinkerData::Mobj(m) => Some(m),
            _ => None,
        }
    }
}

/// Slot table of all registered thinkers. Freed slots are reused so that
/// surviving indices stay stable.
#[derive(Debug, Default)]
pub struct Thinkers {
    slots: Vec<Option<Thinker>>,
}

impl Thinkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a thinker with the scheduler, reusing a free slot when
    /// one exists.
    pub fn add(&mut self, thinker: Thinker) -> usize {
        if let Some(idx) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[idx] = Some(thinker);
            idx
        } else {
            self.slots.push(Some(thinker));
            self.slots.len() - 1
        }
    }

    pub fn remove(&mut self, idx: usize) -> Option<Thinker> {
        self.slots.get_mut(idx).and_then(|s| s.take())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn get(&self, idx: usize) -> Option<&Thinker> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Thinker> {
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    pub fn set_stasis(&mut self, idx: usize, in_stasis: bool) {
        if let Some(t) = self.get_mut(idx) {
            t.in_stasis = in_stasis;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live thinkers with their slot indices, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Thinker)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|t| (i, t)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Thinker)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| s.as_mut().map(|t| (i, t)))
    }

    /// Every mobj thinker, in slot order.
    pub fn mobjs(&self) -> impl Iterator<Item = (MobjRef, &Mobj)> {
        self.iter().filter_map(|(i, t)| t.as_mobj().map(|m| (MobjRef(i), m)))
    }

    pub fn mobj(&self, r: MobjRef) -> Option<&Mobj> {
        self.get(r.0).and_then(|t| t.as_mobj())
    }

    pub fn mobj_mut(&mut self, r: MobjRef) -> Option<&mut Mobj> {
        self.get_mut(r.0).and_then(|t| t.as_mobj_mut())
    }

    /// Count mobj thinkers, optionally skipping player-controlled ones.
    pub fn count_mobjs(&self, exclude_players: bool) -> usize {
        self.mobjs()
            .filter(|(_, m)| !(exclude_players && m.player.is_some()))
            .count()
    }
}
