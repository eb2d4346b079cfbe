// saveg/registry.rs — Thinker class registry and archive dispatch
//
// A fixed table binds each thinker class tag to its serializer pair and
// to whether only the authoritative role persists it (client sessions
// resynchronize those over the network instead). The reader must also
// cope with the tag renumbering across the v4 format boundary: older
// streams used 0-based class tags and a different end sentinel.

use crate::thinkers::{MobjRef, Thinker, ThinkerData};
use crate::world::World;

use super::error::SaveError;
use super::{
    acs, mobj, segment, specials, LoadContext, SaveContext, SessionRole,
    FIRST_SIZED_THING_ARCHIVE_VERSION, FIRST_STASIS_BYTE_VERSION,
};
use super::segment::SegmentTag;
use super::thing_archive::{ThingArchive, LEGACY_THING_ARCHIVE_SIZE};

/// Thinker class tags as written by the current format. Tag 0 terminates
/// the thinker stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ThinkerClass {
    Mobj = 1,
    VerticalDoor = 2,
    MoveFloor = 3,
    MoveCeiling = 4,
    Platform = 5,
    LightFlash = 6,
    Strobe = 7,
    Glow = 8,
    Flicker = 9,
    Phase = 10,
    Pillar = 11,
    FloorWaggle = 12,
    RotatePoly = 13,
    MovePoly = 14,
    PolyDoor = 15,
    Script = 16,
    MaterialChanger = 17,
    Scroller = 18,
}

/// End-of-thinkers sentinel, current numbering.
pub const TC_END: i32 = 0;
/// End-of-thinkers sentinel used by formats before v4.
pub const TC_END_LEGACY: i32 = 255;

/// First format version with the current (1-based) tag numbering.
pub const FIRST_UNIFIED_TAG_VERSION: i32 = 4;

/// A mobj population above this is a corrupt size field, not a map.
const MAX_THING_ARCHIVE_SIZE: usize = 1 << 20;

pub type WriteFn = fn(&mut SaveContext, &World, usize, &Thinker) -> Result<(), SaveError>;
pub type ReadFn = fn(&mut LoadContext, &World) -> Result<ReadThinker, SaveError>;

/// A freshly decoded thinker plus, for mobjs, the archive serial the
/// record carried for itself.
pub struct ReadThinker {
    pub thinker: Thinker,
    pub archive_id: Option<u32>,
}

impl ReadThinker {
    pub fn special(data: ThinkerData) -> Self {
        Self { thinker: Thinker::new(data), archive_id: None }
    }
}

pub struct ThinkerClassDef {
    pub class: ThinkerClass,
    pub name: &'static str,
    /// Persisted only by the authoritative session role.
    pub server_only: bool,
    pub write: WriteFn,
    pub read: ReadFn,
}

fn write_mobj_thinker(
    ctx: &mut SaveContext,
    world: &World,
    slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Mobj(m) = &t.data else {
        return Err(SaveError::Consistency("thinker data does not match its registry class"));
    };
    mobj::write_mobj(ctx, world, MobjRef(slot), m)
}

static REGISTRY: &[ThinkerClassDef] = &[
    ThinkerClassDef {
        class: ThinkerClass::Mobj,
        name: "mobj",
        server_only: false,
        write: write_mobj_thinker,
        read: mobj::read_mobj,
    },
    ThinkerClassDef {
        class: ThinkerClass::VerticalDoor,
        name: "vertical door",
        server_only: true,
        write: specials::write_door,
        read: specials::read_door,
    },
    ThinkerClassDef {
        class: ThinkerClass::MoveFloor,
        name: "moving floor",
        server_only: true,
        write: specials::write_floor,
        read: specials::read_floor,
    },
    ThinkerClassDef {
        class: ThinkerClass::MoveCeiling,
        name: "moving ceiling",
        server_only: true,
        write: specials::write_ceiling,
        read: specials::read_ceiling,
    },
    ThinkerClassDef {
        class: ThinkerClass::Platform,
        name: "platform",
        server_only: true,
        write: specials::write_platform,
        read: specials::read_platform,
    },
    ThinkerClassDef {
        class: ThinkerClass::LightFlash,
        name: "light flash",
        server_only: true,
        write: specials::write_light_flash,
        read: specials::read_light_flash,
    },
    ThinkerClassDef {
        class: ThinkerClass::Strobe,
        name: "strobe",
        server_only: true,
        write: specials::write_strobe,
        read: specials::read_strobe,
    },
    ThinkerClassDef {
        class: ThinkerClass::Glow,
        name: "glow",
        server_only: true,
        write: specials::write_glow,
        read: specials::read_glow,
    },
    ThinkerClassDef {
        class: ThinkerClass::Flicker,
        name: "flicker",
        server_only: true,
        write: specials::write_flicker,
        read: specials::read_flicker,
    },
    ThinkerClassDef {
        class: ThinkerClass::Phase,
        name: "phased light",
        server_only: true,
        write: specials::write_phase,
        read: specials::read_phase,
    },
    ThinkerClassDef {
        class: ThinkerClass::Pillar,
        name: "build pillar",
        server_only: true,
        write: specials::write_pillar,
        read: specials::read_pillar,
    },
    ThinkerClassDef {
        class: ThinkerClass::FloorWaggle,
        name: "floor waggle",
        server_only: true,
        write: specials::write_waggle,
        read: specials::read_waggle,
    },
    ThinkerClassDef {
        class: ThinkerClass::RotatePoly,
        name: "rotate poly",
        server_only: true,
        write: specials::write_rotate_poly,
        read: specials::read_rotate_poly,
    },
    ThinkerClassDef {
        class: ThinkerClass::MovePoly,
        name: "move poly",
        server_only: true,
        write: specials::write_move_poly,
        read: specials::read_move_poly,
    },
    ThinkerClassDef {
        class: ThinkerClass::PolyDoor,
        name: "poly door",
        server_only: true,
        write: specials::write_poly_door,
        read: specials::read_poly_door,
    },
    ThinkerClassDef {
        class: ThinkerClass::Script,
        name: "script interpreter",
        server_only: true,
        write: acs::write_acs,
        read: acs::read_acs,
    },
    ThinkerClassDef {
        class: ThinkerClass::MaterialChanger,
        name: "material changer",
        server_only: false,
        write: specials::write_material_changer,
        read: specials::read_material_changer,
    },
    ThinkerClassDef {
        class: ThinkerClass::Scroller,
        name: "scroller",
        server_only: false,
        write: specials::write_scroller,
        read: specials::read_scroller,
    },
];

/// The registry entry for a live thinker's class.
pub fn classify(data: &ThinkerData) -> ThinkerClass {
    match data {
        ThinkerData::Mobj(_) => ThinkerClass::Mobj,
        ThinkerData::Door(_) => ThinkerClass::VerticalDoor,
        ThinkerData::Floor(_) => ThinkerClass::MoveFloor,
        ThinkerData::Ceiling(_) => ThinkerClass::MoveCeiling,
        ThinkerData::Platform(_) => ThinkerClass::Platform,
        ThinkerData::LightFlash(_) => ThinkerClass::LightFlash,
        ThinkerData::Strobe(_) => ThinkerClass::Strobe,
        ThinkerData::Glow(_) => ThinkerClass::Glow,
        ThinkerData::Flicker(_) => ThinkerClass::Flicker,
        ThinkerData::Phase(_) => ThinkerClass::Phase,
        ThinkerData::Pillar(_) => ThinkerClass::Pillar,
        ThinkerData::Waggle(_) => ThinkerClass::FloorWaggle,
        ThinkerData::RotatePoly(_) => ThinkerClass::RotatePoly,
        ThinkerData::MovePoly(_) => ThinkerClass::MovePoly,
        ThinkerData::PolyDoor(_) => ThinkerClass::PolyDoor,
        ThinkerData::Acs(_) => ThinkerClass::Script,
        ThinkerData::MaterialChanger(_) => ThinkerClass::MaterialChanger,
        ThinkerData::Scroller(_) => ThinkerClass::Scroller,
    }
}

fn def_for(class: ThinkerClass) -> &'static ThinkerClassDef {
    // The table is ordered by tag, tags are contiguous from 1.
    let def = &REGISTRY[(class as i32 - 1) as usize];
    debug_assert_eq!(def.class, class);
    def
}

fn class_from_tag(tag: i32) -> Option<ThinkerClass> {
    REGISTRY.iter().find(|d| d.class as i32 == tag).map(|d| d.class)
}

/// Map a raw tag from the stream to a class under the numbering scheme
/// the enclosing format version used. `Ok(None)` is the end sentinel.
pub fn translate_class_tag(
    raw: i32,
    format_version: i32,
) -> Result<Option<ThinkerClass>, SaveError> {
    if format_version >= FIRST_UNIFIED_TAG_VERSION {
        if raw == TC_END {
            return Ok(None);
        }
        class_from_tag(raw).map(Some).ok_or(SaveError::UnknownThinkerClass { tag: raw })
    } else {
        if raw == TC_END_LEGACY {
            return Ok(None);
        }
        // Old streams wrote 0-based tags.
        class_from_tag(raw + 1).map(Some).ok_or(SaveError::UnknownThinkerClass { tag: raw })
    }
}

// ============================================================
// Whole-list dispatch
// ============================================================

/// Archive every live thinker: class tag, stasis byte, record. The
/// sequence terminates with the reserved end tag inside the Thinkers
/// segment.
pub fn write_all(ctx: &mut SaveContext, world: &World) -> Result<(), SaveError> {
    segment::begin_segment(&mut ctx.writer, SegmentTag::Thinkers);
    ctx.writer.write_u32(ctx.things.capacity() as u32);

    for (slot, t) in world.thinkers.iter() {
        let def = def_for(classify(&t.data));
        if ctx.role == SessionRole::Client && def.server_only {
            continue;
        }
        if let ThinkerData::Mobj(m) = &t.data {
            // Player mobjs are left out of cluster-transition archives;
            // references to them carry the target-player sentinel.
            if ctx.things.excluding_players() && m.player.is_some() {
                continue;
            }
        }
        ctx.writer.write_i32(def.class as i32);
        ctx.writer.write_u8(t.in_stasis as u8);
        (def.write)(ctx, world, slot, t)?;
    }
    ctx.writer.write_i32(TC_END);
    Ok(())
}

/// Rebuild the thinker list from the stream, registering each decoded
/// thinker with the scheduler and the thing archive. Cross-references
/// stay Pending until the orchestrator's link-fixup pass.
pub fn read_all(ctx: &mut LoadContext, world: &mut World) -> Result<(), SaveError> {
    segment::assert_segment(&mut ctx.reader, SegmentTag::Thinkers)?;

    let capacity = if ctx.version >= FIRST_SIZED_THING_ARCHIVE_VERSION {
        ctx.reader.read_u32()? as usize
    } else {
        LEGACY_THING_ARCHIVE_SIZE
    };
    if capacity > MAX_THING_ARCHIVE_SIZE {
        return Err(SaveError::Consistency("thing archive size exceeds the plausible limit"));
    }
    ctx.things = ThingArchive::init_for_load(capacity);

    // Formats predating per-record archive IDs assign them in read order.
    let mut legacy_seq: u32 = 0;

    loop {
        let raw = ctx.reader.read_i32()?;
        let Some(class) = translate_class_tag(raw, ctx.version)? else {
            break;
        };
        let def = def_for(class);

        let in_stasis = if ctx.version >= FIRST_STASIS_BYTE_VERSION {
            ctx.reader.read_u8()? != 0
        } else {
            false
        };

        let decoded = (def.read)(ctx, world)?;
        let is_mobj = matches!(decoded.thinker.data, ThinkerData::Mobj(_));
        let archive_id = decoded.archive_id;

        let idx = world.thinkers.add(decoded.thinker);
        if in_stasis {
            world.thinkers.set_stasis(idx, true);
        }
        if is_mobj {
            let id = match archive_id {
                Some(id) => id,
                None => {
                    legacy_seq += 1;
                    legacy_seq
                }
            };
            ctx.things.insert(MobjRef(idx), id)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thinkers::{Door, Floor, Mobj, Thinkers};
    use crate::world::Sector;
    use crate::saveg::SAVE_VERSION;
    use hxd_common::stream::Reader;

    fn test_world() -> World {
        let mut world = World::new_for_map(1, 1);
        world.sectors = vec![Sector::default(), Sector::default()];
        let mut th = Thinkers::new();
        th.add(Thinker::new(ThinkerData::Mobj(Mobj { health: 40, ..Mobj::default() })));
        let floor = th.add(Thinker::new(ThinkerData::Floor(Floor {
            sector: 1,
            dest_height: 72.0,
            speed: 2.0,
            ..Floor::default()
        })));
        th.add(Thinker::new(ThinkerData::Door(Door { sector: 0, ..Door::default() })));
        th.set_stasis(floor, true);
        world.thinkers = th;
        world
    }

    fn save_then_load(world: &World, role_w: SessionRole) -> World {
        let mut ctx = SaveContext::new(world, role_w, false);
        write_all(&mut ctx, world).unwrap();

        let mut fresh = World::new_for_map(1, 1);
        fresh.sectors = world.sectors.clone();
        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        lctx.materials = ctx.materials;
        read_all(&mut lctx, &mut fresh).unwrap();
        assert!(lctx.reader.is_at_end());
        fresh
    }

    #[test]
    fn test_write_read_all_preserves_classes_and_stasis() {
        let world = test_world();
        let fresh = save_then_load(&world, SessionRole::Authoritative);

        assert_eq!(fresh.thinkers.len(), 3);
        let stasis: Vec<bool> = fresh.thinkers.iter().map(|(_, t)| t.in_stasis).collect();
        // The floor was in stasis; order is preserved.
        assert_eq!(stasis, vec![false, true, false]);
    }

    #[test]
    fn test_client_role_skips_server_only_classes() {
        let world = test_world();
        let fresh = save_then_load(&world, SessionRole::Client);
        // Only the mobj survives a client-side archive.
        assert_eq!(fresh.thinkers.len(), 1);
        assert!(matches!(
            fresh.thinkers.get(0).unwrap().data,
            ThinkerData::Mobj(_)
        ));
    }

    #[test]
    fn test_unknown_class_tag_is_fatal() {
        let mut w = hxd_common::stream::Writer::new();
        segment::begin_segment(&mut w, SegmentTag::Thinkers);
        w.write_u32(0);
        w.write_i32(93); // no such class

        let mut lctx = LoadContext::new(
            Reader::new(w.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        let mut world = World::new_for_map(1, 1);
        assert!(matches!(
            read_all(&mut lctx, &mut world),
            Err(SaveError::UnknownThinkerClass { tag: 93 })
        ));
    }

    #[test]
    fn test_legacy_tag_translation() {
        // Pre-v4 numbering: 0-based tags, 255 terminator.
        assert_eq!(translate_class_tag(255, 3).unwrap(), None);
        assert_eq!(translate_class_tag(0, 3).unwrap(), Some(ThinkerClass::Mobj));
        assert_eq!(translate_class_tag(1, 3).unwrap(), Some(ThinkerClass::VerticalDoor));
        // Current numbering.
        assert_eq!(translate_class_tag(TC_END, SAVE_VERSION).unwrap(), None);
        assert_eq!(
            translate_class_tag(1, SAVE_VERSION).unwrap(),
            Some(ThinkerClass::Mobj)
        );
        assert!(translate_class_tag(200, SAVE_VERSION).is_err());
    }
}
