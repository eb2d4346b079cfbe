// saveg/map_archive.rs — Per-map state archive orchestrator
//
// One map's worth of mutable simulation state, framed as tagged segments
// in a fixed order. The material dictionary leads so that every element
// record decoded after it can resolve its serials; thinkers come after
// the map elements they reference. A single misread anywhere shifts the
// stream and trips the next segment assertion, so drift is fatal rather
// than silent.

use log::debug;

use crate::thinkers::{MobjRef, ThinkerData};
use crate::world::{MobjLink, World, MAXPLAYERS};

use super::error::SaveError;
use super::material_archive::{MaterialArchive, MaterialArchiveVersion};
use super::registry;
use super::segment::{self, SegmentTag};
use super::thing_archive::ResolvedThing;
use super::{LoadContext, PendingPlayerLink, SaveContext};

/// Polyobj record version.
const POLYOBJ_SAVE_VERSION: u8 = 1;

/// Formats before this one wrote the fixed-cell material dictionary.
pub const FIRST_SIZED_MATERIAL_NAME_VERSION: i32 = 6;

fn material_layout(format_version: i32) -> MaterialArchiveVersion {
    if format_version >= FIRST_SIZED_MATERIAL_NAME_VERSION {
        MaterialArchiveVersion::V1
    } else {
        MaterialArchiveVersion::V0
    }
}

// ============================================================
// Write side
// ============================================================

/// Archive the whole mutable state of the current map.
pub fn write_map_state(ctx: &mut SaveContext, world: &World) -> Result<(), SaveError> {
    debug!(
        "archiving map E{}M{}: {} sectors, {} lines, {} thinkers",
        world.episode,
        world.map,
        world.sectors.len(),
        world.lines.len(),
        world.thinkers.len()
    );

    segment::begin_segment(&mut ctx.writer, SegmentTag::MapHeader);
    ctx.writer.write_u32(world.episode);
    ctx.writer.write_u32(world.map);
    ctx.writer.write_i32(world.map_time);

    // The dictionary was prepopulated from the world when the context was
    // built, so it is complete before any element record is written.
    segment::begin_segment(&mut ctx.writer, SegmentTag::MaterialArchive);
    ctx.materials.write(&mut ctx.writer, MaterialArchiveVersion::V1);

    segment::begin_segment(&mut ctx.writer, SegmentTag::MapElements);
    ctx.writer.write_u32(world.sectors.len() as u32);
    for i in 0..world.sectors.len() as u32 {
        super::sector::write_sector(ctx, world, i)?;
    }
    ctx.writer.write_u32(world.lines.len() as u32);
    for i in 0..world.lines.len() as u32 {
        super::sector::write_line(ctx, world, i)?;
    }

    segment::begin_segment(&mut ctx.writer, SegmentTag::Polyobjs);
    ctx.writer.write_u32(world.polyobjs.len() as u32);
    for po in &world.polyobjs {
        ctx.writer.write_u8(POLYOBJ_SAVE_VERSION);
        ctx.writer.write_i32(po.tag);
        ctx.writer.write_f32(po.angle);
        ctx.writer.write_f32(po.origin[0]);
        ctx.writer.write_f32(po.origin[1]);
    }

    registry::write_all(ctx, world)?;

    segment::begin_segment(&mut ctx.writer, SegmentTag::Misc);
    ctx.writer.write_i32(world.brain.easy);
    ctx.writer.write_u8(world.brain.targets_on as u8);

    write_sound_targets(ctx, world)?;

    segment::end_segment(&mut ctx.writer);
    Ok(())
}

/// Sound-blocking propagation targets live on sectors but reference
/// mobjs, so they are archived after the thinker pass as (sector, thing)
/// pairs.
fn write_sound_targets(ctx: &mut SaveContext, world: &World) -> Result<(), SaveError> {
    segment::begin_segment(&mut ctx.writer, SegmentTag::Sounds);
    let targeted: Vec<u32> = world
        .sectors
        .iter()
        .enumerate()
        .filter(|(_, s)| s.sound_target != MobjLink::None)
        .map(|(i, _)| i as u32)
        .collect();
    ctx.writer.write_u32(targeted.len() as u32);
    for i in targeted {
        ctx.writer.write_u32(i);
        let target = world.sectors[i as usize].sound_target;
        ctx.write_thing_id(world, target)?;
    }
    Ok(())
}

// ============================================================
// Read side
// ============================================================

/// Restore one map's state over freshly loaded geometry. Element counts
/// must match the loaded map; thinker cross-references are resolved in a
/// fixup pass once every record has been decoded.
pub fn read_map_state(ctx: &mut LoadContext, world: &mut World) -> Result<(), SaveError> {
    segment::assert_segment(&mut ctx.reader, SegmentTag::MapHeader)?;
    world.episode = ctx.reader.read_u32()?;
    world.map = ctx.reader.read_u32()?;
    world.map_time = ctx.reader.read_i32()?;

    segment::assert_segment(&mut ctx.reader, SegmentTag::MaterialArchive)?;
    ctx.materials = MaterialArchive::read(&mut ctx.reader, material_layout(ctx.version))?;

    segment::assert_segment(&mut ctx.reader, SegmentTag::MapElements)?;
    let sector_count = ctx.reader.read_u32()?;
    if sector_count as usize != world.sectors.len() {
        return Err(SaveError::Consistency("sector count differs from the loaded map"));
    }
    for i in 0..sector_count {
        super::sector::read_sector(ctx, world, i)?;
    }
    let line_count = ctx.reader.read_u32()?;
    if line_count as usize != world.lines.len() {
        return Err(SaveError::Consistency("line count differs from the loaded map"));
    }
    for i in 0..line_count {
        super::sector::read_line(ctx, world, i)?;
    }

    segment::assert_segment(&mut ctx.reader, SegmentTag::Polyobjs)?;
    let po_count = ctx.reader.read_u32()?;
    if po_count as usize != world.polyobjs.len() {
        return Err(SaveError::Consistency("polyobj count differs from the loaded map"));
    }
    for _ in 0..po_count {
        read_polyobj(ctx, world)?;
    }

    world.thinkers.clear();
    registry::read_all(ctx, world)?;

    segment::assert_segment(&mut ctx.reader, SegmentTag::Misc)?;
    world.brain.easy = ctx.reader.read_i32()?;
    world.brain.targets_on = ctx.reader.read_u8()? != 0;

    read_sound_targets(ctx, world)?;

    segment::assert_end(&mut ctx.reader)?;

    finalize_links(ctx, world)?;

    debug!(
        "restored map E{}M{} at tic {}: {} thinkers",
        world.episode,
        world.map,
        world.map_time,
        world.thinkers.len()
    );
    Ok(())
}

/// Polyobjs are matched by tag, not by archive order.
fn read_polyobj(ctx: &mut LoadContext, world: &mut World) -> Result<(), SaveError> {
    let version = ctx.reader.read_u8()?;
    if version > POLYOBJ_SAVE_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: POLYOBJ_SAVE_VERSION as i32,
        });
    }
    let tag = ctx.reader.read_i32()?;
    let angle = ctx.reader.read_f32()?;
    let origin = [ctx.reader.read_f32()?, ctx.reader.read_f32()?];

    let po = world
        .polyobjs
        .iter_mut()
        .find(|po| po.tag == tag)
        .ok_or(SaveError::Consistency("archived polyobj tag not present in the loaded map"))?;
    po.angle = angle;
    po.origin = origin;
    Ok(())
}

fn read_sound_targets(ctx: &mut LoadContext, world: &mut World) -> Result<(), SaveError> {
    segment::assert_segment(&mut ctx.reader, SegmentTag::Sounds)?;
    let count = ctx.reader.read_u32()?;
    if count as usize > world.sectors.len() {
        return Err(SaveError::Consistency("more sound targets than sectors"));
    }
    for _ in 0..count {
        let sector_idx = ctx.reader.read_u32()?;
        let id = ctx.read_thing_id()?;
        let sector = world
            .sectors
            .get_mut(sector_idx as usize)
            .ok_or(SaveError::BadElementIndex { kind: "sector", index: sector_idx })?;
        if id != super::thing_archive::NO_THING {
            sector.sound_target = MobjLink::Pending(id);
        }
    }
    Ok(())
}

// ============================================================
// Link fixup
// ============================================================

fn resolve_link(
    ctx_things: &super::ThingArchive,
    link: &mut MobjLink,
    defer: impl FnOnce() -> PendingPlayerLink,
    deferred: &mut Vec<PendingPlayerLink>,
) -> Result<(), SaveError> {
    if let MobjLink::Pending(id) = *link {
        *link = match ctx_things.resolve(id)? {
            ResolvedThing::None => MobjLink::None,
            ResolvedThing::Mobj(r) => MobjLink::Live(r),
            ResolvedThing::DeferPlayer => {
                deferred.push(defer());
                MobjLink::None
            }
        };
    }
    Ok(())
}

/// Convert every Pending cross-reference to a live one, queue the
/// player-sentinel references for post-reconciliation binding, and
/// re-derive the state that is intentionally not archived.
fn finalize_links(ctx: &mut LoadContext, world: &mut World) -> Result<(), SaveError> {
    let things = &ctx.things;
    let deferred = &mut ctx.deferred_player_links;

    for (slot, t) in world.thinkers.iter_mut() {
        match &mut t.data {
            ThinkerData::Mobj(m) => {
                let r = MobjRef(slot);
                resolve_link(things, &mut m.target, || PendingPlayerLink::MobjTarget(r), deferred)?;
                resolve_link(things, &mut m.tracer, || PendingPlayerLink::MobjTracer(r), deferred)?;
                resolve_link(things, &mut m.on_mobj, || PendingPlayerLink::MobjOnMobj(r), deferred)?;
                resolve_link(
                    things,
                    &mut m.generator,
                    || PendingPlayerLink::MobjGenerator(r),
                    deferred,
                )?;
            }
            ThinkerData::Acs(a) => {
                resolve_link(
                    things,
                    &mut a.activator,
                    || PendingPlayerLink::AcsActivator(slot),
                    deferred,
                )?;
            }
            _ => {}
        }
    }

    for (i, sector) in world.sectors.iter_mut().enumerate() {
        resolve_link(
            things,
            &mut sector.sound_target,
            || PendingPlayerLink::SectorSoundTarget(i as u32),
            deferred,
        )?;
    }

    // Re-bind sector back-links to the movers running on them.
    let mover_sectors: Vec<(usize, u32)> = world
        .thinkers
        .iter()
        .filter_map(|(slot, t)| {
            let sector = match &t.data {
                ThinkerData::Door(d) => d.sector,
                ThinkerData::Floor(f) => f.sector,
                ThinkerData::Ceiling(c) => c.sector,
                ThinkerData::Platform(p) => p.sector,
                ThinkerData::Pillar(p) => p.sector,
                ThinkerData::Waggle(w) => w.sector,
                _ => return None,
            };
            Some((slot, sector))
        })
        .collect();
    for (slot, sector) in mover_sectors {
        if let Some(s) = world.sectors.get_mut(sector as usize) {
            s.special_data = Some(slot);
        }
    }

    // Bind roster slots to their restored mobjs.
    let player_mobjs: Vec<(usize, MobjRef)> = world
        .thinkers
        .mobjs()
        .filter_map(|(r, m)| m.player.map(|p| (p, r)))
        .collect();
    for (p, r) in player_mobjs {
        if p < MAXPLAYERS {
            if let Some(player) = world.players.get_mut(p) {
                player.mobj = MobjLink::Live(r);
            }
        }
    }

    world.rebuild_corpse_queue();
    world.update_plane_bases();
    Ok(())
}

/// Bind the references that carried the target-player sentinel to the
/// given player mobj. Called after the roster has been reconciled, when
/// the surviving players' mobjs are known.
pub fn bind_deferred_player_links(
    pending: &[PendingPlayerLink],
    world: &mut World,
    player_mobj: MobjRef,
) {
    for link in pending {
        match *link {
            PendingPlayerLink::MobjTarget(r) => {
                if let Some(m) = world.thinkers.mobj_mut(r) {
                    m.target = MobjLink::Live(player_mobj);
                }
            }
            PendingPlayerLink::MobjTracer(r) => {
                if let Some(m) = world.thinkers.mobj_mut(r) {
                    m.tracer = MobjLink::Live(player_mobj);
                }
            }
            PendingPlayerLink::MobjOnMobj(r) => {
                if let Some(m) = world.thinkers.mobj_mut(r) {
                    m.on_mobj = MobjLink::Live(player_mobj);
                }
            }
            PendingPlayerLink::MobjGenerator(r) => {
                if let Some(m) = world.thinkers.mobj_mut(r) {
                    m.generator = MobjLink::Live(player_mobj);
                }
            }
            PendingPlayerLink::AcsActivator(slot) => {
                if let Some(t) = world.thinkers.get_mut(slot) {
                    if let ThinkerData::Acs(a) = &mut t.data {
                        a.activator = MobjLink::Live(player_mobj);
                    }
                }
            }
            PendingPlayerLink::SectorSoundTarget(i) => {
                if let Some(s) = world.sectors.get_mut(i as usize) {
                    s.sound_target = MobjLink::Live(player_mobj);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saveg::{SessionRole, SAVE_VERSION};
    use crate::thinkers::{Floor, Mobj, Thinker, Thinkers};
    use crate::world::{MobjFlags, Polyobj, Sector};
    use hxd_common::stream::Reader;

    /// A small but representative map: three sectors, one mover in
    /// stasis, a handful of mobjs including two player bodies.
    fn build_world() -> World {
        let mut world = World::new_for_map(1, 3);
        world.map_time = 4200;
        world.sectors = vec![
            Sector { floor_height: 8.0, floor_material: "FLAT5_1".into(), ..Sector::default() },
            Sector { floor_height: -16.0, special: 9, ..Sector::default() },
            Sector { light_level: 96, tag: 4, ..Sector::default() },
        ];
        world.polyobjs = vec![Polyobj { tag: 3, angle: 1.5, origin: [64.0, -32.0], ..Polyobj::default() }];

        let mut th = Thinkers::new();
        let p0 = th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: crate::info::MT_PLAYER,
            player: Some(0),
            pos: [32.0, 32.0, 8.0],
            ..Mobj::default()
        })));
        let p1 = th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: crate::info::MT_PLAYER,
            player: Some(1),
            ..Mobj::default()
        })));
        let ettin = th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: crate::info::MT_ETTIN,
            health: 175,
            target: MobjLink::Live(MobjRef(p0)),
            ..Mobj::default()
        })));
        th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: crate::info::MT_ETTIN,
            health: 0,
            flags: MobjFlags::CORPSE,
            ..Mobj::default()
        })));
        th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: crate::info::MT_CENTAUR,
            target: MobjLink::Live(MobjRef(ettin)),
            tracer: MobjLink::Live(MobjRef(p1)),
            ..Mobj::default()
        })));
        let floor = th.add(Thinker::new(ThinkerData::Floor(Floor {
            sector: 1,
            dest_height: 40.0,
            speed: 2.0,
            ..Floor::default()
        })));
        th.set_stasis(floor, true);
        world.thinkers = th;

        world.players[0].in_game = true;
        world.players[0].id = 11;
        world.players[0].mobj = MobjLink::Live(MobjRef(p0));
        world.players[1].in_game = true;
        world.players[1].id = 12;
        world.players[1].mobj = MobjLink::Live(MobjRef(p1));

        world.sectors[2].sound_target = MobjLink::Live(MobjRef(ettin));
        world.brain.easy = 1;
        world
    }

    /// Fresh geometry for the same map, as the map loader would produce
    /// it before state restoration.
    fn fresh_geometry() -> World {
        let mut world = World::new_for_map(1, 3);
        world.sectors = vec![Sector::default(), Sector::default(), Sector::default()];
        world.polyobjs = vec![Polyobj { tag: 3, ..Polyobj::default() }];
        world
    }

    #[test]
    fn test_full_map_roundtrip() {
        let world = build_world();
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_map_state(&mut ctx, &world).unwrap();

        let mut fresh = fresh_geometry();
        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        read_map_state(&mut lctx, &mut fresh).unwrap();
        assert!(lctx.reader.is_at_end());

        assert_eq!(fresh.map_time, 4200);
        assert_eq!(fresh.sectors[0].floor_height, 8.0);
        assert_eq!(fresh.sectors[0].floor_material, "FLAT5_1");
        assert_eq!(fresh.sectors[2].light_level, 96);
        assert_eq!(fresh.polyobjs[0].angle, 1.5);
        assert_eq!(fresh.polyobjs[0].origin, [64.0, -32.0]);
        assert_eq!(fresh.thinkers.len(), 6);
        assert_eq!(fresh.brain.easy, 1);

        // No Pending link survives a completed load.
        for (_, t) in fresh.thinkers.iter() {
            if let ThinkerData::Mobj(m) = &t.data {
                assert!(!m.target.is_pending());
                assert!(!m.tracer.is_pending());
                assert!(!m.on_mobj.is_pending());
                assert!(!m.generator.is_pending());
            }
        }
        assert!(!fresh.sectors[2].sound_target.is_pending());
        assert_ne!(fresh.sectors[2].sound_target, MobjLink::None);

        // The ettin's target is the restored player-0 mobj.
        let ettin = fresh
            .thinkers
            .mobjs()
            .find(|(_, m)| m.health == 175)
            .map(|(r, _)| r)
            .unwrap();
        let target = fresh.thinkers.mobj(ettin).unwrap().target.as_ref().unwrap();
        assert_eq!(fresh.thinkers.mobj(target).unwrap().player, Some(0));

        // Derived state is rebuilt.
        assert_eq!(fresh.corpse_queue.len(), 1);
        assert_eq!(fresh.sectors[1].special_data.is_some(), true);
        assert_eq!(fresh.sectors[0].floor_base, 8.0);

        // Players re-bound to their mobjs.
        assert!(fresh.players[0].mobj.as_ref().is_some());
        assert!(fresh.players[1].mobj.as_ref().is_some());

        // Stasis survived.
        let (_, floor_thinker) = fresh
            .thinkers
            .iter()
            .find(|(_, t)| matches!(t.data, ThinkerData::Floor(_)))
            .unwrap();
        assert!(floor_thinker.in_stasis);
    }

    #[test]
    fn test_player_exclusion_defers_references() {
        // Cluster-transition archive: player mobjs stay out, references
        // to them carry the sentinel and come back as deferred links.
        let world = build_world();
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, true);
        write_map_state(&mut ctx, &world).unwrap();

        let mut fresh = fresh_geometry();
        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        read_map_state(&mut lctx, &mut fresh).unwrap();

        // The two player mobjs were not archived.
        assert_eq!(fresh.thinkers.len(), 4);
        // The ettin's target and the centaur's tracer pointed at players.
        assert_eq!(lctx.deferred_player_links.len(), 2);

        // After reconciliation, bind the deferred links to a respawned
        // player mobj.
        let respawned = MobjRef(
            fresh.thinkers.add(Thinker::new(ThinkerData::Mobj(Mobj {
                type_id: crate::info::MT_PLAYER,
                player: Some(0),
                ..Mobj::default()
            }))),
        );
        bind_deferred_player_links(&lctx.deferred_player_links, &mut fresh, respawned);
        let ettin = fresh
            .thinkers
            .mobjs()
            .find(|(_, m)| m.health == 175)
            .map(|(r, _)| r)
            .unwrap();
        assert_eq!(fresh.thinkers.mobj(ettin).unwrap().target, MobjLink::Live(respawned));
    }

    #[test]
    fn test_floor_destination_material_survives() {
        // The destination flat is not the current material of any sector,
        // so only the thinker scan can get it into the dictionary.
        let mut world = build_world();
        for (_, t) in world.thinkers.iter_mut() {
            if let ThinkerData::Floor(f) = &mut t.data {
                f.material = "NEWFLAT9".into();
            }
        }
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_map_state(&mut ctx, &world).unwrap();

        let mut fresh = fresh_geometry();
        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        read_map_state(&mut lctx, &mut fresh).unwrap();

        let (_, t) = fresh
            .thinkers
            .iter()
            .find(|(_, t)| matches!(t.data, ThinkerData::Floor(_)))
            .unwrap();
        let ThinkerData::Floor(f) = &t.data else { unreachable!() };
        assert_eq!(f.material, "NEWFLAT9");
    }

    #[test]
    fn test_segment_drift_is_fatal() {
        let world = build_world();
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_map_state(&mut ctx, &world).unwrap();

        // Drop one byte early in the stream; every read after it is
        // shifted and the next segment assertion trips.
        let mut bytes = ctx.writer.into_inner();
        bytes.remove(4);

        let mut fresh = fresh_geometry();
        let mut lctx =
            LoadContext::new(Reader::new(bytes), SessionRole::Authoritative, SAVE_VERSION);
        assert!(read_map_state(&mut lctx, &mut fresh).is_err());
    }

    #[test]
    fn test_element_count_mismatch_is_fatal() {
        let world = build_world();
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_map_state(&mut ctx, &world).unwrap();

        let mut wrong = fresh_geometry();
        wrong.sectors.pop();
        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        assert!(matches!(
            read_map_state(&mut lctx, &mut wrong),
            Err(SaveError::Consistency(_))
        ));
    }
}
