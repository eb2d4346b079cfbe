// saveg/mobj.rs — Mobj (de)serializer
//
// Mobjs carry the widest version history of any record. Cross-reference
// fields travel as thing-archive serial IDs and are left Pending until
// the link-fixup pass; fields missing from old records default from the
// static info table.

use crate::info::mobj_info;
use crate::thinkers::{Mobj, MobjRef, SpawnSpot, Thinker, ThinkerData};
use crate::world::{MobjFlags, MobjFlags2, MobjFlags3, MobjLink, World};

use super::error::SaveError;
use super::registry::ReadThinker;
use super::{LoadContext, SaveContext};

/// Current mobj record version.
///
/// 1: raw padded struct layout, transient pointer fields included.
/// 2: thing-archive IDs for cross-references; own ID leads the record.
/// 3: flags3.
/// 4: (format level) long-form thing IDs.
/// 5: floor clip.
/// 6: spawn spot (respawn record).
/// 7: reaction time moved out of the transient block.
/// 8: generator cross-reference.
pub const MOBJ_SAVE_VERSION: u8 = 8;

fn link_id(ctx: &mut SaveContext, world: &World, link: MobjLink) -> Result<u32, SaveError> {
    ctx.things.serial_id_for(world, link.as_ref())
}

pub fn write_mobj(
    ctx: &mut SaveContext,
    world: &World,
    this: MobjRef,
    mobj: &Mobj,
) -> Result<(), SaveError> {
    // Archive this mobj first so its own serial leads the record.
    let own_id = ctx.things.serial_id_for(world, Some(this))?;
    let target = link_id(ctx, world, mobj.target)?;
    let tracer = link_id(ctx, world, mobj.tracer)?;
    let on_mobj = link_id(ctx, world, mobj.on_mobj)?;
    let generator = link_id(ctx, world, mobj.generator)?;

    let w = &mut ctx.writer;
    w.write_u8(MOBJ_SAVE_VERSION);
    w.write_u32(own_id);

    w.write_u16(mobj.type_id);
    w.write_i32(mobj.state);
    w.write_i8(mobj.player.map_or(-1, |p| p as i8));
    for v in mobj.pos {
        w.write_f32(v);
    }
    for v in mobj.mom {
        w.write_f32(v);
    }
    w.write_f32(mobj.angle);
    w.write_i32(mobj.sprite);
    w.write_i32(mobj.frame);
    w.write_f32(mobj.radius);
    w.write_f32(mobj.height);
    w.write_f32(mobj.floor_z);
    w.write_f32(mobj.ceiling_z);
    w.write_f32(mobj.floor_clip);
    w.write_i32(mobj.health);
    w.write_i32(mobj.flags.bits());
    w.write_i32(mobj.flags2.bits());
    w.write_i32(mobj.flags3.bits());
    w.write_i32(mobj.tics);
    w.write_i32(mobj.move_dir);
    w.write_i32(mobj.move_count);
    w.write_i32(mobj.reaction_time);
    w.write_i32(mobj.threshold);
    w.write_i32(mobj.special1);
    w.write_i32(mobj.special2);

    w.write_u32(target);
    w.write_u32(tracer);
    w.write_u32(on_mobj);
    w.write_u32(generator);

    for v in mobj.spawn_spot.pos {
        w.write_f32(v);
    }
    w.write_f32(mobj.spawn_spot.angle);
    w.write_i16(mobj.spawn_spot.flags);
    Ok(())
}

fn pending(id: u32) -> MobjLink {
    if id == super::thing_archive::NO_THING {
        MobjLink::None
    } else {
        MobjLink::Pending(id)
    }
}

pub fn read_mobj(ctx: &mut LoadContext, _world: &World) -> Result<ReadThinker, SaveError> {
    let version = ctx.reader.read_u8()?;
    if version > MOBJ_SAVE_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: MOBJ_SAVE_VERSION as i32,
        });
    }
    if version < 2 {
        return read_mobj_v1(ctx);
    }

    let own_id = ctx.read_thing_id()?;

    let r = &mut ctx.reader;
    let type_id = r.read_u16()?;
    let state = r.read_i32()?;
    let player_idx = r.read_i8()?;
    let pos = [r.read_f32()?, r.read_f32()?, r.read_f32()?];
    let mom = [r.read_f32()?, r.read_f32()?, r.read_f32()?];
    let angle = r.read_f32()?;
    let sprite = r.read_i32()?;
    let frame = r.read_i32()?;
    let radius = r.read_f32()?;
    let height = r.read_f32()?;
    let floor_z = r.read_f32()?;
    let ceiling_z = r.read_f32()?;
    let floor_clip = if version >= 5 { r.read_f32()? } else { 0.0 };
    let health = r.read_i32()?;
    let flags = MobjFlags::from_bits_truncate(r.read_i32()?);
    let flags2 = MobjFlags2::from_bits_truncate(r.read_i32()?);
    let flags3 = if version >= 3 {
        MobjFlags3::from_bits_truncate(r.read_i32()?)
    } else {
        mobj_info(type_id).flags3
    };
    let tics = r.read_i32()?;
    let move_dir = r.read_i32()?;
    let move_count = r.read_i32()?;
    let reaction_time = if version >= 7 { r.read_i32()? } else { 0 };
    let threshold = r.read_i32()?;
    let special1 = r.read_i32()?;
    let special2 = r.read_i32()?;

    let target = pending(ctx.read_thing_id()?);
    let tracer = pending(ctx.read_thing_id()?);
    let on_mobj = pending(ctx.read_thing_id()?);
    let generator = if version >= 8 { pending(ctx.read_thing_id()?) } else { MobjLink::None };

    let spawn_spot = if version >= 6 {
        let r = &mut ctx.reader;
        SpawnSpot {
            pos: [r.read_f32()?, r.read_f32()?, r.read_f32()?],
            angle: r.read_f32()?,
            flags: r.read_i16()?,
        }
    } else {
        SpawnSpot { pos, angle, flags: 0 }
    };

    let mobj = Mobj {
        type_id,
        state,
        pos,
        mom,
        angle,
        sprite,
        frame,
        radius,
        height,
        floor_z,
        ceiling_z,
        floor_clip,
        health,
        flags,
        flags2,
        flags3,
        tics,
        move_dir,
        move_count,
        reaction_time,
        threshold,
        special1,
        special2,
        player: if player_idx < 0 { None } else { Some(player_idx as usize) },
        target,
        tracer,
        on_mobj,
        generator,
        spawn_spot,
    };
    Ok(ReadThinker {
        thinker: Thinker::new(ThinkerData::Mobj(mobj)),
        archive_id: Some(own_id),
    })
}

/// Version-1 records are a raw dump of the original in-memory struct,
/// pointer cells and all. The pointer cells carry no recoverable state;
/// cross-references simply did not survive a version-1 save.
fn read_mobj_v1(ctx: &mut LoadContext) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    let type_id = r.read_u16()?;
    let state = r.read_i32()?;
    let player_idx = r.read_i8()?;
    let pos = [r.read_f32()?, r.read_f32()?, r.read_f32()?];
    let mom = [r.read_f32()?, r.read_f32()?, r.read_f32()?];
    let angle = r.read_f32()?;
    let sprite = r.read_i32()?;
    let frame = r.read_i32()?;
    let radius = r.read_f32()?;
    let height = r.read_f32()?;
    let health = r.read_i32()?;
    let flags = MobjFlags::from_bits_truncate(r.read_i32()?);
    let flags2 = MobjFlags2::from_bits_truncate(r.read_i32()?);
    let tics = r.read_i32()?;
    let move_dir = r.read_i32()?;
    let move_count = r.read_i32()?;
    let threshold = r.read_i32()?;
    let special1 = r.read_i32()?;
    let special2 = r.read_i32()?;
    // Dead pointer cells: target, tracer, onmobj, sector link.
    r.skip(16)?;

    let info = mobj_info(type_id);
    let mobj = Mobj {
        type_id,
        state,
        pos,
        mom,
        angle,
        sprite,
        frame,
        radius,
        height,
        floor_z: pos[2],
        ceiling_z: pos[2] + info.height,
        health,
        flags,
        flags2,
        flags3: info.flags3,
        tics,
        move_dir,
        move_count,
        threshold,
        special1,
        special2,
        player: if player_idx < 0 { None } else { Some(player_idx as usize) },
        spawn_spot: SpawnSpot { pos, angle, flags: 0 },
        ..Mobj::default()
    };
    Ok(ReadThinker {
        thinker: Thinker::new(ThinkerData::Mobj(mobj)),
        // Version 1 predates the thing archive; the caller assigns IDs
        // in read order.
        archive_id: None,
    })
}
