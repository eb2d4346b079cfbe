// saveg/specials.rs — (De)serializers for map-special thinkers
//
// One write/read pair per class. Every record leads with its own version
// byte so each class's wire format can evolve independently. Sector,
// polyobj, and side cross-references travel as 0-based element indices
// validated against the live map on read.

use crate::thinkers::{
    Ceiling, Door, Flicker, Floor, Glow, LightFlash, MaterialChanger, MovePoly, Phase, Pillar,
    Platform, PolyDoor, RotatePoly, Scroller, Strobe, Thinker, ThinkerData, Waggle,
};
use crate::world::World;

use super::error::SaveError;
use super::material_archive::MaterialGroup;
use super::registry::ReadThinker;
use super::{LoadContext, SaveContext};

const DOOR_VERSION: u8 = 1;
const FLOOR_VERSION: u8 = 2;
const CEILING_VERSION: u8 = 1;
const PLATFORM_VERSION: u8 = 1;
const LIGHT_VERSION: u8 = 1;
const POLY_VERSION: u8 = 1;
const CHANGER_VERSION: u8 = 1;
const SCROLLER_VERSION: u8 = 1;

fn check_sector(world: &World, index: u32) -> Result<u32, SaveError> {
    if index as usize >= world.sectors.len() {
        return Err(SaveError::BadElementIndex { kind: "sector", index });
    }
    Ok(index)
}

fn check_polyobj(world: &World, index: u32) -> Result<u32, SaveError> {
    if index as usize >= world.polyobjs.len() {
        return Err(SaveError::BadElementIndex { kind: "polyobj", index });
    }
    Ok(index)
}

fn check_side(world: &World, index: u32) -> Result<u32, SaveError> {
    if index as usize >= world.sides.len() {
        return Err(SaveError::BadElementIndex { kind: "side", index });
    }
    Ok(index)
}

fn check_record_version(found: u8, supported: u8) -> Result<u8, SaveError> {
    if found > supported {
        return Err(SaveError::VersionTooNew {
            found: found as i32,
            supported: supported as i32,
        });
    }
    Ok(found)
}

fn class_mismatch() -> SaveError {
    SaveError::Consistency("thinker data does not match its registry class")
}

// ============================================================
// Vertical door
// ============================================================

pub fn write_door(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Door(d) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(DOOR_VERSION);
    w.write_u32(d.sector);
    w.write_i32(d.kind);
    w.write_f32(d.top_height);
    w.write_f32(d.speed);
    w.write_i32(d.direction);
    w.write_i32(d.top_wait);
    w.write_i32(d.top_countdown);
    Ok(())
}

pub fn read_door(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, DOOR_VERSION)?;
    let d = Door {
        sector: check_sector(world, r.read_u32()?)?,
        kind: r.read_i32()?,
        top_height: r.read_f32()?,
        speed: r.read_f32()?,
        direction: r.read_i32()?,
        top_wait: r.read_i32()?,
        top_countdown: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Door(d)))
}

// ============================================================
// Moving floor
// ============================================================

pub fn write_floor(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Floor(f) = &t.data else { return Err(class_mismatch()) };
    let material = ctx.materials.find_or_add(&f.material, MaterialGroup::Plane);
    let w = &mut ctx.writer;
    w.write_u8(FLOOR_VERSION);
    w.write_u32(f.sector);
    w.write_i32(f.kind);
    w.write_u8(f.crush as u8);
    w.write_i32(f.direction);
    w.write_i16(f.new_special);
    w.write_u16(material);
    w.write_f32(f.dest_height);
    w.write_f32(f.speed);
    Ok(())
}

pub fn read_floor(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let version = check_record_version(ctx.reader.read_u8()?, FLOOR_VERSION)?;
    let sector = check_sector(world, ctx.reader.read_u32()?)?;
    let kind = ctx.reader.read_i32()?;
    let crush = ctx.reader.read_u8()? != 0;
    let direction = ctx.reader.read_i32()?;
    let new_special = ctx.reader.read_i16()?;
    let material = if version >= 2 {
        let serial = ctx.reader.read_u16()?;
        ctx.materials.lookup(serial, MaterialGroup::Plane)?.to_owned()
    } else {
        // Pre-v2 floors did not archive their destination material;
        // take the sector's current floor instead.
        world.sectors[sector as usize].floor_material.clone()
    };
    let f = Floor {
        sector,
        kind,
        crush,
        direction,
        new_special,
        material,
        dest_height: ctx.reader.read_f32()?,
        speed: ctx.reader.read_f32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Floor(f)))
}

// ============================================================
// Moving ceiling
// ============================================================

pub fn write_ceiling(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Ceiling(c) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(CEILING_VERSION);
    w.write_u32(c.sector);
    w.write_i32(c.kind);
    w.write_f32(c.bottom_height);
    w.write_f32(c.top_height);
    w.write_f32(c.speed);
    w.write_u8(c.crush as u8);
    w.write_i32(c.direction);
    w.write_i16(c.tag);
    w.write_i32(c.old_direction);
    Ok(())
}

pub fn read_ceiling(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, CEILING_VERSION)?;
    let c = Ceiling {
        sector: check_sector(world, r.read_u32()?)?,
        kind: r.read_i32()?,
        bottom_height: r.read_f32()?,
        top_height: r.read_f32()?,
        speed: r.read_f32()?,
        crush: r.read_u8()? != 0,
        direction: r.read_i32()?,
        tag: r.read_i16()?,
        old_direction: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Ceiling(c)))
}

// ============================================================
// Platform
// ============================================================

pub fn write_platform(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Platform(p) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(PLATFORM_VERSION);
    w.write_u32(p.sector);
    w.write_f32(p.speed);
    w.write_f32(p.low);
    w.write_f32(p.high);
    w.write_i32(p.wait);
    w.write_i32(p.count);
    w.write_i32(p.state);
    w.write_i32(p.old_state);
    w.write_u8(p.crush as u8);
    w.write_i16(p.tag);
    w.write_i32(p.kind);
    Ok(())
}

pub fn read_platform(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, PLATFORM_VERSION)?;
    let p = Platform {
        sector: check_sector(world, r.read_u32()?)?,
        speed: r.read_f32()?,
        low: r.read_f32()?,
        high: r.read_f32()?,
        wait: r.read_i32()?,
        count: r.read_i32()?,
        state: r.read_i32()?,
        old_state: r.read_i32()?,
        crush: r.read_u8()? != 0,
        tag: r.read_i16()?,
        kind: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Platform(p)))
}

// ============================================================
// Lights
// ============================================================

pub fn write_light_flash(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::LightFlash(l) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(LIGHT_VERSION);
    w.write_u32(l.sector);
    w.write_i32(l.count);
    w.write_i32(l.max_light);
    w.write_i32(l.min_light);
    w.write_i32(l.max_time);
    w.write_i32(l.min_time);
    Ok(())
}

pub fn read_light_flash(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, LIGHT_VERSION)?;
    let l = LightFlash {
        sector: check_sector(world, r.read_u32()?)?,
        count: r.read_i32()?,
        max_light: r.read_i32()?,
        min_light: r.read_i32()?,
        max_time: r.read_i32()?,
        min_time: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::LightFlash(l)))
}

pub fn write_strobe(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Strobe(s) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(LIGHT_VERSION);
    w.write_u32(s.sector);
    w.write_i32(s.count);
    w.write_i32(s.min_light);
    w.write_i32(s.max_light);
    w.write_i32(s.dark_time);
    w.write_i32(s.bright_time);
    Ok(())
}

pub fn read_strobe(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, LIGHT_VERSION)?;
    let s = Strobe {
        sector: check_sector(world, r.read_u32()?)?,
        count: r.read_i32()?,
        min_light: r.read_i32()?,
        max_light: r.read_i32()?,
        dark_time: r.read_i32()?,
        bright_time: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Strobe(s)))
}

pub fn write_glow(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Glow(g) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(LIGHT_VERSION);
    w.write_u32(g.sector);
    w.write_i32(g.min_light);
    w.write_i32(g.max_light);
    w.write_i32(g.direction);
    Ok(())
}

pub fn read_glow(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, LIGHT_VERSION)?;
    let g = Glow {
        sector: check_sector(world, r.read_u32()?)?,
        min_light: r.read_i32()?,
        max_light: r.read_i32()?,
        direction: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Glow(g)))
}

pub fn write_flicker(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Flicker(f) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(LIGHT_VERSION);
    w.write_u32(f.sector);
    w.write_i32(f.count);
    w.write_i32(f.max_light);
    w.write_i32(f.min_light);
    Ok(())
}

pub fn read_flicker(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, LIGHT_VERSION)?;
    let f = Flicker {
        sector: check_sector(world, r.read_u32()?)?,
        count: r.read_i32()?,
        max_light: r.read_i32()?,
        min_light: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Flicker(f)))
}

pub fn write_phase(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Phase(p) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(LIGHT_VERSION);
    w.write_u32(p.sector);
    w.write_i32(p.index);
    w.write_i32(p.base_light);
    Ok(())
}

pub fn read_phase(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, LIGHT_VERSION)?;
    let p = Phase {
        sector: check_sector(world, r.read_u32()?)?,
        index: r.read_i32()?,
        base_light: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Phase(p)))
}

// ============================================================
// Pillar and floor waggle
// ============================================================

pub fn write_pillar(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Pillar(p) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(1);
    w.write_u32(p.sector);
    w.write_f32(p.ceiling_speed);
    w.write_f32(p.floor_speed);
    w.write_f32(p.floor_dest);
    w.write_f32(p.ceiling_dest);
    w.write_i32(p.direction);
    w.write_u8(p.crush as u8);
    Ok(())
}

pub fn read_pillar(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, 1)?;
    let p = Pillar {
        sector: check_sector(world, r.read_u32()?)?,
        ceiling_speed: r.read_f32()?,
        floor_speed: r.read_f32()?,
        floor_dest: r.read_f32()?,
        ceiling_dest: r.read_f32()?,
        direction: r.read_i32()?,
        crush: r.read_u8()? != 0,
    };
    Ok(ReadThinker::special(ThinkerData::Pillar(p)))
}

pub fn write_waggle(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Waggle(wg) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(1);
    w.write_u32(wg.sector);
    w.write_f32(wg.original_height);
    w.write_f32(wg.accumulator);
    w.write_f32(wg.acc_delta);
    w.write_f32(wg.target_scale);
    w.write_f32(wg.scale);
    w.write_f32(wg.scale_delta);
    w.write_i32(wg.ticker);
    w.write_i32(wg.state);
    Ok(())
}

pub fn read_waggle(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, 1)?;
    let wg = Waggle {
        sector: check_sector(world, r.read_u32()?)?,
        original_height: r.read_f32()?,
        accumulator: r.read_f32()?,
        acc_delta: r.read_f32()?,
        target_scale: r.read_f32()?,
        scale: r.read_f32()?,
        scale_delta: r.read_f32()?,
        ticker: r.read_i32()?,
        state: r.read_i32()?,
    };
    Ok(ReadThinker::special(ThinkerData::Waggle(wg)))
}

// ============================================================
// Polyobject movers
// ============================================================

pub fn write_rotate_poly(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::RotatePoly(rp) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(POLY_VERSION);
    w.write_u32(rp.polyobj);
    w.write_f32(rp.speed);
    w.write_f32(rp.dist);
    Ok(())
}

pub fn read_rotate_poly(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, POLY_VERSION)?;
    let rp = RotatePoly {
        polyobj: check_polyobj(world, r.read_u32()?)?,
        speed: r.read_f32()?,
        dist: r.read_f32()?,
    };
    Ok(ReadThinker::special(ThinkerData::RotatePoly(rp)))
}

pub fn write_move_poly(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::MovePoly(mp) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(POLY_VERSION);
    w.write_u32(mp.polyobj);
    w.write_f32(mp.speed);
    w.write_f32(mp.dist);
    w.write_f32(mp.angle);
    w.write_f32(mp.velocity[0]);
    w.write_f32(mp.velocity[1]);
    Ok(())
}

pub fn read_move_poly(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, POLY_VERSION)?;
    let mp = MovePoly {
        polyobj: check_polyobj(world, r.read_u32()?)?,
        speed: r.read_f32()?,
        dist: r.read_f32()?,
        angle: r.read_f32()?,
        velocity: [r.read_f32()?, r.read_f32()?],
    };
    Ok(ReadThinker::special(ThinkerData::MovePoly(mp)))
}

pub fn write_poly_door(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::PolyDoor(pd) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(POLY_VERSION);
    w.write_u32(pd.polyobj);
    w.write_i32(pd.kind);
    w.write_f32(pd.speed);
    w.write_f32(pd.dist);
    w.write_f32(pd.angle);
    w.write_f32(pd.velocity[0]);
    w.write_f32(pd.velocity[1]);
    w.write_f32(pd.total_dist);
    w.write_i32(pd.direction);
    w.write_i32(pd.tics);
    w.write_i32(pd.wait_tics);
    w.write_u8(pd.close as u8);
    Ok(())
}

pub fn read_poly_door(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, POLY_VERSION)?;
    let pd = PolyDoor {
        polyobj: check_polyobj(world, r.read_u32()?)?,
        kind: r.read_i32()?,
        speed: r.read_f32()?,
        dist: r.read_f32()?,
        angle: r.read_f32()?,
        velocity: [r.read_f32()?, r.read_f32()?],
        total_dist: r.read_f32()?,
        direction: r.read_i32()?,
        tics: r.read_i32()?,
        wait_tics: r.read_i32()?,
        close: r.read_u8()? != 0,
    };
    Ok(ReadThinker::special(ThinkerData::PolyDoor(pd)))
}

// ============================================================
// Material changer and scroller
// ============================================================

pub fn write_material_changer(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::MaterialChanger(mc) = &t.data else { return Err(class_mismatch()) };
    let serial = ctx.materials.find_or_add(&mc.material, MaterialGroup::Wall);
    let w = &mut ctx.writer;
    w.write_u8(CHANGER_VERSION);
    w.write_i32(mc.timer);
    w.write_u32(mc.side);
    w.write_u8(mc.section);
    w.write_u16(serial);
    Ok(())
}

pub fn read_material_changer(
    ctx: &mut LoadContext,
    world: &World,
) -> Result<ReadThinker, SaveError> {
    check_record_version(ctx.reader.read_u8()?, CHANGER_VERSION)?;
    let timer = ctx.reader.read_i32()?;
    let side = check_side(world, ctx.reader.read_u32()?)?;
    let section = ctx.reader.read_u8()?;
    let serial = ctx.reader.read_u16()?;
    let mc = MaterialChanger {
        timer,
        side,
        section,
        material: ctx.materials.lookup(serial, MaterialGroup::Wall)?.to_owned(),
    };
    Ok(ReadThinker::special(ThinkerData::MaterialChanger(mc)))
}

pub fn write_scroller(
    ctx: &mut SaveContext,
    _world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Scroller(s) = &t.data else { return Err(class_mismatch()) };
    let w = &mut ctx.writer;
    w.write_u8(SCROLLER_VERSION);
    w.write_u8(s.kind);
    w.write_u32(s.element);
    w.write_f32(s.offset[0]);
    w.write_f32(s.offset[1]);
    Ok(())
}

pub fn read_scroller(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let r = &mut ctx.reader;
    check_record_version(r.read_u8()?, SCROLLER_VERSION)?;
    let kind = r.read_u8()?;
    let element = r.read_u32()?;
    let element = if kind == 0 {
        check_side(world, element)?
    } else {
        check_sector(world, element)?
    };
    let s = Scroller { kind, element, offset: [r.read_f32()?, r.read_f32()?] };
    Ok(ReadThinker::special(ThinkerData::Scroller(s)))
}
