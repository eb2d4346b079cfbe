// saveg/sector.rs — Sector and line/side (de)serializers
//
// Geometry elements are archived by 0-based index into the world's flat
// element tables; the tables themselves come from the map loader, so the
// reader validates counts and indices instead of allocating. Materials
// cross the stream as material-archive serials.

use crate::world::{LineFlags, World};

use super::error::SaveError;
use super::material_archive::MaterialGroup;
use super::{LoadContext, SaveContext};

/// Current sector record version.
///
/// 1: i16 plane heights, light byte, material serials, special, tag.
/// 2: adds sector color (rgb).
/// 3: plane heights widen to f32; adds sound sequence type.
pub const SECTOR_SAVE_VERSION: u8 = 3;

/// Current line record version.
///
/// 1: merged flag word, special, tag, args, per-side material serials.
/// 2: adds per-surface offsets, surface colors, blend mode.
/// 3: adds the per-player "seen on automap" bitfield.
/// 4: engine-side flags split from game-side flags.
pub const LINE_SAVE_VERSION: u8 = 4;

// ============================================================
// Sectors
// ============================================================

pub fn write_sector(ctx: &mut SaveContext, world: &World, index: u32) -> Result<(), SaveError> {
    let sector = &world.sectors[index as usize];
    let floor_serial = ctx.materials.find_or_add(&sector.floor_material, MaterialGroup::Plane);
    let ceiling_serial = ctx.materials.find_or_add(&sector.ceiling_material, MaterialGroup::Plane);

    let w = &mut ctx.writer;
    w.write_u8(SECTOR_SAVE_VERSION);
    w.write_f32(sector.floor_height);
    w.write_f32(sector.ceiling_height);
    w.write_u8(sector.light_level);
    w.write_raw(&sector.rgb);
    w.write_u16(floor_serial);
    w.write_u16(ceiling_serial);
    w.write_i16(sector.special);
    w.write_i16(sector.tag);
    w.write_u8(sector.seq_type);
    Ok(())
}

pub fn read_sector(ctx: &mut LoadContext, world: &mut World, index: u32) -> Result<(), SaveError> {
    if index as usize >= world.sectors.len() {
        return Err(SaveError::BadElementIndex { kind: "sector", index });
    }

    let r = &mut ctx.reader;
    let version = r.read_u8()?;
    if version > SECTOR_SAVE_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: SECTOR_SAVE_VERSION as i32,
        });
    }

    let (floor_height, ceiling_height) = if version >= 3 {
        (r.read_f32()?, r.read_f32()?)
    } else {
        (r.read_i16()? as f32, r.read_i16()? as f32)
    };
    let light_level = r.read_u8()?;
    let rgb = if version >= 2 {
        let b = r.read_raw(3)?;
        [b[0], b[1], b[2]]
    } else {
        [255, 255, 255]
    };
    let floor_serial = r.read_u16()?;
    let ceiling_serial = r.read_u16()?;
    let special = r.read_i16()?;
    let tag = r.read_i16()?;
    let seq_type = if version >= 3 { r.read_u8()? } else { 0 };

    let floor_material = ctx.materials.lookup(floor_serial, MaterialGroup::Plane)?.to_owned();
    let ceiling_material = ctx.materials.lookup(ceiling_serial, MaterialGroup::Plane)?.to_owned();

    let sector = &mut world.sectors[index as usize];
    sector.floor_height = floor_height;
    sector.ceiling_height = ceiling_height;
    sector.light_level = light_level;
    sector.rgb = rgb;
    sector.floor_material = floor_material;
    sector.ceiling_material = ceiling_material;
    sector.special = special;
    sector.tag = tag;
    sector.seq_type = seq_type;
    // special_data and the plane bases are re-derived after the thinker
    // pass, not read from the stream.
    sector.special_data = None;
    Ok(())
}

// ============================================================
// Lines (sides inline)
// ============================================================

pub fn write_line(ctx: &mut SaveContext, world: &World, index: u32) -> Result<(), SaveError> {
    let line = &world.lines[index as usize];

    ctx.writer.write_u8(LINE_SAVE_VERSION);
    ctx.writer.write_i16(line.flags.bits());
    ctx.writer.write_i16(line.xflags);
    ctx.writer.write_i16(line.special);
    ctx.writer.write_i16(line.tag);
    ctx.writer.write_raw(&line.args);
    ctx.writer.write_u8(line.activated as u8);

    let mut mapped = 0u8;
    for (p, seen) in line.mapped.iter().enumerate() {
        if *seen {
            mapped |= 1 << p;
        }
    }
    ctx.writer.write_u8(mapped);

    let two_sided = line.flags.contains(LineFlags::TWO_SIDED);
    for side_idx in line.sides.iter().flatten() {
        write_side(ctx, world, *side_idx, two_sided)?;
    }
    Ok(())
}

fn write_side(
    ctx: &mut SaveContext,
    world: &World,
    index: u32,
    two_sided: bool,
) -> Result<(), SaveError> {
    let side = &world.sides[index as usize];
    let top = ctx.materials.find_or_add(&side.top_material, MaterialGroup::Wall);
    let middle = ctx.materials.find_or_add(&side.middle_material, MaterialGroup::Wall);
    let bottom = ctx.materials.find_or_add(&side.bottom_material, MaterialGroup::Wall);

    let w = &mut ctx.writer;
    if two_sided {
        // Legacy section-type byte. Decoded but never branched on; kept
        // on the wire for format compatibility only.
        w.write_u8(0);
    }
    w.write_f32(side.offset[0]);
    w.write_f32(side.offset[1]);
    w.write_raw(&side.top_rgb);
    w.write_raw(&side.bottom_rgb);
    w.write_raw(&side.middle_rgba);
    w.write_i32(side.blend_mode);
    w.write_u16(top);
    w.write_u16(middle);
    w.write_u16(bottom);
    Ok(())
}

pub fn read_line(ctx: &mut LoadContext, world: &mut World, index: u32) -> Result<(), SaveError> {
    if index as usize >= world.lines.len() {
        return Err(SaveError::BadElementIndex { kind: "line", index });
    }

    let version = ctx.reader.read_u8()?;
    if version > LINE_SAVE_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: LINE_SAVE_VERSION as i32,
        });
    }

    let (flags, xflags) = if version >= 4 {
        let engine = ctx.reader.read_i16()?;
        let game = ctx.reader.read_i16()?;
        (LineFlags::from_bits_truncate(engine), game)
    } else {
        // Pre-split saves merged both flag sets into one word; anything
        // outside the engine bits belongs to the game side.
        let merged = ctx.reader.read_i16()?;
        let engine = LineFlags::from_bits_truncate(merged);
        (engine, merged & !engine.bits())
    };
    let special = ctx.reader.read_i16()?;
    let tag = ctx.reader.read_i16()?;
    let raw_args = ctx.reader.read_raw(5)?;
    let activated = ctx.reader.read_u8()? != 0;
    let mapped_mask = if version >= 3 { ctx.reader.read_u8()? } else { 0 };

    let (side_indices, two_sided) = {
        let line = &world.lines[index as usize];
        (line.sides, flags.contains(LineFlags::TWO_SIDED))
    };
    for side_idx in side_indices.iter().flatten() {
        read_side(ctx, world, *side_idx, version, two_sided)?;
    }

    let line = &mut world.lines[index as usize];
    line.flags = flags;
    line.xflags = xflags;
    line.special = special;
    line.tag = tag;
    line.args.copy_from_slice(&raw_args);
    line.activated = activated;
    for p in 0..line.mapped.len() {
        line.mapped[p] = mapped_mask & (1 << p) != 0;
    }
    Ok(())
}

fn read_side(
    ctx: &mut LoadContext,
    world: &mut World,
    index: u32,
    line_version: u8,
    two_sided: bool,
) -> Result<(), SaveError> {
    if index as usize >= world.sides.len() {
        return Err(SaveError::BadElementIndex { kind: "side", index });
    }

    let r = &mut ctx.reader;
    if line_version >= 2 && two_sided {
        let _section_type = r.read_u8()?;
    }
    let (offset, top_rgb, bottom_rgb, middle_rgba, blend_mode) = if line_version >= 2 {
        let offset = [r.read_f32()?, r.read_f32()?];
        let t = r.read_raw(3)?;
        let b = r.read_raw(3)?;
        let m = r.read_raw(4)?;
        let blend = r.read_i32()?;
        (offset, [t[0], t[1], t[2]], [b[0], b[1], b[2]], [m[0], m[1], m[2], m[3]], blend)
    } else {
        ([0.0, 0.0], [255; 3], [255; 3], [255; 4], 0)
    };
    let top = r.read_u16()?;
    let middle = r.read_u16()?;
    let bottom = r.read_u16()?;

    let top_name = ctx.materials.lookup(top, MaterialGroup::Wall)?.to_owned();
    let middle_name = ctx.materials.lookup(middle, MaterialGroup::Wall)?.to_owned();
    let bottom_name = ctx.materials.lookup(bottom, MaterialGroup::Wall)?.to_owned();

    let side = &mut world.sides[index as usize];
    side.offset = offset;
    side.top_rgb = top_rgb;
    side.bottom_rgb = bottom_rgb;
    side.middle_rgba = middle_rgba;
    side.blend_mode = blend_mode;
    side.top_material = top_name;
    side.middle_material = middle_name;
    side.bottom_material = bottom_name;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saveg::SessionRole;
    use crate::world::{Line, Sector, Side};
    use hxd_common::stream::Reader;

    fn test_world() -> World {
        let mut world = World::new_for_map(1, 1);
        world.sectors = vec![
            Sector {
                floor_height: 8.0,
                ceiling_height: 136.5,
                floor_material: "FLOOR7_2".into(),
                ceiling_material: "CEIL3_5".into(),
                light_level: 160,
                rgb: [255, 200, 180],
                special: 9,
                tag: 4,
                seq_type: 1,
                ..Sector::default()
            },
            Sector::default(),
        ];
        world.sides = vec![
            Side {
                sector: 0,
                offset: [16.0, -8.0],
                top_material: "STARTAN2".into(),
                middle_material: "STARGR1".into(),
                bottom_material: String::new(),
                ..Side::default()
            },
            Side { sector: 1, middle_material: "BROWN1".into(), ..Side::default() },
        ];
        world.lines = vec![Line {
            v: [0, 1],
            flags: LineFlags::TWO_SIDED | LineFlags::MAPPED,
            xflags: 0x20,
            special: 12,
            tag: 4,
            args: [1, 2, 3, 4, 5],
            activated: true,
            sides: [Some(0), Some(1)],
            mapped: {
                let mut m = [false; crate::world::MAXPLAYERS];
                m[0] = true;
                m[2] = true;
                m
            },
            ..Line::default()
        }];
        world
    }

    fn save_load(world: &World, read_into: &mut World) {
        let mut ctx = SaveContext::new(world, SessionRole::Authoritative, false);
        write_sector(&mut ctx, world, 0).unwrap();
        write_line(&mut ctx, world, 0).unwrap();

        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            crate::saveg::SAVE_VERSION,
        );
        lctx.materials = ctx.materials;
        read_sector(&mut lctx, read_into, 0).unwrap();
        read_line(&mut lctx, read_into, 0).unwrap();
        assert!(lctx.reader.is_at_end());
    }

    #[test]
    fn test_sector_and_line_roundtrip() {
        let world = test_world();
        let mut fresh = test_world();
        // Scramble the mutable state so the roundtrip has to restore it.
        fresh.sectors[0] = Sector::default();
        fresh.lines[0].special = 0;
        fresh.lines[0].activated = false;
        fresh.lines[0].mapped = [false; crate::world::MAXPLAYERS];
        fresh.sides[0] = Side { sector: 0, ..Side::default() };

        save_load(&world, &mut fresh);

        assert_eq!(fresh.sectors[0].floor_height, 8.0);
        assert_eq!(fresh.sectors[0].floor_material, "FLOOR7_2");
        assert_eq!(fresh.sectors[0].rgb, [255, 200, 180]);
        assert_eq!(fresh.lines[0], world.lines[0]);
        assert_eq!(fresh.sides[0], world.sides[0]);
    }

    #[test]
    fn test_bad_sector_index_is_fatal() {
        let world = test_world();
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_sector(&mut ctx, &world, 0).unwrap();

        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            crate::saveg::SAVE_VERSION,
        );
        lctx.materials = ctx.materials;
        let mut fresh = test_world();
        let err = read_sector(&mut lctx, &mut fresh, 99).unwrap_err();
        assert!(matches!(err, SaveError::BadElementIndex { kind: "sector", index: 99 }));
    }

    #[test]
    fn test_legacy_v1_sector_defaults() {
        // Hand-built v1 record: short heights, no color, no seq type.
        let mut w = hxd_common::stream::Writer::new();
        w.write_u8(1);
        w.write_i16(-24);
        w.write_i16(100);
        w.write_u8(128);
        w.write_u16(0);
        w.write_u16(0);
        w.write_i16(0);
        w.write_i16(7);

        let mut lctx =
            LoadContext::new(Reader::new(w.into_inner()), SessionRole::Authoritative, 2);
        let mut world = test_world();
        read_sector(&mut lctx, &mut world, 1).unwrap();

        let s = &world.sectors[1];
        assert_eq!(s.floor_height, -24.0);
        assert_eq!(s.rgb, [255, 255, 255]);
        assert_eq!(s.seq_type, 0);
        assert_eq!(s.tag, 7);
    }
}
