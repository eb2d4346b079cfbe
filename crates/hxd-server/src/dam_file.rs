// dam_file.rs — Cached-map geometry store
//
// Converting a map from its source archive into runtime structures is
// expensive, so the result is cached to disk and reused while the source
// stays unchanged. Validity is the source file's mtime plus the cache
// format version; any mismatch means the cache is silently rebuilt, so
// read errors here are never fatal to the engine.
//
// The cache holds only static geometry. Mutable state (plane heights in
// motion, line activation, thinkers) is the save subsystem's territory.

use std::fs;
use std::path::Path;

use log::debug;

use hxd_common::compression;
use hxd_common::stream::{Reader, Writer};
use hxd_game::saveg::SaveError;
use hxd_game::world::{
    Blockmap, BspLeaf, BspNode, Line, LineFlags, Polyobj, Sector, Seg, Side, Vertex, World,
};

pub const DAM_VERSION: i32 = 1;

/// Cached-map segment tags. A separate tag space from the save format;
/// the two files never mix. There is no magic number; the file opens
/// directly with the Header segment, whose tag doubles as the
/// recognition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum DamSegment {
    Header = 100,
    RelocationTables = 110,
    SymbolTables = 120,
    Map = 130,
    Polyobjs = 140,
    Vertexes = 150,
    Lines = 160,
    Sides = 170,
    Sectors = 180,
    BspLeafs = 190,
    Segs = 200,
    BspNodes = 210,
    Blockmap = 220,
    Reject = 230,
    End = 999,
}

fn begin(w: &mut Writer, tag: DamSegment) {
    w.write_i32(tag as i32);
}

fn expect(r: &mut Reader, tag: DamSegment) -> Result<(), SaveError> {
    if r.read_i32()? != tag as i32 {
        return Err(SaveError::Consistency("cached map segment order drift"));
    }
    Ok(())
}

fn write_mtime(w: &mut Writer, mtime: u64) {
    w.write_u32(mtime as u32);
    w.write_u32((mtime >> 32) as u32);
}

fn read_mtime(r: &mut Reader) -> Result<u64, SaveError> {
    let lo = r.read_u32()? as u64;
    let hi = r.read_u32()? as u64;
    Ok(lo | (hi << 32))
}

/// Whether the cache at `path` was built from the source archive as it
/// exists now. Any read failure counts as unusable.
pub fn is_cache_usable(path: &Path, source_mtime: u64) -> bool {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(_) => return false,
    };
    let mut r = Reader::new(raw);
    let header = (|| -> Result<(i32, i32, u64), SaveError> {
        Ok((r.read_i32()?, r.read_i32()?, read_mtime(&mut r)?))
    })();
    match header {
        Ok((tag, version, mtime)) => {
            tag == DamSegment::Header as i32 && version == DAM_VERSION && mtime == source_mtime
        }
        Err(_) => false,
    }
}

// ============================================================
// Write side
// ============================================================

/// Cache the world's geometry, stamped with the source archive's mtime.
pub fn write_cached_map(path: &Path, world: &World, source_mtime: u64) -> Result<(), SaveError> {
    debug!(
        "caching map E{}M{} geometry to {}",
        world.episode,
        world.map,
        path.display()
    );

    let mut body = Writer::new();

    // Pointer relocation was part of the original disk layout; runtime
    // structures address each other by index now, so both table sets are
    // always empty.
    begin(&mut body, DamSegment::RelocationTables);
    body.write_u32(0);
    begin(&mut body, DamSegment::SymbolTables);
    body.write_u32(0);

    begin(&mut body, DamSegment::Map);

    begin(&mut body, DamSegment::Polyobjs);
    body.write_u32(world.polyobjs.len() as u32);
    for po in &world.polyobjs {
        body.write_i32(po.tag);
        body.write_u32(po.line_count);
        body.write_u8(po.seq_type);
        body.write_u8(po.crush as u8);
        body.write_f32(po.origin[0]);
        body.write_f32(po.origin[1]);
    }

    begin(&mut body, DamSegment::Vertexes);
    body.write_u32(world.vertexes.len() as u32);
    for v in &world.vertexes {
        body.write_f32(v.x);
        body.write_f32(v.y);
    }

    begin(&mut body, DamSegment::Lines);
    body.write_u32(world.lines.len() as u32);
    for line in &world.lines {
        body.write_u32(line.v[0]);
        body.write_u32(line.v[1]);
        body.write_i16(line.flags.bits());
        body.write_i16(line.xflags);
        body.write_i16(line.special);
        body.write_i16(line.tag);
        body.write_raw(&line.args);
        for side in line.sides {
            body.write_i32(side.map_or(-1, |s| s as i32));
        }
    }

    begin(&mut body, DamSegment::Sides);
    body.write_u32(world.sides.len() as u32);
    for side in &world.sides {
        body.write_u32(side.sector);
        body.write_f32(side.offset[0]);
        body.write_f32(side.offset[1]);
        body.write_string(&side.top_material);
        body.write_string(&side.middle_material);
        body.write_string(&side.bottom_material);
    }

    begin(&mut body, DamSegment::Sectors);
    body.write_u32(world.sectors.len() as u32);
    for sector in &world.sectors {
        body.write_f32(sector.floor_height);
        body.write_f32(sector.ceiling_height);
        body.write_string(&sector.floor_material);
        body.write_string(&sector.ceiling_material);
        body.write_u8(sector.light_level);
        body.write_i16(sector.special);
        body.write_i16(sector.tag);
        body.write_u8(sector.seq_type);
    }

    begin(&mut body, DamSegment::BspLeafs);
    body.write_u32(world.bsp_leafs.len() as u32);
    for leaf in &world.bsp_leafs {
        body.write_u32(leaf.seg_count);
        body.write_u32(leaf.first_seg);
        body.write_u32(leaf.sector);
    }

    begin(&mut body, DamSegment::Segs);
    body.write_u32(world.segs.len() as u32);
    for seg in &world.segs {
        body.write_u32(seg.v[0]);
        body.write_u32(seg.v[1]);
        body.write_u16(seg.angle);
        body.write_i32(seg.line);
        body.write_u8(seg.side);
        body.write_f32(seg.offset);
    }

    begin(&mut body, DamSegment::BspNodes);
    body.write_u32(world.bsp_nodes.len() as u32);
    for node in &world.bsp_nodes {
        body.write_f32(node.x);
        body.write_f32(node.y);
        body.write_f32(node.dx);
        body.write_f32(node.dy);
        for bbox in &node.bbox {
            for v in bbox {
                body.write_f32(*v);
            }
        }
        body.write_u32(node.children[0]);
        body.write_u32(node.children[1]);
    }

    begin(&mut body, DamSegment::Blockmap);
    body.write_f32(world.blockmap.origin[0]);
    body.write_f32(world.blockmap.origin[1]);
    body.write_u32(world.blockmap.dimensions[0]);
    body.write_u32(world.blockmap.dimensions[1]);
    body.write_u32(world.blockmap.table.len() as u32);
    for v in &world.blockmap.table {
        body.write_i32(*v);
    }

    begin(&mut body, DamSegment::Reject);
    body.write_u32(world.reject.len() as u32);
    body.write_raw(&world.reject);

    begin(&mut body, DamSegment::End);

    let mut file = Writer::new();
    begin(&mut file, DamSegment::Header);
    file.write_i32(DAM_VERSION);
    write_mtime(&mut file, source_mtime);
    file.write_u32(world.episode);
    file.write_u32(world.map);
    file.write_raw(&compression::compress(body.as_bytes())?);

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, file.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================
// Read side
// ============================================================

/// Rebuild a map's geometry from its cache. `source_mtime` must match
/// the stamp the cache was written with.
pub fn read_cached_map(path: &Path, source_mtime: u64) -> Result<World, SaveError> {
    let raw = fs::read(path)?;
    let mut r = Reader::new(raw);
    if r.read_i32()? != DamSegment::Header as i32 {
        return Err(SaveError::UnrecognizedFormat);
    }
    let version = r.read_i32()?;
    if version != DAM_VERSION {
        return Err(SaveError::VersionTooNew { found: version, supported: DAM_VERSION });
    }
    if read_mtime(&mut r)? != source_mtime {
        return Err(SaveError::Consistency("cache is stale: source archive has changed"));
    }
    let episode = r.read_u32()?;
    let map = r.read_u32()?;
    let mut world = World::new_for_map(episode, map);

    let packed = r.read_raw(r.remaining())?;
    let body = compression::decompress(&packed, compression::MAX_DECOMPRESS_SIZE)?;
    let mut r = Reader::new(body);

    expect(&mut r, DamSegment::RelocationTables)?;
    if r.read_u32()? != 0 {
        return Err(SaveError::Consistency("cached map carries relocation tables"));
    }
    expect(&mut r, DamSegment::SymbolTables)?;
    if r.read_u32()? != 0 {
        return Err(SaveError::Consistency("cached map carries symbol tables"));
    }

    expect(&mut r, DamSegment::Map)?;

    expect(&mut r, DamSegment::Polyobjs)?;
    let count = r.read_u32()?;
    world.polyobjs.reserve(count as usize);
    for _ in 0..count {
        world.polyobjs.push(Polyobj {
            tag: r.read_i32()?,
            line_count: r.read_u32()?,
            seq_type: r.read_u8()?,
            crush: r.read_u8()? != 0,
            origin: [r.read_f32()?, r.read_f32()?],
            ..Polyobj::default()
        });
    }

    expect(&mut r, DamSegment::Vertexes)?;
    let count = r.read_u32()?;
    world.vertexes.reserve(count as usize);
    for _ in 0..count {
        world.vertexes.push(Vertex { x: r.read_f32()?, y: r.read_f32()? });
    }

    expect(&mut r, DamSegment::Lines)?;
    let count = r.read_u32()?;
    world.lines.reserve(count as usize);
    for _ in 0..count {
        let v = [r.read_u32()?, r.read_u32()?];
        let flags = LineFlags::from_bits_truncate(r.read_i16()?);
        let xflags = r.read_i16()?;
        let special = r.read_i16()?;
        let tag = r.read_i16()?;
        let mut args = [0u8; 5];
        args.copy_from_slice(&r.read_raw(5)?);
        let mut sides = [None; 2];
        for side in sides.iter_mut() {
            let idx = r.read_i32()?;
            *side = if idx < 0 { None } else { Some(idx as u32) };
        }
        world.lines.push(Line { v, flags, xflags, special, tag, args, sides, ..Line::default() });
    }

    expect(&mut r, DamSegment::Sides)?;
    let count = r.read_u32()?;
    world.sides.reserve(count as usize);
    for _ in 0..count {
        world.sides.push(Side {
            sector: r.read_u32()?,
            offset: [r.read_f32()?, r.read_f32()?],
            top_material: r.read_string()?,
            middle_material: r.read_string()?,
            bottom_material: r.read_string()?,
            ..Side::default()
        });
    }

    expect(&mut r, DamSegment::Sectors)?;
    let count = r.read_u32()?;
    world.sectors.reserve(count as usize);
    for _ in 0..count {
        let mut sector = Sector {
            floor_height: r.read_f32()?,
            ceiling_height: r.read_f32()?,
            floor_material: r.read_string()?,
            ceiling_material: r.read_string()?,
            light_level: r.read_u8()?,
            special: r.read_i16()?,
            tag: r.read_i16()?,
            seq_type: r.read_u8()?,
            ..Sector::default()
        };
        sector.floor_base = sector.floor_height;
        sector.ceiling_base = sector.ceiling_height;
        world.sectors.push(sector);
    }

    expect(&mut r, DamSegment::BspLeafs)?;
    let count = r.read_u32()?;
    world.bsp_leafs.reserve(count as usize);
    for _ in 0..count {
        world.bsp_leafs.push(BspLeaf {
            seg_count: r.read_u32()?,
            first_seg: r.read_u32()?,
            sector: r.read_u32()?,
        });
    }

    expect(&mut r, DamSegment::Segs)?;
    let count = r.read_u32()?;
    world.segs.reserve(count as usize);
    for _ in 0..count {
        world.segs.push(Seg {
            v: [r.read_u32()?, r.read_u32()?],
            angle: r.read_u16()?,
            line: r.read_i32()?,
            side: r.read_u8()?,
            offset: r.read_f32()?,
        });
    }

    expect(&mut r, DamSegment::BspNodes)?;
    let count = r.read_u32()?;
    world.bsp_nodes.reserve(count as usize);
    for _ in 0..count {
        let x = r.read_f32()?;
        let y = r.read_f32()?;
        let dx = r.read_f32()?;
        let dy = r.read_f32()?;
        let mut bbox = [[0f32; 4]; 2];
        for side in bbox.iter_mut() {
            for v in side.iter_mut() {
                *v = r.read_f32()?;
            }
        }
        let children = [r.read_u32()?, r.read_u32()?];
        world.bsp_nodes.push(BspNode { x, y, dx, dy, bbox, children });
    }

    expect(&mut r, DamSegment::Blockmap)?;
    world.blockmap = Blockmap {
        origin: [r.read_f32()?, r.read_f32()?],
        dimensions: [r.read_u32()?, r.read_u32()?],
        table: Vec::new(),
    };
    let count = r.read_u32()?;
    world.blockmap.table.reserve(count as usize);
    for _ in 0..count {
        world.blockmap.table.push(r.read_i32()?);
    }

    expect(&mut r, DamSegment::Reject)?;
    let count = r.read_u32()?;
    world.reject = r.read_raw(count as usize)?;

    expect(&mut r, DamSegment::End)?;

    debug!(
        "loaded cached map E{}M{}: {} vertexes, {} lines, {} sectors",
        episode,
        map,
        world.vertexes.len(),
        world.lines.len(),
        world.sectors.len()
    );
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_geometry() -> World {
        let mut world = World::new_for_map(2, 4);
        world.vertexes = vec![
            Vertex { x: 0.0, y: 0.0 },
            Vertex { x: 128.0, y: 0.0 },
            Vertex { x: 128.0, y: 128.0 },
        ];
        world.sectors = vec![
            Sector {
                floor_height: 0.0,
                ceiling_height: 96.0,
                floor_material: "FLAT10".into(),
                ceiling_material: "F_SKY1".into(),
                light_level: 160,
                tag: 7,
                ..Sector::default()
            },
        ];
        world.sides = vec![Side {
            sector: 0,
            middle_material: "WALL02_1".into(),
            ..Side::default()
        }];
        world.lines = vec![Line {
            v: [0, 1],
            flags: LineFlags::BLOCKING | LineFlags::TWO_SIDED,
            special: 70,
            tag: 7,
            sides: [Some(0), None],
            ..Line::default()
        }];
        world.polyobjs = vec![Polyobj {
            tag: 5,
            line_count: 4,
            crush: true,
            origin: [96.0, 96.0],
            ..Polyobj::default()
        }];
        world.segs = vec![Seg { v: [0, 1], angle: 16384, line: 0, side: 0, offset: 0.0 }];
        world.bsp_leafs = vec![BspLeaf { seg_count: 1, first_seg: 0, sector: 0 }];
        world.bsp_nodes = vec![BspNode {
            x: 64.0,
            dy: 1.0,
            children: [0x8000_0000, 0x8000_0001],
            ..BspNode::default()
        }];
        world.blockmap = Blockmap {
            origin: [-8.0, -8.0],
            dimensions: [2, 2],
            table: vec![0, -1, 0, -1],
        };
        world.reject = vec![0b0000_0001];
        world
    }

    #[test]
    fn test_geometry_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map02_04.dam");
        let world = build_geometry();

        write_cached_map(&path, &world, 1_725_000_000).unwrap();
        assert!(is_cache_usable(&path, 1_725_000_000));

        // No magic number; the file opens with the Header segment tag.
        let raw = fs::read(&path).unwrap();
        assert_eq!(raw[..4], (DamSegment::Header as i32).to_le_bytes());

        let back = read_cached_map(&path, 1_725_000_000).unwrap();
        assert_eq!(back.episode, 2);
        assert_eq!(back.map, 4);
        assert_eq!(back.vertexes, world.vertexes);
        assert_eq!(back.polyobjs, world.polyobjs);
        assert_eq!(back.lines[0].special, 70);
        assert_eq!(back.lines[0].sides, [Some(0), None]);
        assert_eq!(back.sides[0].middle_material, "WALL02_1");
        assert_eq!(back.sectors[0].ceiling_material, "F_SKY1");
        assert_eq!(back.sectors[0].floor_base, 0.0);
        assert_eq!(back.segs, world.segs);
        assert_eq!(back.bsp_nodes, world.bsp_nodes);
        assert_eq!(back.blockmap, world.blockmap);
        assert_eq!(back.reject, world.reject);
    }

    #[test]
    fn test_stale_cache_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.dam");
        write_cached_map(&path, &build_geometry(), 1000).unwrap();

        assert!(!is_cache_usable(&path, 2000));
        assert!(matches!(
            read_cached_map(&path, 2000),
            Err(SaveError::Consistency(_))
        ));
    }

    #[test]
    fn test_foreign_file_is_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.dam");
        fs::write(&path, b"not a cache at all").unwrap();

        assert!(!is_cache_usable(&path, 0));
        assert!(matches!(
            read_cached_map(&path, 0),
            Err(SaveError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_missing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.dam");
        assert!(!is_cache_usable(&path, 0));
        assert!(read_cached_map(&path, 0).is_err());
    }
}
