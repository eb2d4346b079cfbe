// saveg/material_archive.rs — Material name dictionary for one save file
//
// Sector and side records store small serial IDs instead of material
// names. The dictionary itself is persisted once as a segment at the head
// of the per-map data, so on load it is rebuilt before any record that
// references it. Serial 0 is reserved for "no material".

use hxd_common::stream::{Reader, Writer};

use crate::thinkers::ThinkerData;
use crate::world::World;

use super::error::SaveError;

/// Usage category. Planes (flats) and walls (textures) are archived as
/// separate serial spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialGroup {
    Plane = 0,
    Wall = 1,
}

/// Dictionary layout on the wire. V0 is the historical fixed-cell
/// layout; V1 is length-prefixed. The two are not compatible, so the
/// reader is told which to expect by the enclosing format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialArchiveVersion {
    V0,
    V1,
}

const FIXED_NAME_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct MaterialArchive {
    groups: [Vec<String>; 2],
}

impl MaterialArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the world and register every material in use, so the whole
    /// dictionary can be written ahead of the element records. Thinkers
    /// that carry a destination material of their own (moving floors,
    /// material changers) are scanned too; their target need not be the
    /// current material of any sector or side.
    pub fn prepopulate(&mut self, world: &World) {
        for sector in &world.sectors {
            self.find_or_add(&sector.floor_material, MaterialGroup::Plane);
            self.find_or_add(&sector.ceiling_material, MaterialGroup::Plane);
        }
        for side in &world.sides {
            self.find_or_add(&side.top_material, MaterialGroup::Wall);
            self.find_or_add(&side.middle_material, MaterialGroup::Wall);
            self.find_or_add(&side.bottom_material, MaterialGroup::Wall);
        }
        for (_, t) in world.thinkers.iter() {
            match &t.data {
                ThinkerData::Floor(f) => {
                    self.find_or_add(&f.material, MaterialGroup::Plane);
                }
                ThinkerData::MaterialChanger(mc) => {
                    self.find_or_add(&mc.material, MaterialGroup::Wall);
                }
                _ => {}
            }
        }
    }

    /// Stable serial for a material within a group; first use assigns the
    /// next integer. The empty name is always serial 0.
    pub fn find_or_add(&mut self, name: &str, group: MaterialGroup) -> u16 {
        if name.is_empty() {
            return 0;
        }
        let entries = &mut self.groups[group as usize];
        if let Some(i) = entries.iter().position(|n| n == name) {
            return i as u16 + 1;
        }
        entries.push(name.to_owned());
        entries.len() as u16
    }

    /// Load-time inverse of `find_or_add`.
    pub fn lookup(&self, serial: u16, group: MaterialGroup) -> Result<&str, SaveError> {
        if serial == 0 {
            return Ok("");
        }
        self.groups[group as usize]
            .get(serial as usize - 1)
            .map(String::as_str)
            .ok_or(SaveError::BadMaterialSerial { serial, group })
    }

    pub fn count(&self, group: MaterialGroup) -> usize {
        self.groups[group as usize].len()
    }

    /// Persist the whole dictionary as one block.
    pub fn write(&self, w: &mut Writer, version: MaterialArchiveVersion) {
        for entries in &self.groups {
            w.write_u16(entries.len() as u16);
            for name in entries {
                match version {
                    MaterialArchiveVersion::V0 => w.write_fixed_string(name, FIXED_NAME_LEN),
                    MaterialArchiveVersion::V1 => w.write_string(name),
                }
            }
        }
    }

    /// Rebuild the dictionary from its block.
    pub fn read(r: &mut Reader, version: MaterialArchiveVersion) -> Result<Self, SaveError> {
        let mut archive = Self::new();
        for entries in archive.groups.iter_mut() {
            let count = r.read_u16()? as usize;
            entries.reserve(count);
            for _ in 0..count {
                let name = match version {
                    MaterialArchiveVersion::V0 => r.read_fixed_string(FIXED_NAME_LEN)?,
                    MaterialArchiveVersion::V1 => r.read_string()?,
                };
                entries.push(name);
            }
        }
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serials_are_stable_and_grouped() {
        let mut archive = MaterialArchive::new();
        let a = archive.find_or_add("FLOOR7_2", MaterialGroup::Plane);
        let b = archive.find_or_add("CEIL3_5", MaterialGroup::Plane);
        let c = archive.find_or_add("STARTAN2", MaterialGroup::Wall);

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        // Serial spaces are independent per group.
        assert_eq!(c, 1);
        assert_eq!(archive.find_or_add("FLOOR7_2", MaterialGroup::Plane), a);

        assert_eq!(archive.lookup(a, MaterialGroup::Plane).unwrap(), "FLOOR7_2");
        assert_eq!(archive.lookup(c, MaterialGroup::Wall).unwrap(), "STARTAN2");
    }

    #[test]
    fn test_empty_name_is_serial_zero() {
        let mut archive = MaterialArchive::new();
        assert_eq!(archive.find_or_add("", MaterialGroup::Wall), 0);
        assert_eq!(archive.lookup(0, MaterialGroup::Wall).unwrap(), "");
    }

    #[test]
    fn test_roundtrip_both_layouts() {
        let mut archive = MaterialArchive::new();
        archive.find_or_add("FLAT1", MaterialGroup::Plane);
        archive.find_or_add("X_FIRE01", MaterialGroup::Wall);
        archive.find_or_add("WINNOW02", MaterialGroup::Wall);

        for version in [MaterialArchiveVersion::V0, MaterialArchiveVersion::V1] {
            let mut w = Writer::new();
            archive.write(&mut w, version);
            let mut r = Reader::new(w.into_inner());
            let back = MaterialArchive::read(&mut r, version).unwrap();
            assert_eq!(back.lookup(1, MaterialGroup::Plane).unwrap(), "FLAT1");
            assert_eq!(back.lookup(2, MaterialGroup::Wall).unwrap(), "WINNOW02");
            assert!(r.is_at_end());
        }
    }

    #[test]
    fn test_prepopulate_covers_thinker_materials() {
        use crate::thinkers::{Floor, MaterialChanger, Thinker, Thinkers};

        let mut world = World::new_for_map(1, 1);
        let mut th = Thinkers::new();
        th.add(Thinker::new(ThinkerData::Floor(Floor {
            material: "F_092".into(),
            ..Floor::default()
        })));
        th.add(Thinker::new(ThinkerData::MaterialChanger(MaterialChanger {
            material: "WALL04".into(),
            ..MaterialChanger::default()
        })));
        world.thinkers = th;

        let mut archive = MaterialArchive::new();
        archive.prepopulate(&world);

        // Both destination materials are already registered.
        let planes = archive.count(MaterialGroup::Plane);
        let walls = archive.count(MaterialGroup::Wall);
        archive.find_or_add("F_092", MaterialGroup::Plane);
        archive.find_or_add("WALL04", MaterialGroup::Wall);
        assert_eq!(archive.count(MaterialGroup::Plane), planes);
        assert_eq!(archive.count(MaterialGroup::Wall), walls);
    }

    #[test]
    fn test_bad_serial_fails() {
        let archive = MaterialArchive::new();
        assert!(archive.lookup(3, MaterialGroup::Plane).is_err());
    }
}
