// info.rs — Static mobj type definitions
//
// Old save formats omit fields that were added later (flags3, for one);
// readers fall back to the values here when a record predates the field.

use crate::world::{MobjFlags, MobjFlags2, MobjFlags3};

#[derive(Debug, Clone, Copy)]
pub struct MobjInfo {
    pub name: &'static str,
    pub spawn_health: i32,
    pub radius: f32,
    pub height: f32,
    pub flags: MobjFlags,
    pub flags2: MobjFlags2,
    pub flags3: MobjFlags3,
}

pub const MT_PLAYER: u16 = 0;
pub const MT_TROOPER: u16 = 1;
pub const MT_SERGEANT: u16 = 2;
pub const MT_ETTIN: u16 = 3;
pub const MT_CENTAUR: u16 = 4;
pub const MT_ROCKET: u16 = 5;
pub const MT_BARREL: u16 = 6;
pub const MT_CORPSE_BIT: u16 = 7;
pub const MT_TELEPORTMAN: u16 = 8;

static MOBJ_INFO: &[MobjInfo] = &[
    MobjInfo {
        name: "MT_PLAYER",
        spawn_health: 100,
        radius: 16.0,
        height: 56.0,
        flags: MobjFlags::SOLID.union(MobjFlags::SHOOTABLE).union(MobjFlags::DROPOFF)
            .union(MobjFlags::PICKUP).union(MobjFlags::NOTDMATCH),
        flags2: MobjFlags2::PASSMOBJ.union(MobjFlags2::SLIDE),
        flags3: MobjFlags3::NOMORPH,
    },
    MobjInfo {
        name: "MT_TROOPER",
        spawn_health: 20,
        radius: 20.0,
        height: 56.0,
        flags: MobjFlags::SOLID.union(MobjFlags::SHOOTABLE).union(MobjFlags::COUNTKILL),
        flags2: MobjFlags2::PASSMOBJ,
        flags3: MobjFlags3::empty(),
    },
    MobjInfo {
        name: "MT_SERGEANT",
        spawn_health: 30,
        radius: 20.0,
        height: 56.0,
        flags: MobjFlags::SOLID.union(MobjFlags::SHOOTABLE).union(MobjFlags::COUNTKILL),
        flags2: MobjFlags2::PASSMOBJ,
        flags3: MobjFlags3::empty(),
    },
    MobjInfo {
        name: "MT_ETTIN",
        spawn_health: 175,
        radius: 25.0,
        height: 68.0,
        flags: MobjFlags::SOLID.union(MobjFlags::SHOOTABLE).union(MobjFlags::COUNTKILL),
        flags2: MobjFlags2::PASSMOBJ.union(MobjFlags2::PUSHABLE),
        flags3: MobjFlags3::CRUSHABLE,
    },
    MobjInfo {
        name: "MT_CENTAUR",
        spawn_health: 200,
        radius: 20.0,
        height: 64.0,
        flags: MobjFlags::SOLID.union(MobjFlags::SHOOTABLE).union(MobjFlags::COUNTKILL),
        flags2: MobjFlags2::PASSMOBJ,
        flags3: MobjFlags3::NOINFIGHT,
    },
    MobjInfo {
        name: "MT_ROCKET",
        spawn_health: 1000,
        radius: 11.0,
        height: 8.0,
        flags: MobjFlags::MISSILE.union(MobjFlags::DROPOFF).union(MobjFlags::NOGRAVITY)
            .union(MobjFlags::NOBLOCKMAP),
        flags2: MobjFlags2::NOTELEPORT,
        flags3: MobjFlags3::NOBLAST,
    },
    MobjInfo {
        name: "MT_BARREL",
        spawn_health: 20,
        radius: 10.0,
        height: 42.0,
        flags: MobjFlags::SOLID.union(MobjFlags::SHOOTABLE).union(MobjFlags::NOBLOOD),
        flags2: MobjFlags2::empty(),
        flags3: MobjFlags3::empty(),
    },
    MobjInfo {
        name: "MT_CORPSEBIT",
        spawn_health: 1000,
        radius: 5.0,
        height: 16.0,
        flags: MobjFlags::NOBLOCKMAP,
        flags2: MobjFlags2::empty(),
        flags3: MobjFlags3::empty(),
    },
    MobjInfo {
        name: "MT_TELEPORTMAN",
        spawn_health: 1000,
        radius: 20.0,
        height: 16.0,
        flags: MobjFlags::NOSECTOR.union(MobjFlags::NOBLOCKMAP),
        flags2: MobjFlags2::empty(),
        flags3: MobjFlags3::empty(),
    },
];

/// Number of defined mobj types.
pub fn num_mobj_types() -> u16 {
    MOBJ_INFO.len() as u16
}

/// Static definition for a type, clamping unknown type IDs to the last
/// entry rather than failing: saves written by mods may reference types
/// this build does not know.
pub fn mobj_info(type_id: u16) -> &'static MobjInfo {
    MOBJ_INFO
        .get(type_id as usize)
        .unwrap_or_else(|| &MOBJ_INFO[MOBJ_INFO.len() - 1])
}
