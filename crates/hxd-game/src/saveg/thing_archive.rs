// saveg/thing_archive.rs — Save-scoped mobj reference archive
//
// Maps live mobjs to 1-based serial IDs and back. Built once per save or
// load operation and cleared afterward; ID 0 always means "no reference".
// A reserved sentinel marks references to player mobjs when players are
// excluded from the current archive pass (cluster transitions), to be
// bound once the roster is reconciled.

use crate::thinkers::MobjRef;
use crate::world::World;

use super::error::SaveError;

/// Serial ID denoting a null reference.
pub const NO_THING: u32 = 0;

/// Sentinel: the reference targets a player mobj whose identity is not
/// yet established. Long form (format v4+).
pub const TARGET_PLAYER_ID: u32 = u32::MAX;

/// Short-form sentinel used by formats before v4.
pub const TARGET_PLAYER_ID_SHORT: u16 = u16::MAX;

/// Archive size assumed by formats too old to record it.
pub const LEGACY_THING_ARCHIVE_SIZE: usize = 1024;

#[derive(Debug, Default)]
pub struct ThingArchive {
    slots: Vec<Option<MobjRef>>,
    exclude_players: bool,
}

impl ThingArchive {
    /// Size the archive to the eligible live mobj population.
    pub fn init_for_save(world: &World, exclude_players: bool) -> Self {
        let size = world.thinkers.count_mobjs(exclude_players);
        Self { slots: vec![None; size], exclude_players }
    }

    /// Size the archive from an externally supplied count (read from the
    /// stream in newer formats, the legacy ceiling in the oldest).
    pub fn init_for_load(size: usize) -> Self {
        Self { slots: vec![None; size], exclude_players: false }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn excluding_players(&self) -> bool {
        self.exclude_players
    }

    /// Serial ID for a mobj reference, inserting it on first sight.
    ///
    /// Linear scan: archive sizes are bounded by the live mobj count of a
    /// single map, not by gameplay duration.
    pub fn serial_id_for(
        &mut self,
        world: &World,
        r: Option<MobjRef>,
    ) -> Result<u32, SaveError> {
        let Some(r) = r else {
            return Ok(NO_THING);
        };
        let Some(mobj) = world.thinkers.mobj(r) else {
            // Not a mobj thinker: archived as a null reference.
            return Ok(NO_THING);
        };
        if self.exclude_players && mobj.player.is_some() {
            return Ok(TARGET_PLAYER_ID);
        }

        let mut first_free = None;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(existing) if *existing == r => return Ok(i as u32 + 1),
                None if first_free.is_none() => first_free = Some(i),
                _ => {}
            }
        }
        match first_free {
            Some(i) => {
                self.slots[i] = Some(r);
                Ok(i as u32 + 1)
            }
            None => Err(SaveError::ThingArchiveExhausted { capacity: self.slots.len() }),
        }
    }

    /// Load-time registration of a specific ID → mobj association, the ID
    /// having just been decoded from that mobj's own record.
    pub fn insert(&mut self, r: MobjRef, id: u32) -> Result<(), SaveError> {
        if id == NO_THING || id == TARGET_PLAYER_ID {
            return Err(SaveError::BadElementIndex { kind: "thing", index: id });
        }
        let idx = (id - 1) as usize;
        if idx >= self.slots.len() {
            return Err(SaveError::BadElementIndex { kind: "thing", index: id });
        }
        self.slots[idx] = Some(r);
        Ok(())
    }

    /// Load-time inverse of `serial_id_for`.
    pub fn resolve(&self, id: u32) -> Result<ResolvedThing, SaveError> {
        if id == NO_THING {
            return Ok(ResolvedThing::None);
        }
        if id == TARGET_PLAYER_ID {
            return Ok(ResolvedThing::DeferPlayer);
        }
        let idx = (id - 1) as usize;
        match self.slots.get(idx) {
            Some(Some(r)) => Ok(ResolvedThing::Mobj(*r)),
            _ => Err(SaveError::BadElementIndex { kind: "thing", index: id }),
        }
    }

    /// Release the slot array at the end of the operation.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Outcome of resolving an archived thing ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedThing {
    None,
    Mobj(MobjRef),
    /// Targets a player mobj; bind once the roster exists.
    DeferPlayer,
}
