// save_slots.rs — Slot-based save-file management
//
// A slot is a directory holding one session file plus one map-state file
// per visited map, so cluster (hub) travel can restore a previously
// visited map without touching the rest of the session. Both file kinds
// share the same envelope: a plaintext header (magic, format version,
// and for session files the descriptive metadata), a marker byte, then
// the deflate-compressed body. Writes go to a temp file first and are
// renamed into place, so a failed save never clobbers the previous one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use hxd_common::compression;
use hxd_common::stream::{Reader, Writer};
use hxd_game::saveg::map_archive::{self, bind_deferred_player_links};
use hxd_game::saveg::player::{self, PlayerHeader};
use hxd_game::saveg::segment::{self, SegmentTag};
use hxd_game::saveg::{
    acs, LoadContext, SaveContext, SaveError, SessionRole, CLIENT_SAVE_MAGIC, SAVE_MAGIC,
    SAVE_VERSION,
};
use hxd_game::thinkers::MobjRef;
use hxd_game::world::{MobjLink, World, MAXPLAYERS};

/// User-facing slots 0..NUM_USER_SLOTS, then the autosave slot and the
/// scratch slot used while a session is in progress.
pub const NUM_USER_SLOTS: u32 = 8;
pub const AUTO_SLOT: u32 = 8;
pub const BASE_SLOT: u32 = 9;

const SAVE_EXT: &str = "hxs";
const SESSION_FILE: &str = "session.hxs";

/// Separates the plaintext header from the compressed body.
const CONSISTENCY_MARKER: u8 = 0x1d;

fn magic_for(role: SessionRole) -> i32 {
    match role {
        SessionRole::Authoritative => SAVE_MAGIC,
        SessionRole::Client => CLIENT_SAVE_MAGIC,
    }
}

fn role_for(magic: i32) -> Option<SessionRole> {
    match magic {
        SAVE_MAGIC => Some(SessionRole::Authoritative),
        CLIENT_SAVE_MAGIC => Some(SessionRole::Client),
        _ => None,
    }
}

// ============================================================
// Legacy format probing
// ============================================================

/// The historical third-party format has no magic number; it opens with
/// a fixed-width description cell and a fixed-width version text.
const LEGACY_DESCRIPTION_LEN: usize = 24;
const LEGACY_VERSION_TEXT_LEN: usize = 16;
const LEGACY_VERSION_PREFIX: &str = "HXS VER";

/// Identify an old-format save well enough to populate a slot browser
/// entry. Only the header and the game-header segment are parsed; the
/// rest of the file is never touched.
fn recognise_legacy(raw: Vec<u8>) -> Option<SaveInfo> {
    let mut r = Reader::new(raw);
    let description = r.read_fixed_string(LEGACY_DESCRIPTION_LEN).ok()?;
    let version_text = r.read_fixed_string(LEGACY_VERSION_TEXT_LEN).ok()?;
    if !version_text.starts_with(LEGACY_VERSION_PREFIX) {
        return None;
    }
    if r.read_i32().ok()? != SegmentTag::GameHeader as i32 {
        return None;
    }
    let episode = r.read_u8().ok()? as u32;
    let map = r.read_u8().ok()? as u32;
    let skill = r.read_u8().ok()?;
    Some(SaveInfo {
        description,
        role: SessionRole::Authoritative,
        version: 1,
        game_id: 0,
        episode,
        map,
        map_time: 0,
        rules: GameRules { skill, ..GameRules::default() },
        player_ids: Vec::new(),
    })
}

// ============================================================
// Session metadata
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameRules {
    pub skill: u8,
    pub deathmatch: bool,
    pub no_monsters: bool,
    pub respawn_monsters: bool,
}

/// Everything a slot browser needs without inflating the body.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveInfo {
    pub description: String,
    pub role: SessionRole,
    pub version: i32,
    /// Distinguishes the session this save belongs to; fresh per save.
    pub game_id: u32,
    pub episode: u32,
    pub map: u32,
    pub map_time: i32,
    pub rules: GameRules,
    pub player_ids: Vec<u32>,
}

/// Time-seeded so two sessions saved in the same tic still differ.
fn generate_game_id(map_time: i32) -> u32 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0);
    millis ^ ((map_time as u32) << 24) ^ rand::random::<u32>()
}

impl SaveInfo {
    pub fn from_world(world: &World, description: &str, rules: GameRules, role: SessionRole) -> Self {
        Self {
            description: description.to_owned(),
            role,
            version: SAVE_VERSION,
            game_id: generate_game_id(world.map_time),
            episode: world.episode,
            map: world.map,
            map_time: world.map_time,
            rules,
            player_ids: world
                .players
                .iter()
                .filter(|p| p.in_game)
                .map(|p| p.id)
                .collect(),
        }
    }

    fn write(&self, w: &mut Writer) {
        w.write_string(&self.description);
        w.write_u32(self.game_id);
        w.write_u32(self.episode);
        w.write_u32(self.map);
        w.write_i32(self.map_time);
        w.write_u8(self.rules.skill);
        w.write_u8(self.rules.deathmatch as u8);
        w.write_u8(self.rules.no_monsters as u8);
        w.write_u8(self.rules.respawn_monsters as u8);
        w.write_u8(self.player_ids.len() as u8);
        for id in &self.player_ids {
            w.write_u32(*id);
        }
    }

    fn read(r: &mut Reader, role: SessionRole, version: i32) -> Result<Self, SaveError> {
        let description = r.read_string()?;
        let game_id = r.read_u32()?;
        let episode = r.read_u32()?;
        let map = r.read_u32()?;
        let map_time = r.read_i32()?;
        let rules = GameRules {
            skill: r.read_u8()?,
            deathmatch: r.read_u8()? != 0,
            no_monsters: r.read_u8()? != 0,
            respawn_monsters: r.read_u8()? != 0,
        };
        let count = r.read_u8()? as usize;
        if count > MAXPLAYERS {
            return Err(SaveError::Consistency("more archived players than roster slots"));
        }
        let mut player_ids = Vec::with_capacity(count);
        for _ in 0..count {
            player_ids.push(r.read_u32()?);
        }
        Ok(Self { description, role, version, game_id, episode, map, map_time, rules, player_ids })
    }
}

/// Result of a completed session load.
pub struct LoadOutcome {
    pub info: SaveInfo,
    /// Stable IDs of connected players that had no state in the save and
    /// must leave the session.
    pub ejected: Vec<u32>,
}

// ============================================================
// Envelope
// ============================================================

fn write_envelope(
    path: &Path,
    role: SessionRole,
    info: Option<&SaveInfo>,
    body: &[u8],
) -> Result<(), SaveError> {
    let mut w = Writer::new();
    w.write_i32(magic_for(role));
    w.write_i32(SAVE_VERSION);
    if let Some(info) = info {
        info.write(&mut w);
    }
    w.write_u8(CONSISTENCY_MARKER);
    w.write_raw(&compression::compress(body)?);

    // Rename over the destination only once the whole file is on disk.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, w.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

struct Envelope {
    role: SessionRole,
    version: i32,
    info: Option<SaveInfo>,
    body: Vec<u8>,
}

fn read_envelope(path: &Path, slot: u32, with_info: bool) -> Result<Envelope, SaveError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SaveError::NotLoadable(slot));
        }
        Err(e) => return Err(e.into()),
    };
    let mut r = Reader::new(raw);

    let magic = r.read_i32().map_err(|_| SaveError::UnrecognizedFormat)?;
    let role = role_for(magic).ok_or(SaveError::UnrecognizedFormat)?;
    let version = r.read_i32().map_err(|_| SaveError::UnrecognizedFormat)?;
    if version < 1 {
        return Err(SaveError::UnrecognizedFormat);
    }
    if version > SAVE_VERSION {
        return Err(SaveError::VersionTooNew { found: version, supported: SAVE_VERSION });
    }
    let info = if with_info {
        Some(SaveInfo::read(&mut r, role, version)?)
    } else {
        None
    };
    if r.read_u8().map_err(|_| SaveError::UnrecognizedFormat)? != CONSISTENCY_MARKER {
        return Err(SaveError::UnrecognizedFormat);
    }
    let packed = r.read_raw(r.remaining())?;
    let body = compression::decompress(&packed, compression::MAX_DECOMPRESS_SIZE)?;
    Ok(Envelope { role, version, info, body })
}

// ============================================================
// Slot manager
// ============================================================

pub struct SaveSlots {
    root: PathBuf,
    /// Lazily populated per-slot metadata, dropped whenever the slot's
    /// files change.
    cache: HashMap<u32, SaveInfo>,
    last_used: Option<u32>,
}

impl SaveSlots {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: HashMap::new(), last_used: None }
    }

    /// The slot most recently saved to or loaded from, for quicksave
    /// and quickload defaults.
    pub fn last_used(&self) -> Option<u32> {
        self.last_used
    }

    fn slot_dir(&self, slot: u32) -> Result<PathBuf, SaveError> {
        let name = match slot {
            AUTO_SLOT => "auto".to_owned(),
            BASE_SLOT => "base".to_owned(),
            n if n < NUM_USER_SLOTS => format!("slot{n}"),
            n => return Err(SaveError::BadSlot(n)),
        };
        Ok(self.root.join(name))
    }

    fn session_path(&self, slot: u32) -> Result<PathBuf, SaveError> {
        Ok(self.slot_dir(slot)?.join(SESSION_FILE))
    }

    fn map_path(&self, slot: u32, episode: u32, map: u32) -> Result<PathBuf, SaveError> {
        Ok(self.slot_dir(slot)?.join(format!("map{episode:02}_{map:02}.{SAVE_EXT}")))
    }

    /// Slot metadata, read from disk at most once per change.
    pub fn info(&mut self, slot: u32) -> Result<SaveInfo, SaveError> {
        if let Some(info) = self.cache.get(&slot) {
            return Ok(info.clone());
        }
        let info = self.recognise(slot)?;
        self.cache.insert(slot, info.clone());
        Ok(info)
    }

    /// Probe a slot's session file without inflating its body. The
    /// native magics are tried first, then the historical text-header
    /// format older tools wrote.
    pub fn recognise(&self, slot: u32) -> Result<SaveInfo, SaveError> {
        let path = self.session_path(slot)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SaveError::NotLoadable(slot));
            }
            Err(e) => return Err(e.into()),
        };
        let magic = match raw.get(..4).and_then(|b| b.try_into().ok()) {
            Some(b) => i32::from_le_bytes(b),
            None => return Err(SaveError::UnrecognizedFormat),
        };
        let Some(role) = role_for(magic) else {
            return recognise_legacy(raw).ok_or(SaveError::UnrecognizedFormat);
        };
        let mut r = Reader::new(raw);
        r.skip(4)?;
        let version = r.read_i32().map_err(|_| SaveError::UnrecognizedFormat)?;
        if version < 1 {
            return Err(SaveError::UnrecognizedFormat);
        }
        if version > SAVE_VERSION {
            return Err(SaveError::VersionTooNew { found: version, supported: SAVE_VERSION });
        }
        SaveInfo::read(&mut r, role, version)
    }

    // --------------------------------------------------------
    // Saving
    // --------------------------------------------------------

    /// Archive the whole session into a slot: the session file plus the
    /// current map's state file.
    pub fn save_session(
        &mut self,
        slot: u32,
        world: &World,
        description: &str,
        rules: GameRules,
        role: SessionRole,
    ) -> Result<(), SaveError> {
        let dir = self.slot_dir(slot)?;
        fs::create_dir_all(&dir)?;
        self.cache.remove(&slot);

        let info = SaveInfo::from_world(world, description, rules, role);
        info!(
            "saving session \"{}\" (E{}M{}) to slot {}",
            description, world.episode, world.map, slot
        );

        let mut ctx = SaveContext::new(world, role, false);
        segment::begin_segment(&mut ctx.writer, SegmentTag::GameHeader);
        ctx.writer.write_u32(world.episode);
        ctx.writer.write_u32(world.map);
        ctx.writer.write_u8(rules.skill);
        segment::begin_segment(&mut ctx.writer, SegmentTag::PlayerHeader);
        PlayerHeader::current().write(&mut ctx.writer);
        segment::begin_segment(&mut ctx.writer, SegmentTag::Players);
        player::write_players(&mut ctx, world);
        segment::begin_segment(&mut ctx.writer, SegmentTag::GlobalScriptData);
        acs::write_script_state(&mut ctx, world);
        segment::end_segment(&mut ctx.writer);
        write_envelope(&self.session_path(slot)?, role, Some(&info), ctx.writer.as_bytes())?;

        self.write_map_file(slot, world, role, false)?;
        self.last_used = Some(slot);
        Ok(())
    }

    /// Archive only the current map's state, players excluded. Used on
    /// cluster travel, when the session itself continues.
    pub fn save_map_state(
        &mut self,
        slot: u32,
        world: &World,
        role: SessionRole,
    ) -> Result<(), SaveError> {
        fs::create_dir_all(self.slot_dir(slot)?)?;
        self.write_map_file(slot, world, role, true)
    }

    fn write_map_file(
        &self,
        slot: u32,
        world: &World,
        role: SessionRole,
        exclude_players: bool,
    ) -> Result<(), SaveError> {
        let mut ctx = SaveContext::new(world, role, exclude_players);
        map_archive::write_map_state(&mut ctx, world)?;
        let path = self.map_path(slot, world.episode, world.map)?;
        write_envelope(&path, role, None, ctx.writer.as_bytes())
    }

    // --------------------------------------------------------
    // Loading
    // --------------------------------------------------------

    /// Restore a session over `world`, which must hold fresh geometry
    /// for the save's current map (see `recognise`) and the currently
    /// connected players. Saved players are matched to connected ones by
    /// stable ID; connected players without saved state are reported for
    /// ejection.
    pub fn load_session(&mut self, slot: u32, world: &mut World) -> Result<LoadOutcome, SaveError> {
        let env = read_envelope(&self.session_path(slot)?, slot, true)?;
        let info = env.info.ok_or(SaveError::UnrecognizedFormat)?;
        info!("loading session \"{}\" from slot {}", info.description, slot);

        let connected: Vec<u32> = world
            .players
            .iter()
            .filter(|p| p.in_game)
            .map(|p| p.id)
            .collect();

        let mut ctx = LoadContext::new(Reader::new(env.body), env.role, env.version);
        segment::assert_segment(&mut ctx.reader, SegmentTag::GameHeader)?;
        let episode = ctx.reader.read_u32()?;
        let map = ctx.reader.read_u32()?;
        let _skill = ctx.reader.read_u8()?;
        if (episode, map) != (info.episode, info.map) {
            return Err(SaveError::Consistency("session body names a different map"));
        }
        segment::assert_segment(&mut ctx.reader, SegmentTag::PlayerHeader)?;
        let header = PlayerHeader::read(&mut ctx.reader)?;
        segment::assert_segment(&mut ctx.reader, SegmentTag::Players)?;
        let saved_players = player::read_players(&mut ctx, &header)?;
        segment::assert_segment(&mut ctx.reader, SegmentTag::GlobalScriptData)?;
        acs::read_script_state(&mut ctx, world)?;
        segment::assert_end(&mut ctx.reader)?;

        // The map state references players by their save-time roster
        // slots, so those slots must be in place before it is decoded.
        world.players = saved_players;

        let deferred = self.read_map_file(slot, world, info.episode, info.map)?;
        let ejected = reconcile_players(world, &connected);
        bind_to_first_player(world, &deferred);

        self.last_used = Some(slot);
        Ok(LoadOutcome { info, ejected })
    }

    /// Restore a previously visited map's state on cluster travel. The
    /// archive holds no player mobjs; the returned deferred links must
    /// be bound with `bind_deferred_player_links` once the travelling
    /// players have been respawned into the map.
    pub fn load_map_state(
        &self,
        slot: u32,
        world: &mut World,
        episode: u32,
        map: u32,
    ) -> Result<Vec<hxd_game::saveg::PendingPlayerLink>, SaveError> {
        self.read_map_file(slot, world, episode, map)
    }

    /// Whether a map-state file exists for the given map in this slot.
    pub fn has_map_state(&self, slot: u32, episode: u32, map: u32) -> Result<bool, SaveError> {
        Ok(self.map_path(slot, episode, map)?.exists())
    }

    fn read_map_file(
        &self,
        slot: u32,
        world: &mut World,
        episode: u32,
        map: u32,
    ) -> Result<Vec<hxd_game::saveg::PendingPlayerLink>, SaveError> {
        let path = self.map_path(slot, episode, map)?;
        let env = read_envelope(&path, slot, false)?;
        let mut ctx = LoadContext::new(Reader::new(env.body), env.role, env.version);
        map_archive::read_map_state(&mut ctx, world)?;
        if !ctx.reader.is_at_end() {
            warn!(
                "{} trailing bytes after map state in {}",
                ctx.reader.remaining(),
                path.display()
            );
        }
        Ok(ctx.deferred_player_links)
    }

    // --------------------------------------------------------
    // Slot housekeeping
    // --------------------------------------------------------

    /// Remove every save file in a slot. Missing files are not an error.
    pub fn clear_slot(&mut self, slot: u32) -> Result<(), SaveError> {
        let dir = self.slot_dir(slot)?;
        debug!("wiping save slot {} ({})", slot, dir.display());
        self.cache.remove(&slot);
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == SAVE_EXT || e == "tmp") {
                    let _ = fs::remove_file(&path);
                }
            }
        }
        Ok(())
    }

    /// Duplicate a slot's files into another slot, wiping the target
    /// first. Used to promote the scratch slot into a user slot.
    pub fn copy_slot(&mut self, src: u32, dst: u32) -> Result<(), SaveError> {
        if src == dst {
            return Ok(());
        }
        debug!("copying save slot {} to {}", src, dst);
        self.clear_slot(dst)?;

        let src_dir = self.slot_dir(src)?;
        let dst_dir = self.slot_dir(dst)?;
        fs::create_dir_all(&dst_dir)?;
        for entry in fs::read_dir(&src_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == SAVE_EXT) {
                fs::copy(&path, dst_dir.join(entry.file_name()))?;
            }
        }
        Ok(())
    }
}

/// Match saved roster slots against the players that were connected when
/// the load began. Saved players who are gone have their mobjs removed;
/// connected players with no saved state are ejected.
fn reconcile_players(world: &mut World, connected: &[u32]) -> Vec<u32> {
    let mut removed_mobjs: Vec<MobjRef> = Vec::new();
    for p in world.players.iter_mut().filter(|p| p.in_game) {
        if !connected.contains(&p.id) {
            debug!("saved player {} is not connected, dropping their state", p.id);
            if let Some(r) = p.mobj.as_ref() {
                removed_mobjs.push(r);
            }
            p.in_game = false;
            p.mobj = MobjLink::None;
        }
    }
    for r in removed_mobjs {
        world.unlink_mobj(r);
        world.thinkers.remove(r.0);
    }

    connected
        .iter()
        .copied()
        .filter(|id| !world.players.iter().any(|p| p.in_game && p.id == *id))
        .collect()
}

/// Sentinel references always rebind to the first surviving player.
fn bind_to_first_player(world: &mut World, deferred: &[hxd_game::saveg::PendingPlayerLink]) {
    if deferred.is_empty() {
        return;
    }
    let first = world
        .players
        .iter()
        .filter(|p| p.in_game)
        .find_map(|p| p.mobj.as_ref());
    if let Some(r) = first {
        bind_deferred_player_links(deferred, world, r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxd_game::thinkers::{Mobj, Thinker, ThinkerData, Thinkers};
    use hxd_game::world::Sector;

    fn build_world() -> World {
        let mut world = World::new_for_map(1, 2);
        world.map_time = 777;
        world.sectors = vec![
            Sector { floor_height: 16.0, ..Sector::default() },
            Sector { light_level: 64, ..Sector::default() },
        ];
        world.script_state.world_vars[5] = 1234;

        let mut th = Thinkers::new();
        let p0 = th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: hxd_game::info::MT_PLAYER,
            player: Some(0),
            ..Mobj::default()
        })));
        th.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: hxd_game::info::MT_ETTIN,
            health: 175,
            target: MobjLink::Live(MobjRef(p0)),
            ..Mobj::default()
        })));
        world.thinkers = th;

        world.players[0].in_game = true;
        world.players[0].id = 41;
        world.players[0].health = 55;
        world.players[0].mobj = MobjLink::Live(MobjRef(p0));
        world
    }

    fn fresh_world(ids: &[u32]) -> World {
        let mut world = World::new_for_map(1, 2);
        world.sectors = vec![Sector::default(), Sector::default()];
        for (i, id) in ids.iter().enumerate() {
            world.players[i].in_game = true;
            world.players[i].id = *id;
        }
        world
    }

    fn rules() -> GameRules {
        GameRules { skill: 2, ..GameRules::default() }
    }

    #[test]
    fn test_session_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();

        slots
            .save_session(3, &world, "the guardian of ice", rules(), SessionRole::Authoritative)
            .unwrap();

        let info = slots.info(3).unwrap();
        assert_eq!(info.description, "the guardian of ice");
        assert_eq!(info.episode, 1);
        assert_eq!(info.map, 2);
        assert_eq!(info.version, SAVE_VERSION);
        assert_eq!(info.rules.skill, 2);
        assert_eq!(info.player_ids, vec![41]);
        assert_eq!(slots.last_used(), Some(3));

        let mut restored = fresh_world(&[41]);
        let outcome = slots.load_session(3, &mut restored).unwrap();
        assert!(outcome.ejected.is_empty());
        assert_eq!(restored.map_time, 777);
        assert_eq!(restored.sectors[0].floor_height, 16.0);
        assert_eq!(restored.sectors[1].light_level, 64);
        assert_eq!(restored.script_state.world_vars[5], 1234);

        // Player 41 resumed with their saved state and mobj.
        let p = restored.players.iter().find(|p| p.in_game).unwrap();
        assert_eq!(p.id, 41);
        assert_eq!(p.health, 55);
        assert!(p.mobj.as_ref().is_some());
    }

    #[test]
    fn test_unknown_connected_player_is_ejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();
        slots.save_session(0, &world, "x", rules(), SessionRole::Authoritative).unwrap();

        let mut restored = fresh_world(&[41, 99]);
        let outcome = slots.load_session(0, &mut restored).unwrap();
        assert_eq!(outcome.ejected, vec![99]);
    }

    #[test]
    fn test_absent_saved_player_mobj_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();
        slots.save_session(0, &world, "x", rules(), SessionRole::Authoritative).unwrap();

        // Nobody from the save is connected.
        let mut restored = fresh_world(&[7]);
        let outcome = slots.load_session(0, &mut restored).unwrap();
        assert_eq!(outcome.ejected, vec![7]);
        assert!(!restored.players.iter().any(|p| p.in_game));
        // The saved player's body is gone; the ettin remains.
        assert_eq!(restored.thinkers.len(), 1);
    }

    #[test]
    fn test_removed_player_leaves_no_dangling_links() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();
        slots.save_session(0, &world, "x", rules(), SessionRole::Authoritative).unwrap();

        let mut restored = fresh_world(&[7]);
        slots.load_session(0, &mut restored).unwrap();

        // The ettin targeted the departed player's mobj; the link must be
        // severed along with the mobj.
        let (_, ettin) = restored.thinkers.mobjs().find(|(_, m)| m.health == 175).unwrap();
        assert_eq!(ettin.target, MobjLink::None);

        // The freed slot is reused by the next spawn; the ettin must not
        // come out aimed at the newcomer.
        let newcomer = MobjRef(restored.thinkers.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: hxd_game::info::MT_CENTAUR,
            ..Mobj::default()
        }))));
        let (_, ettin) = restored.thinkers.mobjs().find(|(_, m)| m.health == 175).unwrap();
        assert_ne!(ettin.target, MobjLink::Live(newcomer));
    }

    #[test]
    fn test_resave_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();
        slots.save_session(0, &world, "first", rules(), SessionRole::Authoritative).unwrap();

        // Load, save the loaded state, load again: the third generation
        // must match the second.
        let mut once = fresh_world(&[41]);
        slots.load_session(0, &mut once).unwrap();
        slots.save_session(1, &once, "second", rules(), SessionRole::Authoritative).unwrap();

        let mut twice = fresh_world(&[41]);
        slots.load_session(1, &mut twice).unwrap();

        assert_eq!(twice.map_time, once.map_time);
        assert_eq!(twice.sectors, once.sectors);
        assert_eq!(twice.script_state.world_vars, once.script_state.world_vars);
        assert_eq!(twice.thinkers.len(), once.thinkers.len());

        let p_once = once.players.iter().find(|p| p.in_game).unwrap();
        let p_twice = twice.players.iter().find(|p| p.in_game).unwrap();
        assert_eq!(p_twice.health, p_once.health);

        // Cross-references land on the same slots both generations.
        let t_once = once.thinkers.mobjs().find(|(_, m)| m.health == 175).unwrap().1.target;
        let t_twice = twice.thinkers.mobjs().find(|(_, m)| m.health == 175).unwrap().1.target;
        assert_eq!(t_twice, t_once);
    }

    #[test]
    fn test_clear_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();
        slots.save_session(1, &world, "keep", rules(), SessionRole::Authoritative).unwrap();

        slots.copy_slot(1, 5).unwrap();
        assert_eq!(slots.recognise(5).unwrap().description, "keep");
        assert!(slots.has_map_state(5, 1, 2).unwrap());

        slots.clear_slot(1).unwrap();
        assert!(matches!(slots.recognise(1), Err(SaveError::NotLoadable(1))));
        // The copy is untouched.
        assert!(slots.recognise(5).is_ok());
    }

    #[test]
    fn test_bad_slot_number() {
        let slots = SaveSlots::new("/nonexistent");
        assert!(matches!(slots.recognise(10), Err(SaveError::BadSlot(10))));
    }

    #[test]
    fn test_missing_slot_is_not_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let slots = SaveSlots::new(dir.path());
        assert!(matches!(slots.recognise(2), Err(SaveError::NotLoadable(2))));
    }

    #[test]
    fn test_garbage_file_is_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let slots = SaveSlots::new(dir.path());
        fs::create_dir_all(dir.path().join("slot4")).unwrap();
        fs::write(dir.path().join("slot4").join(SESSION_FILE), b"DOOMSAVEGAME").unwrap();
        assert!(matches!(slots.recognise(4), Err(SaveError::UnrecognizedFormat)));
    }

    #[test]
    fn test_legacy_header_is_recognised() {
        let dir = tempfile::tempdir().unwrap();
        let slots = SaveSlots::new(dir.path());
        fs::create_dir_all(dir.path().join("slot7")).unwrap();
        let mut w = Writer::new();
        w.write_fixed_string("WINNOWING HALL", 24);
        w.write_fixed_string("HXS VER 1.04", 16);
        w.write_i32(SegmentTag::GameHeader as i32);
        w.write_u8(1);
        w.write_u8(2);
        w.write_u8(3);
        fs::write(dir.path().join("slot7").join(SESSION_FILE), w.as_bytes()).unwrap();

        let info = slots.recognise(7).unwrap();
        assert_eq!(info.description, "WINNOWING HALL");
        assert_eq!(info.episode, 1);
        assert_eq!(info.map, 2);
        assert_eq!(info.rules.skill, 3);
        assert_eq!(info.version, 1);
        assert!(info.player_ids.is_empty());
    }

    #[test]
    fn test_future_version_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let slots = SaveSlots::new(dir.path());
        fs::create_dir_all(dir.path().join("slot6")).unwrap();
        let mut w = Writer::new();
        w.write_i32(SAVE_MAGIC);
        w.write_i32(SAVE_VERSION + 1);
        fs::write(dir.path().join("slot6").join(SESSION_FILE), w.as_bytes()).unwrap();
        assert!(matches!(
            slots.recognise(6),
            Err(SaveError::VersionTooNew { .. })
        ));
    }

    #[test]
    fn test_hub_map_state_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = SaveSlots::new(dir.path());
        let world = build_world();

        // Leaving the map: archive it without players.
        slots.save_map_state(BASE_SLOT, &world, SessionRole::Authoritative).unwrap();
        assert!(slots.has_map_state(BASE_SLOT, 1, 2).unwrap());

        // Coming back: restore over fresh geometry, then respawn the
        // travelling player and bind the deferred references.
        let mut back = fresh_world(&[41]);
        let deferred = slots.load_map_state(BASE_SLOT, &mut back, 1, 2).unwrap();
        assert_eq!(back.map_time, 777);
        assert_eq!(deferred.len(), 1);

        let p0 = MobjRef(back.thinkers.add(Thinker::new(ThinkerData::Mobj(Mobj {
            type_id: hxd_game::info::MT_PLAYER,
            player: Some(0),
            ..Mobj::default()
        }))));
        back.players[0].mobj = MobjLink::Live(p0);
        bind_deferred_player_links(&deferred, &mut back, p0);

        // The ettin came back targeting the respawned player mobj.
        let ettin = back.thinkers.mobjs().find(|(_, m)| m.health == 175).unwrap().1;
        assert_eq!(ettin.target, MobjLink::Live(p0));
    }
}
