// saveg/player.rs — Player roster (de)serializers
//
// The player header records the array sizes the writer used, so a reader
// with different compile-time array lengths still decodes the records:
// missing entries default, surplus entries are consumed and dropped.
// Player identity on the wire is the stable player ID, never the roster
// slot index.

use hxd_common::stream::{Reader, Writer};

use crate::world::{Player, World, MAXPLAYERS, NUM_AMMO, NUM_KEYS, NUM_POWERS, NUM_WEAPONS};

use super::error::SaveError;
use super::{LoadContext, SaveContext};

/// Current player record version.
///
/// 1: base record.
/// 2: adds view pitch and morph countdown.
pub const PLAYER_SAVE_VERSION: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerHeader {
    pub num_powers: u8,
    pub num_keys: u8,
    pub num_weapons: u8,
    pub num_ammo: u8,
}

impl PlayerHeader {
    pub fn current() -> Self {
        Self {
            num_powers: NUM_POWERS as u8,
            num_keys: NUM_KEYS as u8,
            num_weapons: NUM_WEAPONS as u8,
            num_ammo: NUM_AMMO as u8,
        }
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_u8(self.num_powers);
        w.write_u8(self.num_keys);
        w.write_u8(self.num_weapons);
        w.write_u8(self.num_ammo);
    }

    pub fn read(r: &mut Reader) -> Result<Self, SaveError> {
        Ok(Self {
            num_powers: r.read_u8()?,
            num_keys: r.read_u8()?,
            num_weapons: r.read_u8()?,
            num_ammo: r.read_u8()?,
        })
    }
}

/// Read `stored` i32 entries into an array of possibly different length.
fn read_i32_array(r: &mut Reader, stored: u8, out: &mut [i32]) -> Result<(), SaveError> {
    for i in 0..stored as usize {
        let v = r.read_i32()?;
        if let Some(slot) = out.get_mut(i) {
            *slot = v;
        }
    }
    Ok(())
}

fn read_bool_array(r: &mut Reader, stored: u8, out: &mut [bool]) -> Result<(), SaveError> {
    for i in 0..stored as usize {
        let v = r.read_u8()? != 0;
        if let Some(slot) = out.get_mut(i) {
            *slot = v;
        }
    }
    Ok(())
}

/// Write every roster slot: a presence byte, then the record for slots
/// that hold a live player.
pub fn write_players(ctx: &mut SaveContext, world: &World) {
    for player in &world.players {
        ctx.writer.write_u8(player.in_game as u8);
        if player.in_game {
            write_player(&mut ctx.writer, player);
        }
    }
}

fn write_player(w: &mut Writer, p: &Player) {
    w.write_u8(PLAYER_SAVE_VERSION);
    w.write_u32(p.id);
    w.write_i32(p.health);
    w.write_i32(p.armor_points);
    w.write_i32(p.armor_type);
    for v in &p.powers {
        w.write_i32(*v);
    }
    for k in &p.keys {
        w.write_u8(*k as u8);
    }
    for owned in &p.weapons_owned {
        w.write_u8(*owned as u8);
    }
    w.write_i32(p.ready_weapon);
    w.write_i32(p.pending_weapon);
    for v in &p.ammo {
        w.write_i32(*v);
    }
    for v in &p.max_ammo {
        w.write_i32(*v);
    }
    w.write_i32(p.cheats);
    w.write_i32(p.refire);
    w.write_i32(p.kill_count);
    w.write_i32(p.item_count);
    w.write_i32(p.secret_count);
    w.write_f32(p.view_height);
    w.write_f32(p.look_dir);
    w.write_i32(p.morph_tics);
}

/// Read the roster written by `write_players` into `MAXPLAYERS` fresh
/// player slots. Which saved player maps to which connected session
/// player is decided later, by stable ID.
pub fn read_players(
    ctx: &mut LoadContext,
    header: &PlayerHeader,
) -> Result<Vec<Player>, SaveError> {
    let mut players = Vec::with_capacity(MAXPLAYERS);
    for _ in 0..MAXPLAYERS {
        let present = ctx.reader.read_u8()? != 0;
        if present {
            players.push(read_player(&mut ctx.reader, header)?);
        } else {
            players.push(Player::default());
        }
    }
    Ok(players)
}

fn read_player(r: &mut Reader, header: &PlayerHeader) -> Result<Player, SaveError> {
    let version = r.read_u8()?;
    if version > PLAYER_SAVE_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: PLAYER_SAVE_VERSION as i32,
        });
    }

    let mut p = Player { in_game: true, ..Player::default() };
    p.id = r.read_u32()?;
    p.health = r.read_i32()?;
    p.armor_points = r.read_i32()?;
    p.armor_type = r.read_i32()?;
    read_i32_array(r, header.num_powers, &mut p.powers)?;
    read_bool_array(r, header.num_keys, &mut p.keys)?;
    read_bool_array(r, header.num_weapons, &mut p.weapons_owned)?;
    p.ready_weapon = r.read_i32()?;
    p.pending_weapon = r.read_i32()?;
    read_i32_array(r, header.num_ammo, &mut p.ammo)?;
    read_i32_array(r, header.num_ammo, &mut p.max_ammo)?;
    p.cheats = r.read_i32()?;
    p.refire = r.read_i32()?;
    p.kill_count = r.read_i32()?;
    p.item_count = r.read_i32()?;
    p.secret_count = r.read_i32()?;
    p.view_height = r.read_f32()?;
    if version >= 2 {
        p.look_dir = r.read_f32()?;
        p.morph_tics = r.read_i32()?;
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saveg::{SessionRole, SAVE_VERSION};

    #[test]
    fn test_roster_roundtrip() {
        let mut world = World::new_for_map(1, 1);
        world.players[0] = Player {
            id: 77,
            in_game: true,
            health: 64,
            armor_points: 50,
            keys: {
                let mut k = [false; NUM_KEYS];
                k[1] = true;
                k
            },
            ready_weapon: 3,
            look_dir: -12.5,
            ..Player::default()
        };
        world.players[3] = Player { id: 78, in_game: true, ..Player::default() };

        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_players(&mut ctx, &world);

        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        let players = read_players(&mut lctx, &PlayerHeader::current()).unwrap();
        assert!(lctx.reader.is_at_end());

        assert!(players[0].in_game);
        assert_eq!(players[0].id, 77);
        assert_eq!(players[0].health, 64);
        assert!(players[0].keys[1]);
        assert_eq!(players[0].look_dir, -12.5);
        assert!(!players[1].in_game);
        assert_eq!(players[3].id, 78);
    }

    #[test]
    fn test_smaller_header_arrays_default_the_rest() {
        // A record written by a build with fewer powers/keys.
        let small = PlayerHeader { num_powers: 2, num_keys: 3, num_weapons: 4, num_ammo: 2 };
        let mut w = Writer::new();
        w.write_u8(1); // record version 1: no look_dir/morph_tics
        w.write_u32(5);
        w.write_i32(80); // health
        w.write_i32(0);
        w.write_i32(0);
        w.write_i32(11); // powers[0..2]
        w.write_i32(22);
        w.write_u8(1); // keys[0..3]
        w.write_u8(0);
        w.write_u8(1);
        for _ in 0..4 {
            w.write_u8(0); // weapons
        }
        w.write_i32(1);
        w.write_i32(1);
        w.write_i32(10); // ammo[0..2]
        w.write_i32(20);
        w.write_i32(100); // max_ammo[0..2]
        w.write_i32(200);
        for _ in 0..5 {
            w.write_i32(0); // cheats..secret_count
        }
        w.write_f32(41.0);

        let mut r = Reader::new(w.into_inner());
        let p = read_player(&mut r, &small).unwrap();
        assert!(r.is_at_end());
        assert_eq!(p.powers[..2], [11, 22]);
        assert_eq!(p.powers[2..], [0, 0, 0, 0]);
        assert!(p.keys[2]);
        assert!(!p.keys[3]);
        assert_eq!(p.look_dir, 0.0);
    }
}
