// saveg/acs.rs — Script interpreter state (de)serializers
//
// Two parts: the per-interpreter thinker record, and the session-wide
// script block (world variables plus scripts deferred until their map
// becomes current).

use crate::thinkers::{AcsInterpreter, Thinker, ThinkerData};
use crate::world::{DeferredScript, MobjLink, World, NUM_WORLD_VARS};

use super::error::SaveError;
use super::registry::ReadThinker;
use super::{LoadContext, SaveContext};

const ACS_VERSION: u8 = 1;
const SCRIPT_STATE_VERSION: u8 = 1;

/// Interpreter stack depth ceiling; a deeper stack on the wire means a
/// corrupt record.
const ACS_STACK_DEPTH: usize = 32;

pub fn write_acs(
    ctx: &mut SaveContext,
    world: &World,
    _slot: usize,
    t: &Thinker,
) -> Result<(), SaveError> {
    let ThinkerData::Acs(a) = &t.data else {
        return Err(SaveError::Consistency("thinker data does not match its registry class"));
    };
    let activator = ctx.things.serial_id_for(world, a.activator.as_ref())?;

    let w = &mut ctx.writer;
    w.write_u8(ACS_VERSION);
    w.write_i32(a.script);
    w.write_i32(a.delay_count);
    w.write_u32(a.ip);
    w.write_u32(activator);
    w.write_i32(a.line.map_or(-1, |l| l as i32));
    w.write_u8(a.side);
    w.write_u8(a.stack.len() as u8);
    for v in &a.stack {
        w.write_i32(*v);
    }
    for v in &a.vars {
        w.write_i32(*v);
    }
    Ok(())
}

pub fn read_acs(ctx: &mut LoadContext, world: &World) -> Result<ReadThinker, SaveError> {
    let version = ctx.reader.read_u8()?;
    if version > ACS_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: ACS_VERSION as i32,
        });
    }
    let script = ctx.reader.read_i32()?;
    let delay_count = ctx.reader.read_i32()?;
    let ip = ctx.reader.read_u32()?;
    let activator_id = ctx.read_thing_id()?;

    let r = &mut ctx.reader;
    let line_idx = r.read_i32()?;
    let line = if line_idx < 0 {
        None
    } else {
        let idx = line_idx as u32;
        if idx as usize >= world.lines.len() {
            return Err(SaveError::BadElementIndex { kind: "line", index: idx });
        }
        Some(idx)
    };
    let side = r.read_u8()?;
    let depth = r.read_u8()? as usize;
    if depth > ACS_STACK_DEPTH {
        return Err(SaveError::Consistency("script stack deeper than the interpreter limit"));
    }
    let mut stack = Vec::with_capacity(depth);
    for _ in 0..depth {
        stack.push(r.read_i32()?);
    }
    let mut vars = [0i32; 10];
    for v in vars.iter_mut() {
        *v = r.read_i32()?;
    }

    let activator = if activator_id == super::thing_archive::NO_THING {
        MobjLink::None
    } else {
        MobjLink::Pending(activator_id)
    };
    let a = AcsInterpreter { script, delay_count, ip, stack, vars, activator, line, side };
    Ok(ReadThinker::special(ThinkerData::Acs(a)))
}

// ============================================================
// Session-wide script block
// ============================================================

pub fn write_script_state(ctx: &mut SaveContext, world: &World) {
    let w = &mut ctx.writer;
    w.write_u8(SCRIPT_STATE_VERSION);
    for v in &world.script_state.world_vars {
        w.write_i32(*v);
    }
    w.write_u32(world.script_state.deferred.len() as u32);
    for d in &world.script_state.deferred {
        w.write_u32(d.map);
        w.write_i32(d.script);
        w.write_raw(&d.args);
    }
}

pub fn read_script_state(ctx: &mut LoadContext, world: &mut World) -> Result<(), SaveError> {
    let r = &mut ctx.reader;
    let version = r.read_u8()?;
    if version > SCRIPT_STATE_VERSION {
        return Err(SaveError::VersionTooNew {
            found: version as i32,
            supported: SCRIPT_STATE_VERSION as i32,
        });
    }
    for v in world.script_state.world_vars.iter_mut() {
        *v = r.read_i32()?;
    }
    let count = r.read_u32()? as usize;
    if count > NUM_WORLD_VARS * 64 {
        return Err(SaveError::Consistency("implausible deferred script count"));
    }
    let mut deferred = Vec::with_capacity(count);
    for _ in 0..count {
        let map = r.read_u32()?;
        let script = r.read_i32()?;
        let raw = r.read_raw(4)?;
        let mut args = [0u8; 4];
        args.copy_from_slice(&raw);
        deferred.push(DeferredScript { map, script, args });
    }
    world.script_state.deferred = deferred;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saveg::{SessionRole, SAVE_VERSION};
    use hxd_common::stream::Reader;

    #[test]
    fn test_interpreter_roundtrip() {
        let mut world = World::new_for_map(1, 1);
        world.lines = vec![Default::default(); 3];

        let interp = AcsInterpreter {
            script: 12,
            delay_count: 70,
            ip: 0x40,
            stack: vec![3, 9, -1],
            vars: [5; 10],
            activator: MobjLink::None,
            line: Some(2),
            side: 1,
        };
        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_acs(&mut ctx, &world, 0, &Thinker::new(ThinkerData::Acs(interp.clone())))
            .unwrap();

        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        let out = read_acs(&mut lctx, &world).unwrap();
        assert_eq!(out.thinker.data, ThinkerData::Acs(interp));
        assert!(lctx.reader.is_at_end());
    }

    #[test]
    fn test_script_state_roundtrip() {
        let mut world = World::new_for_map(1, 2);
        world.script_state.world_vars[7] = 999;
        world.script_state.deferred =
            vec![DeferredScript { map: 4, script: 10, args: [1, 0, 0, 2] }];

        let mut ctx = SaveContext::new(&world, SessionRole::Authoritative, false);
        write_script_state(&mut ctx, &world);

        let mut fresh = World::new_for_map(1, 2);
        let mut lctx = LoadContext::new(
            Reader::new(ctx.writer.into_inner()),
            SessionRole::Authoritative,
            SAVE_VERSION,
        );
        read_script_state(&mut lctx, &mut fresh).unwrap();
        assert_eq!(fresh.script_state, world.script_state);
    }
}
