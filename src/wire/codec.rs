//! Fixed-layout binary encoding of commands and snapshots
//!
//! All multi-byte values are little-endian. Vectors are three `f32`,
//! quaternions four `f32` (x, y, z, w), entity ids their 16 raw bytes and
//! counts `u32`.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use glam::{Quat, Vec3};
use thiserror::Error;
use uuid::Uuid;

use crate::game::{Command, EntityId, Orbit, PlayerSnapshot, Shot, Snapshot, Weapon};

/// Encoded size of one [`Command`]
pub const COMMAND_WIRE_SIZE: usize = 30;

/// Longest weapon name accepted, excluding the terminator
pub const MAX_NAME_LEN: usize = 250;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer ended early: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("String longer than 250 bytes")]
    StringTooLong,

    #[error("String is not ASCII")]
    NonAscii,

    #[error("Unknown weapon: {0}")]
    UnknownWeapon(String),

    #[error("{0} unread bytes after message")]
    TrailingBytes(usize),

    #[error("Command batch of {0} bytes is not a whole number of commands")]
    BadBatchLength(usize),
}

fn ensure(buf: &impl Buf, len: usize) -> Result<(), CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::Truncated {
            needed: len - buf.remaining(),
        });
    }
    Ok(())
}

fn put_bool(buf: &mut impl BufMut, value: bool) {
    buf.put_u8(u8::from(value));
}

fn get_bool(buf: &mut impl Buf) -> Result<bool, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

fn get_f32(buf: &mut impl Buf) -> Result<f32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32_le())
}

fn get_f64(buf: &mut impl Buf) -> Result<f64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_f64_le())
}

fn get_u32(buf: &mut impl Buf) -> Result<u32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

fn put_vec3(buf: &mut impl BufMut, v: Vec3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

fn get_vec3(buf: &mut impl Buf) -> Result<Vec3, CodecError> {
    ensure(buf, 12)?;
    Ok(Vec3::new(buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()))
}

fn put_quat(buf: &mut impl BufMut, q: Quat) {
    for component in q.to_array() {
        buf.put_f32_le(component);
    }
}

fn get_quat(buf: &mut impl Buf) -> Result<Quat, CodecError> {
    ensure(buf, 16)?;
    Ok(Quat::from_xyzw(
        buf.get_f32_le(),
        buf.get_f32_le(),
        buf.get_f32_le(),
        buf.get_f32_le(),
    ))
}

fn put_id(buf: &mut impl BufMut, id: &EntityId) {
    buf.put_slice(id.as_bytes());
}

fn get_id(buf: &mut impl Buf) -> Result<EntityId, CodecError> {
    ensure(buf, 16)?;
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(Uuid::from_bytes(raw))
}

/// Write a null-terminated ASCII string
pub fn put_name(buf: &mut impl BufMut, name: &str) -> Result<(), CodecError> {
    if !name.is_ascii() || name.contains('\0') {
        return Err(CodecError::NonAscii);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CodecError::StringTooLong);
    }
    buf.put_slice(name.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Read a null-terminated ASCII string
pub fn get_name(buf: &mut impl Buf) -> Result<String, CodecError> {
    let mut name = Vec::new();
    loop {
        ensure(buf, 1)?;
        match buf.get_u8() {
            0 => break,
            byte if !byte.is_ascii() => return Err(CodecError::NonAscii),
            byte => {
                if name.len() == MAX_NAME_LEN {
                    return Err(CodecError::StringTooLong);
                }
                name.push(byte);
            }
        }
    }
    // Every byte was checked to be ASCII above
    Ok(name.into_iter().map(char::from).collect())
}

pub fn encode_command(buf: &mut impl BufMut, command: &Command) {
    buf.put_f64_le(command.timestamp);
    buf.put_f32_le(command.move_h);
    buf.put_f32_le(command.move_v);
    put_bool(buf, command.sneak);
    buf.put_f32_le(command.mouse_dx);
    buf.put_f32_le(command.mouse_dy);
    put_bool(buf, command.fire);
    put_bool(buf, command.fire_edge);
    put_bool(buf, command.block);
    put_bool(buf, command.equip_primary);
    put_bool(buf, command.equip_secondary);
}

pub fn decode_command(buf: &mut impl Buf) -> Result<Command, CodecError> {
    ensure(buf, COMMAND_WIRE_SIZE)?;
    Ok(Command {
        timestamp: get_f64(buf)?,
        move_h: get_f32(buf)?,
        move_v: get_f32(buf)?,
        sneak: get_bool(buf)?,
        mouse_dx: get_f32(buf)?,
        mouse_dy: get_f32(buf)?,
        fire: get_bool(buf)?,
        fire_edge: get_bool(buf)?,
        block: get_bool(buf)?,
        equip_primary: get_bool(buf)?,
        equip_secondary: get_bool(buf)?,
    })
}

/// Commands packed back to back, no framing
pub fn encode_command_batch(commands: &[Command]) -> Bytes {
    let mut buf = BytesMut::with_capacity(commands.len() * COMMAND_WIRE_SIZE);
    for command in commands {
        encode_command(&mut buf, command);
    }
    buf.freeze()
}

pub fn decode_command_batch(mut buf: impl Buf) -> Result<Vec<Command>, CodecError> {
    let len = buf.remaining();
    if len % COMMAND_WIRE_SIZE != 0 {
        return Err(CodecError::BadBatchLength(len));
    }

    let mut commands = Vec::with_capacity(len / COMMAND_WIRE_SIZE);
    while buf.has_remaining() {
        commands.push(decode_command(&mut buf)?);
    }
    Ok(commands)
}

pub fn encode_player_snapshot(buf: &mut impl BufMut, entry: &PlayerSnapshot) -> Result<(), CodecError> {
    put_vec3(buf, entry.position);
    put_quat(buf, entry.rotation);
    buf.put_f32_le(entry.x_movement);
    buf.put_f32_le(entry.z_movement);
    put_vec3(buf, entry.orbit.position);
    put_quat(buf, entry.orbit.rotation);
    buf.put_f32_le(entry.orbit.yaw);
    buf.put_f32_le(entry.orbit.pitch);
    put_name(buf, entry.weapon.wire_name())?;
    put_bool(buf, entry.weapon_raised);
    put_bool(buf, entry.weapon_blocking);
    buf.put_f64_le(entry.last_applied_command_time);
    buf.put_i32_le(entry.hp);
    put_bool(buf, entry.is_dead);
    put_bool(buf, entry.has_swing_struck);
    Ok(())
}

pub fn decode_player_snapshot(buf: &mut impl Buf) -> Result<PlayerSnapshot, CodecError> {
    let position = get_vec3(buf)?;
    let rotation = get_quat(buf)?;
    let x_movement = get_f32(buf)?;
    let z_movement = get_f32(buf)?;
    let orbit_position = get_vec3(buf)?;
    let orbit_rotation = get_quat(buf)?;
    let yaw = get_f32(buf)?;
    let pitch = get_f32(buf)?;

    let name = get_name(buf)?;
    let weapon = Weapon::from_wire_name(&name).ok_or(CodecError::UnknownWeapon(name))?;

    let weapon_raised = get_bool(buf)?;
    let weapon_blocking = get_bool(buf)?;
    let last_applied_command_time = get_f64(buf)?;
    ensure(buf, 4)?;
    let hp = buf.get_i32_le();

    Ok(PlayerSnapshot {
        position,
        rotation,
        x_movement,
        z_movement,
        orbit: Orbit {
            yaw,
            pitch,
            position: orbit_position,
            rotation: orbit_rotation,
        },
        weapon,
        weapon_raised,
        weapon_blocking,
        last_applied_command_time,
        hp,
        is_dead: get_bool(buf)?,
        has_swing_struck: get_bool(buf)?,
    })
}

/// Encode a snapshot body. The timestamp is not part of it: the transport
/// delivers it alongside as the send time.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();

    buf.put_u32_le(snapshot.entities().len() as u32);
    for (id, entry) in snapshot.entities() {
        put_id(&mut buf, id);
        encode_player_snapshot(&mut buf, entry)?;
    }

    buf.put_u32_le(snapshot.shots().len() as u32);
    for shot in snapshot.shots() {
        put_id(&mut buf, &shot.shooter_id);
        put_vec3(&mut buf, shot.destination);
        put_vec3(&mut buf, shot.origin);
    }

    Ok(buf.freeze())
}

/// Decode a snapshot body sent at `sent_at`
pub fn decode_snapshot(mut buf: impl Buf, sent_at: f64) -> Result<Snapshot, CodecError> {
    let entity_count = get_u32(&mut buf)?;
    let mut entities = BTreeMap::new();
    for _ in 0..entity_count {
        let id = get_id(&mut buf)?;
        entities.insert(id, decode_player_snapshot(&mut buf)?);
    }

    let shot_count = get_u32(&mut buf)?;
    let mut shots = Vec::new();
    for _ in 0..shot_count {
        let shooter_id = get_id(&mut buf)?;
        let destination = get_vec3(&mut buf)?;
        let origin = get_vec3(&mut buf)?;
        shots.push(Shot {
            shooter_id,
            origin,
            destination,
        });
    }

    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes(buf.remaining()));
    }

    Ok(Snapshot::new(sent_at, entities, shots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::{EntityMode, EntityState};

    #[test]
    fn command_is_thirty_bytes() {
        let command = Command {
            timestamp: 12.5,
            move_h: -1.0,
            move_v: 0.5,
            fire: true,
            fire_edge: true,
            equip_secondary: true,
            ..Command::default()
        };
        let encoded = encode_command_batch(&[command]);
        assert_eq!(encoded.len(), COMMAND_WIRE_SIZE);
        assert_eq!(&encoded[..8], &12.5f64.to_le_bytes());
        assert_eq!(decode_command_batch(encoded).unwrap(), vec![command]);
    }

    #[test]
    fn ragged_batch_is_rejected() {
        let mut encoded = BytesMut::from(&encode_command_batch(&[Command::idle(1.0), Command::idle(2.0)])[..]);
        encoded.truncate(COMMAND_WIRE_SIZE + 7);
        assert_eq!(
            decode_command_batch(encoded.freeze()),
            Err(CodecError::BadBatchLength(COMMAND_WIRE_SIZE + 7))
        );
    }

    #[test]
    fn names_are_null_terminated_and_bounded() {
        let mut buf = BytesMut::new();
        put_name(&mut buf, "Machette").unwrap();
        assert_eq!(&buf[..], b"Machette\0");

        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert_eq!(put_name(&mut BytesMut::new(), &long), Err(CodecError::StringTooLong));
        assert_eq!(put_name(&mut BytesMut::new(), "épée"), Err(CodecError::NonAscii));

        let mut unterminated = Bytes::from(vec![b'a'; MAX_NAME_LEN + 1]);
        assert_eq!(get_name(&mut unterminated), Err(CodecError::StringTooLong));

        let mut high = Bytes::from_static(&[b'a', 0xC3, 0]);
        assert_eq!(get_name(&mut high), Err(CodecError::NonAscii));
    }

    #[test]
    fn unknown_weapon_is_rejected() {
        let tuning = Tuning::default();
        let entry = EntityState::spawn(EntityMode::Authoritative, Vec3::ZERO, 0.0, 0.0, &tuning).to_snapshot();
        let mut buf = BytesMut::new();
        encode_player_snapshot(&mut buf, &entry).unwrap();

        // Name follows two transforms and four floats
        let start = 72;
        assert_eq!(&buf[start..start + 8], b"NoWeapon");
        buf[start..start + 8].copy_from_slice(b"Longbow!");
        assert_eq!(
            decode_player_snapshot(&mut buf.freeze()),
            Err(CodecError::UnknownWeapon("Longbow!".to_string()))
        );
    }

    #[test]
    fn snapshot_survives_the_wire() {
        let tuning = Tuning::default();
        let mut state = EntityState::spawn(EntityMode::Authoritative, Vec3::new(1.0, 0.0, -3.0), 45.0, 7.5, &tuning);
        state.weapon = Weapon::Revolver;
        state.weapon_raised = true;
        state.hp = 70;
        let id = Uuid::new_v4();
        let shot = Shot {
            shooter_id: id,
            origin: Vec3::new(0.3, 1.4, 0.5),
            destination: Vec3::new(4.0, 1.2, 9.0),
        };
        let snapshot = Snapshot::new(8.0, BTreeMap::from([(id, state.to_snapshot())]), vec![shot]);

        let encoded = encode_snapshot(&snapshot).unwrap();
        assert_eq!(decode_snapshot(encoded, 8.0).unwrap(), snapshot);
    }

    #[test]
    fn truncated_and_trailing_snapshots_fail() {
        let snapshot = Snapshot::new(1.0, BTreeMap::new(), Vec::new());
        let encoded = encode_snapshot(&snapshot).unwrap();

        assert!(matches!(
            decode_snapshot(encoded.slice(..3), 1.0),
            Err(CodecError::Truncated { .. })
        ));

        let mut padded = BytesMut::from(&encoded[..]);
        padded.put_u8(9);
        assert_eq!(decode_snapshot(padded.freeze(), 1.0), Err(CodecError::TrailingBytes(1)));
    }
}
