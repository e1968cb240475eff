//! # Sensor packet registry
//!
//! Every sensor packet id the Open Interface understands, with the number of
//! payload bytes the device answers with. Single packets carry one sensor;
//! group packets concatenate a contiguous range of single packets, so their
//! length is computed from the member table at compile time rather than
//! written down a second time.

use crate::error::OiError;
use std::ops::RangeInclusive;

pub const GROUP_0: u8 = 0;
pub const GROUP_1: u8 = 1;
pub const GROUP_2: u8 = 2;
pub const GROUP_3: u8 = 3;
pub const GROUP_4: u8 = 4;
pub const GROUP_5: u8 = 5;
pub const GROUP_6: u8 = 6;
pub const BUMPS_WHEEL_DROPS: u8 = 7;
pub const WALL: u8 = 8;
pub const CLIFF_LEFT: u8 = 9;
pub const CLIFF_FRONT_LEFT: u8 = 10;
pub const CLIFF_FRONT_RIGHT: u8 = 11;
pub const CLIFF_RIGHT: u8 = 12;
pub const VIRTUAL_WALL: u8 = 13;
pub const WHEEL_OVERCURRENTS: u8 = 14;
pub const DIRT_DETECT: u8 = 15;
pub const UNUSED_16: u8 = 16;
pub const IR_OMNI: u8 = 17;
pub const BUTTONS: u8 = 18;
pub const DISTANCE: u8 = 19;
pub const ANGLE: u8 = 20;
pub const CHARGING_STATE: u8 = 21;
pub const VOLTAGE: u8 = 22;
pub const CURRENT: u8 = 23;
pub const TEMPERATURE: u8 = 24;
pub const BATTERY_CHARGE: u8 = 25;
pub const BATTERY_CAPACITY: u8 = 26;
pub const WALL_SIGNAL: u8 = 27;
pub const CLIFF_LEFT_SIGNAL: u8 = 28;
pub const CLIFF_FRONT_LEFT_SIGNAL: u8 = 29;
pub const CLIFF_FRONT_RIGHT_SIGNAL: u8 = 30;
pub const CLIFF_RIGHT_SIGNAL: u8 = 31;
pub const UNUSED_32: u8 = 32;
pub const UNUSED_33: u8 = 33;
pub const CHARGING_SOURCES: u8 = 34;
pub const OI_MODE: u8 = 35;
pub const SONG_NUMBER: u8 = 36;
pub const SONG_PLAYING: u8 = 37;
pub const NUM_STREAM_PACKETS: u8 = 38;
pub const REQUESTED_VELOCITY: u8 = 39;
pub const REQUESTED_RADIUS: u8 = 40;
pub const REQUESTED_RIGHT_VELOCITY: u8 = 41;
pub const REQUESTED_LEFT_VELOCITY: u8 = 42;
pub const LEFT_ENCODER_COUNTS: u8 = 43;
pub const RIGHT_ENCODER_COUNTS: u8 = 44;
pub const LIGHT_BUMPER: u8 = 45;
pub const LIGHT_BUMP_LEFT_SIGNAL: u8 = 46;
pub const LIGHT_BUMP_FRONT_LEFT_SIGNAL: u8 = 47;
pub const LIGHT_BUMP_CENTER_LEFT_SIGNAL: u8 = 48;
pub const LIGHT_BUMP_CENTER_RIGHT_SIGNAL: u8 = 49;
pub const LIGHT_BUMP_FRONT_RIGHT_SIGNAL: u8 = 50;
pub const LIGHT_BUMP_RIGHT_SIGNAL: u8 = 51;
pub const IR_LEFT: u8 = 52;
pub const IR_RIGHT: u8 = 53;
pub const LEFT_MOTOR_CURRENT: u8 = 54;
pub const RIGHT_MOTOR_CURRENT: u8 = 55;
pub const MAIN_BRUSH_CURRENT: u8 = 56;
pub const SIDE_BRUSH_CURRENT: u8 = 57;
pub const STASIS: u8 = 58;
pub const GROUP_ALL: u8 = 100;
pub const GROUP_101: u8 = 101;
pub const GROUP_LIGHT_BUMP_SIGNALS: u8 = 106;
pub const GROUP_MOTOR_CURRENTS: u8 = 107;

/// Single sensor packets and their payload lengths.
const SINGLE_PACKETS: &[(u8, u8)] = &[
    (BUMPS_WHEEL_DROPS, 1),
    (WALL, 1),
    (CLIFF_LEFT, 1),
    (CLIFF_FRONT_LEFT, 1),
    (CLIFF_FRONT_RIGHT, 1),
    (CLIFF_RIGHT, 1),
    (VIRTUAL_WALL, 1),
    (WHEEL_OVERCURRENTS, 1),
    (DIRT_DETECT, 1),
    (UNUSED_16, 1),
    (IR_OMNI, 1),
    (BUTTONS, 1),
    (DISTANCE, 2),
    (ANGLE, 2),
    (CHARGING_STATE, 1),
    (VOLTAGE, 2),
    (CURRENT, 2),
    (TEMPERATURE, 1),
    (BATTERY_CHARGE, 2),
    (BATTERY_CAPACITY, 2),
    (WALL_SIGNAL, 2),
    (CLIFF_LEFT_SIGNAL, 2),
    (CLIFF_FRONT_LEFT_SIGNAL, 2),
    (CLIFF_FRONT_RIGHT_SIGNAL, 2),
    (CLIFF_RIGHT_SIGNAL, 2),
    (UNUSED_32, 1),
    (UNUSED_33, 2),
    (CHARGING_SOURCES, 1),
    (OI_MODE, 1),
    (SONG_NUMBER, 1),
    (SONG_PLAYING, 1),
    (NUM_STREAM_PACKETS, 1),
    (REQUESTED_VELOCITY, 2),
    (REQUESTED_RADIUS, 2),
    (REQUESTED_RIGHT_VELOCITY, 2),
    (REQUESTED_LEFT_VELOCITY, 2),
    (LEFT_ENCODER_COUNTS, 2),
    (RIGHT_ENCODER_COUNTS, 2),
    (LIGHT_BUMPER, 1),
    (LIGHT_BUMP_LEFT_SIGNAL, 2),
    (LIGHT_BUMP_FRONT_LEFT_SIGNAL, 2),
    (LIGHT_BUMP_CENTER_LEFT_SIGNAL, 2),
    (LIGHT_BUMP_CENTER_RIGHT_SIGNAL, 2),
    (LIGHT_BUMP_FRONT_RIGHT_SIGNAL, 2),
    (LIGHT_BUMP_RIGHT_SIGNAL, 2),
    (IR_LEFT, 1),
    (IR_RIGHT, 1),
    (LEFT_MOTOR_CURRENT, 2),
    (RIGHT_MOTOR_CURRENT, 2),
    (MAIN_BRUSH_CURRENT, 2),
    (SIDE_BRUSH_CURRENT, 2),
    (STASIS, 1),
];

/// Group packets as `(group id, first member, last member)`.
const GROUPS: &[(u8, u8, u8)] = &[
    (GROUP_0, BUMPS_WHEEL_DROPS, BATTERY_CAPACITY),
    (GROUP_1, BUMPS_WHEEL_DROPS, UNUSED_16),
    (GROUP_2, IR_OMNI, ANGLE),
    (GROUP_3, CHARGING_STATE, BATTERY_CAPACITY),
    (GROUP_4, WALL_SIGNAL, CHARGING_SOURCES),
    (GROUP_5, OI_MODE, REQUESTED_LEFT_VELOCITY),
    (GROUP_6, BUMPS_WHEEL_DROPS, REQUESTED_LEFT_VELOCITY),
    (GROUP_ALL, BUMPS_WHEEL_DROPS, STASIS),
    (GROUP_101, LEFT_ENCODER_COUNTS, STASIS),
    (GROUP_LIGHT_BUMP_SIGNALS, LIGHT_BUMP_LEFT_SIGNAL, LIGHT_BUMP_RIGHT_SIGNAL),
    (GROUP_MOTOR_CURRENTS, LEFT_MOTOR_CURRENT, STASIS),
];

/// Payload length per id; zero marks an unregistered id.
static PACKET_LENGTHS: [u8; 256] = build_length_table();

const fn build_length_table() -> [u8; 256] {
    let mut table = [0u8; 256];

    let mut i = 0;
    while i < SINGLE_PACKETS.len() {
        let (id, len) = SINGLE_PACKETS[i];
        table[id as usize] = len;
        i += 1;
    }

    // Members are single packets, all of which are in the table by now.
    let mut g = 0;
    while g < GROUPS.len() {
        let (id, first, last) = GROUPS[g];
        let mut sum: u16 = 0;
        let mut member = first as usize;
        while member <= last as usize {
            assert!(table[member] != 0, "group member is not a registered packet");
            sum += table[member] as u16;
            member += 1;
        }
        assert!(sum <= u8::MAX as u16, "group payload does not fit a length byte");
        table[id as usize] = sum as u8;
        g += 1;
    }

    table
}

/// Payload length of `id`.
pub fn lookup(id: u8) -> Result<u8, OiError> {
    match PACKET_LENGTHS[id as usize] {
        0 => Err(OiError::UnknownSensorId(id)),
        len => Ok(len),
    }
}

pub fn is_registered(id: u8) -> bool {
    PACKET_LENGTHS[id as usize] != 0
}

/// Checks every id, failing on the first one that is not registered.
pub fn validate(ids: &[u8]) -> Result<(), OiError> {
    match ids.iter().find(|&&id| !is_registered(id)) {
        Some(&id) => Err(OiError::UnknownSensorId(id)),
        None => Ok(()),
    }
}

/// Sum of the payload lengths of `ids`, which must already be validated.
pub(crate) fn payload_len(ids: &[u8]) -> usize {
    ids.iter().map(|&id| PACKET_LENGTHS[id as usize] as usize).sum()
}

pub fn is_group(id: u8) -> bool {
    group_members(id).is_some()
}

/// The single packets a group packet concatenates, in wire order.
pub fn group_members(id: u8) -> Option<RangeInclusive<u8>> {
    GROUPS
        .iter()
        .find(|(group, _, _)| *group == id)
        .map(|&(_, first, last)| first..=last)
}

/// All group packet ids.
pub fn groups() -> impl Iterator<Item = u8> {
    GROUPS.iter().map(|&(id, _, _)| id)
}

/// All registered ids, groups included, in ascending order.
pub fn registered_ids() -> impl Iterator<Item = u8> {
    (0..=u8::MAX).filter(|&id| is_registered(id))
}
