use crate::error::OiError;
use crate::mode::Mode;
use crate::sensor::{self, *};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// Battery charging state reported by packet 21.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Display)]
#[repr(u8)]
pub enum ChargingState {
    NotCharging = 0,
    Reconditioning = 1,
    Full = 2,
    Trickle = 3,
    Waiting = 4,
    Fault = 5,
}

/// A decoded single-packet sensor value.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Bool(bool),
    /// Individual flags packed into one byte, e.g. bumps and wheel drops.
    Bits(u8),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    ChargingState(ChargingState),
    Mode(Mode),
    /// Group packets and anything without a typed layout.
    Raw(Bytes),
}

impl SensorReading {
    /// Decodes `payload` as packet `id`. The payload must be exactly the
    /// registered length.
    pub fn decode(id: u8, payload: &[u8]) -> Result<Self, OiError> {
        let expected = sensor::lookup(id)? as usize;
        if payload.len() != expected {
            return Err(OiError::out_of_range(
                "payload length",
                payload.len() as i32,
                expected as i32,
                expected as i32,
            ));
        }

        let reading = match id {
            WALL | CLIFF_LEFT | CLIFF_FRONT_LEFT | CLIFF_FRONT_RIGHT | CLIFF_RIGHT | VIRTUAL_WALL | SONG_PLAYING => {
                SensorReading::Bool(payload[0] & 0x01 != 0)
            }
            BUMPS_WHEEL_DROPS | WHEEL_OVERCURRENTS | BUTTONS | CHARGING_SOURCES | LIGHT_BUMPER | STASIS => {
                SensorReading::Bits(payload[0])
            }
            DIRT_DETECT | UNUSED_16 | IR_OMNI | UNUSED_32 | SONG_NUMBER | NUM_STREAM_PACKETS | IR_LEFT | IR_RIGHT => {
                SensorReading::U8(payload[0])
            }
            TEMPERATURE => SensorReading::I8(payload[0] as i8),
            CHARGING_STATE => {
                let state = ChargingState::try_from(payload[0])
                    .map_err(|_| OiError::out_of_range("charging state", payload[0] as i32, 0, 5))?;
                SensorReading::ChargingState(state)
            }
            OI_MODE => {
                let mode =
                    Mode::try_from(payload[0]).map_err(|_| OiError::out_of_range("oi mode", payload[0] as i32, 0, 3))?;
                SensorReading::Mode(mode)
            }
            DISTANCE | ANGLE | CURRENT | REQUESTED_VELOCITY | REQUESTED_RADIUS | REQUESTED_RIGHT_VELOCITY
            | REQUESTED_LEFT_VELOCITY | LEFT_MOTOR_CURRENT | RIGHT_MOTOR_CURRENT | MAIN_BRUSH_CURRENT
            | SIDE_BRUSH_CURRENT => SensorReading::I16(BigEndian::read_i16(payload)),
            VOLTAGE
            | BATTERY_CHARGE
            | BATTERY_CAPACITY
            | WALL_SIGNAL
            | CLIFF_LEFT_SIGNAL
            | CLIFF_FRONT_LEFT_SIGNAL
            | CLIFF_FRONT_RIGHT_SIGNAL
            | CLIFF_RIGHT_SIGNAL
            | UNUSED_33
            | LEFT_ENCODER_COUNTS
            | RIGHT_ENCODER_COUNTS
            | LIGHT_BUMP_LEFT_SIGNAL
            | LIGHT_BUMP_FRONT_LEFT_SIGNAL
            | LIGHT_BUMP_CENTER_LEFT_SIGNAL
            | LIGHT_BUMP_CENTER_RIGHT_SIGNAL
            | LIGHT_BUMP_FRONT_RIGHT_SIGNAL
            | LIGHT_BUMP_RIGHT_SIGNAL => SensorReading::U16(BigEndian::read_u16(payload)),
            _ => SensorReading::Raw(Bytes::copy_from_slice(payload)),
        };
        Ok(reading)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            SensorReading::Bool(b) => Some(b as i32),
            SensorReading::Bits(v) | SensorReading::U8(v) => Some(v as i32),
            SensorReading::I8(v) => Some(v as i32),
            SensorReading::U16(v) => Some(v as i32),
            SensorReading::I16(v) => Some(v as i32),
            SensorReading::ChargingState(s) => Some(u8::from(s) as i32),
            SensorReading::Mode(m) => Some(u8::from(m) as i32),
            SensorReading::Raw(_) => None,
        }
    }
}

/// Splits a group payload into its member packets and decodes each one.
/// Single packets decode to a one-element list.
pub fn decode_group(id: u8, payload: &[u8]) -> Result<Vec<(u8, SensorReading)>, OiError> {
    let Some(members) = sensor::group_members(id) else {
        return Ok(vec![(id, SensorReading::decode(id, payload)?)]);
    };

    let expected = sensor::lookup(id)? as usize;
    if payload.len() != expected {
        return Err(OiError::out_of_range(
            "payload length",
            payload.len() as i32,
            expected as i32,
            expected as i32,
        ));
    }

    let mut offset = 0;
    let mut readings = Vec::new();
    for member in members {
        let len = sensor::lookup(member)? as usize;
        readings.push((member, SensorReading::decode(member, &payload[offset..offset + len])?));
        offset += len;
    }
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_signed_big_endian() {
        assert_eq!(SensorReading::decode(DISTANCE, &[0xFF, 0x38]).unwrap(), SensorReading::I16(-200));
        assert_eq!(SensorReading::decode(ANGLE, &[0x00, 0x5A]).unwrap(), SensorReading::I16(90));
        assert_eq!(SensorReading::decode(TEMPERATURE, &[0xF6]).unwrap(), SensorReading::I8(-10));
    }

    #[test]
    fn decodes_unsigned_and_flags() {
        assert_eq!(SensorReading::decode(VOLTAGE, &[0x3A, 0x98]).unwrap(), SensorReading::U16(15000));
        assert_eq!(SensorReading::decode(CLIFF_FRONT_LEFT_SIGNAL, &[2, 25]).unwrap(), SensorReading::U16(537));
        assert_eq!(SensorReading::decode(VIRTUAL_WALL, &[1]).unwrap(), SensorReading::Bool(true));
        assert_eq!(SensorReading::decode(BUMPS_WHEEL_DROPS, &[3]).unwrap(), SensorReading::Bits(3));
    }

    #[test]
    fn decodes_enums() {
        assert_eq!(SensorReading::decode(OI_MODE, &[2]).unwrap(), SensorReading::Mode(Mode::Safe));
        assert_eq!(
            SensorReading::decode(CHARGING_STATE, &[3]).unwrap(),
            SensorReading::ChargingState(ChargingState::Trickle)
        );
        assert!(SensorReading::decode(OI_MODE, &[9]).is_err());
        assert!(SensorReading::decode(CHARGING_STATE, &[6]).is_err());
    }

    #[test]
    fn rejects_wrong_length_and_unknown_id() {
        assert!(SensorReading::decode(DISTANCE, &[1]).is_err());
        assert!(matches!(SensorReading::decode(99, &[1]), Err(OiError::UnknownSensorId(99))));
    }

    #[test]
    fn groups_decode_raw_or_split() {
        let payload = [0u8; 6];
        assert!(matches!(SensorReading::decode(GROUP_2, &payload).unwrap(), SensorReading::Raw(_)));

        let payload = [5, 0, 0x00, 0x0A, 0xFF, 0xF6];
        let members = decode_group(GROUP_2, &payload).unwrap();
        assert_eq!(
            members,
            vec![
                (IR_OMNI, SensorReading::U8(5)),
                (BUTTONS, SensorReading::Bits(0)),
                (DISTANCE, SensorReading::I16(10)),
                (ANGLE, SensorReading::I16(-10)),
            ]
        );
        assert_eq!(decode_group(WALL, &[1]).unwrap(), vec![(WALL, SensorReading::Bool(true))]);
        assert!(decode_group(GROUP_2, &[0; 5]).is_err());
    }

    #[test]
    fn as_i32_widens() {
        assert_eq!(SensorReading::I16(-5).as_i32(), Some(-5));
        assert_eq!(SensorReading::Mode(Mode::Full).as_i32(), Some(3));
        assert_eq!(SensorReading::Raw(Bytes::new()).as_i32(), None);
    }
}
