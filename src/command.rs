//! # Open Interface command codec
//!
//! Builds the byte sequence for every command the driver can send. Each
//! constructor validates its arguments first and returns
//! [`OiError::InvalidArgument`] without producing any bytes when a value is out
//! of range, so a rejected command can never be partially written.
//!
//! Multi-byte arguments are packed as big-endian two's complement, which is
//! what `BufMut::put_i16` emits.

use crate::constants::{
    MAX_BAUD_CODE, MAX_BRUSH_PWM, MAX_DRIVE_PWM, MAX_FRAME_BODY, MAX_RADIUS_MM, MAX_SONG_NOTES,
    MAX_SONG_NUMBER, MAX_VELOCITY_MM_S, RADIUS_STRAIGHT, RADIUS_STRAIGHT_ALT, RADIUS_TURN_CLOCKWISE,
    RADIUS_TURN_COUNTER_CLOCKWISE, STREAM_PAUSE, STREAM_RESUME,
};
use crate::error::OiError;
use crate::opcode::OpCode;
use crate::sensor;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// An encoded command: opcode plus its argument bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: OpCode,
    payload: Bytes,
}

/// Turning radius for the Drive command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radius {
    Straight,
    TurnInPlaceClockwise,
    TurnInPlaceCounterClockwise,
    Millimeters(i16),
}

impl Radius {
    fn to_wire(self) -> Result<i16, OiError> {
        match self {
            Radius::Straight => Ok(RADIUS_STRAIGHT),
            Radius::TurnInPlaceClockwise => Ok(RADIUS_TURN_CLOCKWISE),
            Radius::TurnInPlaceCounterClockwise => Ok(RADIUS_TURN_COUNTER_CLOCKWISE),
            Radius::Millimeters(mm) => {
                check_range("radius", mm as i32, -(MAX_RADIUS_MM as i32), MAX_RADIUS_MM as i32)?;
                Ok(mm)
            }
        }
    }
}

impl From<i16> for Radius {
    fn from(raw: i16) -> Self {
        match raw {
            RADIUS_STRAIGHT | RADIUS_STRAIGHT_ALT => Radius::Straight,
            mm => Radius::Millimeters(mm),
        }
    }
}

/// Cleaning motor switches for the Motors command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Motors {
    pub side_brush: bool,
    pub vacuum: bool,
    pub main_brush: bool,
    /// Spin the side brush clockwise instead of counter-clockwise.
    pub side_brush_clockwise: bool,
    /// Spin the main brush outward instead of inward.
    pub main_brush_outward: bool,
}

impl Motors {
    pub fn bits(&self) -> u8 {
        pack_bits(&[
            self.main_brush_outward,
            self.side_brush_clockwise,
            self.main_brush,
            self.vacuum,
            self.side_brush,
        ])
    }
}

/// Packs flags most-significant first into the low bits of a byte.
fn pack_bits(flags: &[bool]) -> u8 {
    flags.iter().fold(0u8, |acc, &flag| (acc << 1) | u8::from(flag))
}

fn check_range(name: &'static str, value: i32, min: i32, max: i32) -> Result<(), OiError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(OiError::out_of_range(name, value, min, max))
    }
}

fn check_velocity(name: &'static str, value: i16) -> Result<(), OiError> {
    check_range(name, value as i32, -(MAX_VELOCITY_MM_S as i32), MAX_VELOCITY_MM_S as i32)
}

/// Validates a packet id list and returns its count byte.
fn check_packet_list(ids: &[u8]) -> Result<u8, OiError> {
    sensor::validate(ids)?;
    u8::try_from(ids.len()).map_err(|_| OiError::out_of_range("packet count", ids.len() as i32, 0, u8::MAX as i32))
}

impl Command {
    fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    fn bare(opcode: OpCode) -> Self {
        Self::new(opcode, Bytes::new())
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Wire bytes: opcode followed by the payload.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(1 + self.payload.len());
        out.put_u8(self.opcode.into());
        out.extend_from_slice(&self.payload);
        out.freeze()
    }

    // --- Getting started and modes ---

    pub fn start() -> Self {
        Self::bare(OpCode::Start)
    }

    /// Baud rate code 0 (300 baud) through 11 (115200 baud).
    pub fn baud(code: u8) -> Result<Self, OiError> {
        check_range("baud code", code as i32, 0, MAX_BAUD_CODE as i32)?;
        Ok(Self::new(OpCode::Baud, vec![code]))
    }

    pub fn control() -> Self {
        Self::bare(OpCode::Control)
    }

    pub fn safe() -> Self {
        Self::bare(OpCode::Safe)
    }

    pub fn full() -> Self {
        Self::bare(OpCode::Full)
    }

    pub fn power() -> Self {
        Self::bare(OpCode::Power)
    }

    pub fn stop() -> Self {
        Self::bare(OpCode::Stop)
    }

    pub fn reset() -> Self {
        Self::bare(OpCode::Reset)
    }

    // --- Cleaning ---

    pub fn clean() -> Self {
        Self::bare(OpCode::Clean)
    }

    pub fn spot() -> Self {
        Self::bare(OpCode::Spot)
    }

    pub fn max() -> Self {
        Self::bare(OpCode::Max)
    }

    pub fn seek_dock() -> Self {
        Self::bare(OpCode::SeekDock)
    }

    /// Cleaning schedule, one optional `(hour, minute)` slot per day starting
    /// with Sunday.
    pub fn schedule(days: &[Option<(u8, u8)>; 7]) -> Result<Self, OiError> {
        let mut day_bits = 0u8;
        let mut times = BytesMut::with_capacity(14);
        for (day, slot) in days.iter().enumerate() {
            let (hour, minute) = slot.unwrap_or((0, 0));
            check_range("hour", hour as i32, 0, 23)?;
            check_range("minute", minute as i32, 0, 59)?;
            if slot.is_some() {
                day_bits |= 1 << day;
            }
            times.put_u8(hour);
            times.put_u8(minute);
        }
        let mut payload = BytesMut::with_capacity(15);
        payload.put_u8(day_bits);
        payload.extend_from_slice(&times);
        Ok(Self::new(OpCode::Schedule, payload.freeze()))
    }

    /// Day 0 is Sunday.
    pub fn set_day_time(day: u8, hour: u8, minute: u8) -> Result<Self, OiError> {
        check_range("day", day as i32, 0, 6)?;
        check_range("hour", hour as i32, 0, 23)?;
        check_range("minute", minute as i32, 0, 59)?;
        Ok(Self::new(OpCode::SetDayTime, vec![day, hour, minute]))
    }

    // --- Actuators ---

    /// Average wheel velocity in mm/s and turning radius in mm.
    ///
    /// The raw straight sentinels 0x8000 and 0x7FFF skip the ±2000 mm bound.
    pub fn drive(velocity: i16, radius: i16) -> Result<Self, OiError> {
        Self::drive_radius(velocity, Radius::from(radius))
    }

    pub fn drive_radius(velocity: i16, radius: Radius) -> Result<Self, OiError> {
        check_velocity("velocity", velocity)?;
        let radius = radius.to_wire()?;
        let mut payload = BytesMut::with_capacity(4);
        payload.put_i16(velocity);
        payload.put_i16(radius);
        Ok(Self::new(OpCode::Drive, payload.freeze()))
    }

    /// Independent wheel velocities in mm/s.
    pub fn direct_drive(right: i16, left: i16) -> Result<Self, OiError> {
        check_velocity("right velocity", right)?;
        check_velocity("left velocity", left)?;
        let mut payload = BytesMut::with_capacity(4);
        payload.put_i16(right);
        payload.put_i16(left);
        Ok(Self::new(OpCode::DirectDrive, payload.freeze()))
    }

    /// Raw wheel PWM duty, -255 to 255 for each wheel.
    pub fn drive_pwm(right: i16, left: i16) -> Result<Self, OiError> {
        let bound = MAX_DRIVE_PWM as i32;
        check_range("right pwm", right as i32, -bound, bound)?;
        check_range("left pwm", left as i32, -bound, bound)?;
        let mut payload = BytesMut::with_capacity(4);
        payload.put_i16(right);
        payload.put_i16(left);
        Ok(Self::new(OpCode::DrivePwm, payload.freeze()))
    }

    pub fn motors(motors: Motors) -> Self {
        Self::new(OpCode::Motors, vec![motors.bits()])
    }

    /// Brush duty -127 to 127, vacuum duty 0 to 127.
    pub fn pwm_motors(main_brush: i8, side_brush: i8, vacuum: u8) -> Result<Self, OiError> {
        let bound = MAX_BRUSH_PWM as i32;
        check_range("main brush pwm", main_brush as i32, -bound, bound)?;
        check_range("side brush pwm", side_brush as i32, -bound, bound)?;
        check_range("vacuum pwm", vacuum as i32, 0, bound)?;
        let mut payload = BytesMut::with_capacity(3);
        payload.put_i8(main_brush);
        payload.put_i8(side_brush);
        payload.put_u8(vacuum);
        Ok(Self::new(OpCode::PwmMotors, payload.freeze()))
    }

    /// Check Robot, Dock, Spot and Debris LEDs plus the Clean/Power LED
    /// color (0 green .. 255 red) and intensity.
    pub fn leds(check_robot: bool, dock: bool, spot: bool, debris: bool, color: u8, intensity: u8) -> Self {
        let bits = pack_bits(&[check_robot, dock, spot, debris]);
        Self::new(OpCode::Leds, vec![bits, color, intensity])
    }

    /// Four printable ASCII characters (32..=126) for the digit display.
    pub fn digit_leds_ascii(digits: [u8; 4]) -> Result<Self, OiError> {
        for digit in digits {
            check_range("digit", digit as i32, 32, 126)?;
        }
        Ok(Self::new(OpCode::DigitLedsAscii, digits.to_vec()))
    }

    /// Pushes buttons by bit: Clean 0, Spot 1, Dock 2, Minute 3, Hour 4,
    /// Day 5, Schedule 6, Clock 7.
    pub fn buttons(bits: u8) -> Self {
        Self::new(OpCode::Buttons, vec![bits])
    }

    /// Stores song `number` as `(note, duration)` pairs.
    pub fn song(number: u8, notes: &[(u8, u8)]) -> Result<Self, OiError> {
        check_range("song number", number as i32, 0, MAX_SONG_NUMBER as i32)?;
        check_range("song length", notes.len() as i32, 1, MAX_SONG_NOTES as i32)?;
        let mut payload = BytesMut::with_capacity(2 + 2 * notes.len());
        payload.put_u8(number);
        payload.put_u8(notes.len() as u8);
        for &(note, duration) in notes {
            payload.put_u8(note);
            payload.put_u8(duration);
        }
        Ok(Self::new(OpCode::Song, payload.freeze()))
    }

    pub fn play(number: u8) -> Result<Self, OiError> {
        check_range("song number", number as i32, 0, MAX_SONG_NUMBER as i32)?;
        Ok(Self::new(OpCode::Play, vec![number]))
    }

    // --- Input ---

    pub fn sensors(id: u8) -> Result<Self, OiError> {
        sensor::validate(&[id])?;
        Ok(Self::new(OpCode::Sensors, vec![id]))
    }

    pub fn query_list(ids: &[u8]) -> Result<Self, OiError> {
        let count = check_packet_list(ids)?;
        Ok(Self::new(OpCode::QueryList, counted(count, ids)))
    }

    /// Starts a stream of `ids`. The whole frame body has to be describable
    /// by the frame's single length byte.
    pub fn stream(ids: &[u8]) -> Result<Self, OiError> {
        let count = check_packet_list(ids)?;
        let body = sensor::payload_len(ids) + ids.len();
        check_range("stream frame body", body as i32, 0, MAX_FRAME_BODY as i32)?;
        Ok(Self::new(OpCode::Stream, counted(count, ids)))
    }

    pub fn pause_resume_stream(resume: bool) -> Self {
        let arg = if resume { STREAM_RESUME } else { STREAM_PAUSE };
        Self::new(OpCode::PauseResumeStream, vec![arg])
    }
}

fn counted(count: u8, ids: &[u8]) -> Bytes {
    let mut payload = BytesMut::with_capacity(1 + ids.len());
    payload.put_u8(count);
    payload.extend_from_slice(ids);
    payload.freeze()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.opcode, u8::from(self.opcode))?;
        if !self.payload.is_empty() {
            write!(f, " {}", hex::encode(&self.payload))?;
        }
        Ok(())
    }
}
