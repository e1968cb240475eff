use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// Open Interface command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Display)]
#[repr(u8)]
pub enum OpCode {
    Reset = 7,

    // Getting started
    Start = 128,
    Baud = 129,
    Control = 130,

    // Modes
    Safe = 131,
    Full = 132,
    Power = 133,

    // Cleaning
    Spot = 134,
    Clean = 135,
    Max = 136,
    SeekDock = 143,
    Schedule = 167,
    SetDayTime = 168,

    // Actuators
    Drive = 137,
    Motors = 138,
    #[strum(serialize = "LEDs")]
    Leds = 139,
    Song = 140,
    Play = 141,
    PwmMotors = 144,
    DirectDrive = 145,
    DrivePwm = 146,
    DigitLedsAscii = 164,
    Buttons = 165,

    // Input
    Sensors = 142,
    Stream = 148,
    QueryList = 149,
    PauseResumeStream = 150,

    Stop = 173,
}

impl OpCode {
    /// Fixed argument length, or `None` when the length is carried in the
    /// first argument byte (Query List, Stream, Song).
    pub fn argument_len(self) -> Option<usize> {
        match self {
            OpCode::Reset
            | OpCode::Start
            | OpCode::Control
            | OpCode::Safe
            | OpCode::Full
            | OpCode::Power
            | OpCode::Spot
            | OpCode::Clean
            | OpCode::Max
            | OpCode::SeekDock
            | OpCode::Stop => Some(0),
            OpCode::Baud
            | OpCode::Motors
            | OpCode::Play
            | OpCode::Buttons
            | OpCode::Sensors
            | OpCode::PauseResumeStream => Some(1),
            OpCode::Leds | OpCode::PwmMotors | OpCode::SetDayTime => Some(3),
            OpCode::Drive | OpCode::DirectDrive | OpCode::DrivePwm | OpCode::DigitLedsAscii => Some(4),
            OpCode::Schedule => Some(15),
            OpCode::Song | OpCode::Stream | OpCode::QueryList => None,
        }
    }
}
