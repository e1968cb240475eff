use crate::opcode::OpCode;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Open Interface operating mode, as reported by sensor packet 35.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, Display, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Off = 0,
    Passive = 1,
    Safe = 2,
    Full = 3,
}

impl Mode {
    /// Mode the driver declares after `opcode` has been written.
    ///
    /// The device may demote itself (cliff, wheel drop, charger) without
    /// telling the host, so this is the driver's intent, not the device state.
    pub fn after(self, opcode: OpCode) -> Mode {
        match opcode {
            OpCode::Start => Mode::Passive,
            OpCode::Safe | OpCode::Control => Mode::Safe,
            OpCode::Full => Mode::Full,
            OpCode::Stop | OpCode::Reset => Mode::Off,
            OpCode::Clean | OpCode::Spot | OpCode::Max | OpCode::SeekDock | OpCode::Power => Mode::Passive,
            _ => self,
        }
    }

    /// Whether the device accepts actuator commands in this mode.
    pub fn accepts_actuators(self) -> bool {
        matches!(self, Mode::Safe | Mode::Full)
    }
}
