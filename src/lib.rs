pub mod command;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod mode;
pub mod opcode;
pub mod reading;
pub mod sensor;
pub mod sim;
pub mod stream;
pub mod transport;

// Re-export the driver types most callers need
pub use command::{Command, Motors, Radius};
pub use config::{ChecksumMode, DriverConfig};
pub use device::Roomba;
pub use error::{OiError, ProtocolError};
pub use mode::Mode;
pub use opcode::OpCode;
pub use reading::{ChargingState, SensorReading};
pub use stream::{SensorPacket, StreamFrame, StreamSession};
pub use transport::Transport;
