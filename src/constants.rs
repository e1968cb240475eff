// Protocol constants for the iRobot Open Interface

use std::time::Duration;

/// First byte of every stream frame.
pub const FRAME_MARKER: u8 = 0x13;

/// Marker, length byte and checksum byte surrounding the frame body.
pub const FRAME_OVERHEAD: usize = 3;

/// Largest frame body the length byte can describe.
pub const MAX_FRAME_BODY: usize = u8::MAX as usize;

/// Interval at which the device emits stream frames.
pub const STREAM_PERIOD: Duration = Duration::from_millis(15);

/// After a pause or a failed query, input is discarded until the device has
/// been quiet this long.
pub const PAUSE_DRAIN_QUIET: Duration = Duration::from_millis(30);

/// Upper bound on draining.
pub const PAUSE_DRAIN_LIMIT: Duration = Duration::from_millis(250);

/// Default deadline for a single transport read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of a stream session's output channel.
pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// Drive velocity bound in mm/s, applied to both directions.
pub const MAX_VELOCITY_MM_S: i16 = 500;

/// Drive radius bound in mm, applied to both directions.
pub const MAX_RADIUS_MM: i16 = 2000;

/// Wire value of the "drive straight" radius.
pub const RADIUS_STRAIGHT: i16 = i16::MIN;

/// Alternate "drive straight" radius accepted by the device.
pub const RADIUS_STRAIGHT_ALT: i16 = i16::MAX;

pub const RADIUS_TURN_CLOCKWISE: i16 = -1;

pub const RADIUS_TURN_COUNTER_CLOCKWISE: i16 = 1;

/// Bound on each wheel's PWM duty for Drive PWM.
pub const MAX_DRIVE_PWM: i16 = 255;

/// Bound on the main and side brush PWM duty.
pub const MAX_BRUSH_PWM: i8 = 127;

/// Highest baud code accepted by the Baud command.
pub const MAX_BAUD_CODE: u8 = 11;

/// Songs are numbered 0 through 4.
pub const MAX_SONG_NUMBER: u8 = 4;

/// A song holds at most 16 notes.
pub const MAX_SONG_NOTES: usize = 16;

/// Passing this to Pause/Resume Stream pauses the stream.
pub const STREAM_PAUSE: u8 = 0;

/// Passing this to Pause/Resume Stream resumes the stream.
pub const STREAM_RESUME: u8 = 1;
