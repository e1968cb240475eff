//! In-process Open Interface simulator.
//!
//! [`Simulator::spawn`] returns a handle and the driver-side end of an
//! in-memory duplex channel. The simulator parses every opcode the codec can
//! produce, answers sensor queries from a value table and emits stream frames
//! until it is paused. It is enough to exercise the driver end to end without
//! hardware; it does not model motion, bumps or battery drain.

use crate::config::ChecksumMode;
use crate::constants::STREAM_PERIOD;
use crate::mode::Mode;
use crate::opcode::OpCode;
use crate::sensor::{self, *};
use crate::stream::encode_frame;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 4096;

/// Simulator settings.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub checksum: ChecksumMode,
    /// Interval between stream frames.
    pub period: Duration,
    /// Sensor payloads by packet id. Missing single packets read as zeros.
    pub values: HashMap<u8, Bytes>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            checksum: ChecksumMode::default(),
            period: STREAM_PERIOD,
            values: default_values(),
        }
    }
}

/// Values a freshly spawned simulator reports.
pub fn default_values() -> HashMap<u8, Bytes> {
    [
        (BUMPS_WHEEL_DROPS, Bytes::from_static(&[3])),
        (WALL, Bytes::from_static(&[35])),
        (CLIFF_RIGHT, Bytes::from_static(&[42])),
        (VIRTUAL_WALL, Bytes::from_static(&[5])),
        (DISTANCE, Bytes::from_static(&[10, 20])),
        (BATTERY_CHARGE, Bytes::copy_from_slice(&1000u16.to_be_bytes())),
        (BATTERY_CAPACITY, Bytes::copy_from_slice(&1500u16.to_be_bytes())),
        (CLIFF_FRONT_LEFT_SIGNAL, Bytes::from_static(&[2, 25])),
    ]
    .into_iter()
    .collect()
}

#[derive(Debug)]
struct SimState {
    received: Vec<u8>,
    values: HashMap<u8, Bytes>,
    mode: Mode,
    stream: Option<Vec<u8>>,
    paused: bool,
}

impl SimState {
    /// Payload of `id`; groups concatenate their members.
    fn payload(&self, id: u8) -> Option<Bytes> {
        if let Some(members) = sensor::group_members(id) {
            let mut out = BytesMut::new();
            for member in members {
                out.extend_from_slice(&self.payload(member)?);
            }
            return Some(out.freeze());
        }
        let len = sensor::lookup(id).ok()? as usize;
        Some(match self.values.get(&id) {
            Some(value) if value.len() == len => value.clone(),
            _ => Bytes::from(vec![0u8; len]),
        })
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.values.insert(OI_MODE, Bytes::copy_from_slice(&[u8::from(mode)]));
    }
}

type Shared = Arc<Mutex<SimState>>;
type Output = Arc<tokio::sync::Mutex<WriteHalf<DuplexStream>>>;

fn lock(state: &Shared) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running simulator. Dropping it stops the simulator.
pub struct Simulator {
    state: Shared,
    task: JoinHandle<()>,
}

impl Simulator {
    /// Starts a simulator and returns it with the channel end the driver
    /// should use as its transport.
    pub fn spawn(config: SimConfig) -> (Self, DuplexStream) {
        let (driver_end, device_end) = tokio::io::duplex(CHANNEL_CAPACITY);
        let mut state = SimState {
            received: Vec::new(),
            values: config.values.clone(),
            mode: Mode::Off,
            stream: None,
            paused: false,
        };
        state.set_mode(Mode::Off);
        let state = Arc::new(Mutex::new(state));

        let task = tokio::spawn(serve(device_end, state.clone(), config));
        (Self { state, task }, driver_end)
    }

    /// Every byte the simulator has read so far.
    pub fn received(&self) -> Vec<u8> {
        lock(&self.state).received.clone()
    }

    pub fn mode(&self) -> Mode {
        lock(&self.state).mode
    }

    pub fn value(&self, id: u8) -> Option<Bytes> {
        lock(&self.state).payload(id)
    }

    pub fn set_value(&self, id: u8, value: impl Into<Bytes>) {
        lock(&self.state).values.insert(id, value.into());
    }

    /// Whether frames are currently being emitted.
    pub fn is_streaming(&self) -> bool {
        let state = lock(&self.state);
        state.stream.is_some() && !state.paused
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(device: DuplexStream, state: Shared, config: SimConfig) {
    let (mut input, output) = tokio::io::split(device);
    let output: Output = Arc::new(tokio::sync::Mutex::new(output));
    let mut emitter: Option<JoinHandle<()>> = None;

    loop {
        let (opcode, args) = match read_command(&mut input, &state).await {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                debug!(error = %err, "Simulator input closed");
                break;
            }
        };

        let reply = {
            let mut st = lock(&state);
            let reply = execute(&mut st, opcode, &args);
            let next = st.mode.after(opcode);
            if next != st.mode {
                info!(from = %st.mode, to = %next, "Simulated OI mode changed");
                st.set_mode(next);
            }
            reply
        };

        match opcode {
            OpCode::Stream => {
                if let Some(task) = emitter.take() {
                    task.abort();
                }
                if lock(&state).stream.is_some() {
                    emitter = Some(tokio::spawn(emit_frames(
                        output.clone(),
                        state.clone(),
                        config.checksum,
                        config.period,
                    )));
                }
            }
            OpCode::Stop | OpCode::Reset => {
                if let Some(task) = emitter.take() {
                    task.abort();
                }
            }
            _ => {}
        }

        if let Some(bytes) = reply {
            debug!(bytes = hex::encode(&bytes), "Simulator reply");
            if output.lock().await.write_all(&bytes).await.is_err() {
                break;
            }
        }
    }

    if let Some(task) = emitter {
        task.abort();
    }
}

/// Reads one opcode and its arguments. `Ok(None)` for an unknown opcode.
async fn read_command(
    input: &mut ReadHalf<DuplexStream>,
    state: &Shared,
) -> io::Result<Option<(OpCode, Vec<u8>)>> {
    let byte = input.read_u8().await?;
    let Ok(opcode) = OpCode::try_from(byte) else {
        warn!(opcode = byte, "Simulator ignoring unknown opcode");
        lock(state).received.push(byte);
        return Ok(None);
    };

    let mut args = Vec::new();
    match opcode.argument_len() {
        Some(n) => read_into(input, &mut args, n).await?,
        None if opcode == OpCode::Song => {
            read_into(input, &mut args, 2).await?;
            let notes = args[1] as usize;
            read_into(input, &mut args, 2 * notes).await?;
        }
        None => {
            read_into(input, &mut args, 1).await?;
            let count = args[0] as usize;
            read_into(input, &mut args, count).await?;
        }
    }

    let mut st = lock(state);
    st.received.push(byte);
    st.received.extend_from_slice(&args);
    debug!(command = %opcode, args = hex::encode(&args), "Simulator received");
    Ok(Some((opcode, args)))
}

async fn read_into(input: &mut ReadHalf<DuplexStream>, args: &mut Vec<u8>, n: usize) -> io::Result<()> {
    let start = args.len();
    args.resize(start + n, 0);
    input.read_exact(&mut args[start..]).await?;
    Ok(())
}

/// Applies a command to the simulated state and returns any response bytes.
fn execute(state: &mut SimState, opcode: OpCode, args: &[u8]) -> Option<Bytes> {
    match opcode {
        OpCode::Sensors => {
            let reply = state.payload(args[0]);
            if reply.is_none() {
                warn!(id = args[0], "Simulator has no packet with this id");
            }
            reply
        }
        OpCode::QueryList => {
            let mut out = BytesMut::new();
            for &id in &args[1..] {
                match state.payload(id) {
                    Some(payload) => out.extend_from_slice(&payload),
                    None => warn!(id, "Simulator has no packet with this id"),
                }
            }
            Some(out.freeze())
        }
        OpCode::Stream => {
            let ids = &args[1..];
            state.stream = (!ids.is_empty()).then(|| ids.to_vec());
            state.paused = false;
            None
        }
        OpCode::PauseResumeStream => {
            state.paused = args[0] == 0;
            None
        }
        OpCode::Drive => {
            state.values.insert(REQUESTED_VELOCITY, Bytes::copy_from_slice(&args[0..2]));
            state.values.insert(REQUESTED_RADIUS, Bytes::copy_from_slice(&args[2..4]));
            None
        }
        OpCode::DirectDrive => {
            state.values.insert(REQUESTED_RIGHT_VELOCITY, Bytes::copy_from_slice(&args[0..2]));
            state.values.insert(REQUESTED_LEFT_VELOCITY, Bytes::copy_from_slice(&args[2..4]));
            None
        }
        OpCode::Stop | OpCode::Reset => {
            state.stream = None;
            None
        }
        _ => None,
    }
}

async fn emit_frames(output: Output, state: Shared, checksum: ChecksumMode, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let frame = {
            let st = lock(&state);
            let Some(ids) = st.stream.as_ref() else { break };
            if st.paused {
                continue;
            }
            let payloads: Vec<(u8, Bytes)> = ids
                .iter()
                .map(|&id| (id, st.payload(id).unwrap_or_default()))
                .collect();
            let packets: Vec<(u8, &[u8])> = payloads.iter().map(|(id, data)| (*id, &data[..])).collect();
            match encode_frame(&packets, checksum) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "Simulator cannot frame the requested packets");
                    break;
                }
            }
        };
        if output.lock().await.write_all(&frame).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_concatenate_member_values() {
        let mut state = SimState {
            received: Vec::new(),
            values: default_values(),
            mode: Mode::Off,
            stream: None,
            paused: false,
        };
        state.set_mode(Mode::Safe);

        let group = state.payload(GROUP_1).unwrap();
        assert_eq!(group.len(), 10);
        assert_eq!(&group[..2], &[3, 35]);
        assert_eq!(&state.payload(OI_MODE).unwrap()[..], &[2]);
        assert_eq!(&state.payload(ANGLE).unwrap()[..], &[0, 0]);
        assert_eq!(state.payload(99), None);
    }

    #[test]
    fn drive_is_recorded() {
        let mut state = SimState {
            received: Vec::new(),
            values: HashMap::new(),
            mode: Mode::Safe,
            stream: None,
            paused: false,
        };
        execute(&mut state, OpCode::Drive, &[0xFF, 0x38, 0x01, 0xF4]);
        assert_eq!(&state.payload(REQUESTED_VELOCITY).unwrap()[..], &[0xFF, 0x38]);
        assert_eq!(&state.payload(REQUESTED_RADIUS).unwrap()[..], &[0x01, 0xF4]);
    }
}
