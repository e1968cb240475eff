// src/device.rs

use crate::command::{Command, Motors, Radius};
use crate::config::DriverConfig;
use crate::constants::{PAUSE_DRAIN_LIMIT, PAUSE_DRAIN_QUIET};
use crate::error::OiError;
use crate::mode::Mode;
use crate::reading::SensorReading;
use crate::sensor::{self, OI_MODE};
use crate::stream::{self, FrameLayout, StreamSession};
use crate::transport::{Transport, drain_input, read_payload, write_command};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A connection to a Roomba speaking the Open Interface.
///
/// Every operation writes its command while holding the transport lock, and
/// queries keep the lock until the full response has been read, so no other
/// bytes can interleave. While a [`StreamSession`] is running all commands
/// except [`Roomba::pause_stream`] fail with [`OiError::StreamActive`].
pub struct Roomba<T> {
    transport: Arc<Mutex<T>>,
    config: DriverConfig,
    mode: Mode,
    /// Pause requested while no session was running.
    pending_pause: AtomicBool,
    /// Pause token of the most recent session.
    session_pause: Option<Arc<AtomicBool>>,
    streaming: Arc<AtomicBool>,
}

impl<T: Transport> Roomba<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DriverConfig::default())
    }

    pub fn with_config(transport: T, config: DriverConfig) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            config,
            mode: Mode::Off,
            pending_pause: AtomicBool::new(false),
            session_pause: None,
            streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Mode declared by the last mode command. See [`Roomba::query_mode`] for
    /// what the device reports.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    fn ensure_idle(&self) -> Result<(), OiError> {
        if self.is_streaming() {
            Err(OiError::StreamActive)
        } else {
            Ok(())
        }
    }

    /// Writes a prebuilt command and applies its mode transition.
    pub async fn send(&mut self, command: Command) -> Result<(), OiError> {
        self.ensure_idle()?;
        {
            let mut io = self.transport.lock().await;
            write_command(&mut *io, &command, self.config.read_timeout).await?;
        }
        let next = self.mode.after(command.opcode());
        if next != self.mode {
            info!(from = %self.mode, to = %next, "OI mode changed");
            self.mode = next;
        }
        Ok(())
    }

    // --- Mode controller ---

    pub async fn start(&mut self) -> Result<(), OiError> {
        self.send(Command::start()).await
    }

    /// Same as [`Roomba::start`].
    pub async fn passive(&mut self) -> Result<(), OiError> {
        self.start().await
    }

    pub async fn safe(&mut self) -> Result<(), OiError> {
        self.send(Command::safe()).await
    }

    pub async fn full(&mut self) -> Result<(), OiError> {
        self.send(Command::full()).await
    }

    pub async fn stop(&mut self) -> Result<(), OiError> {
        self.send(Command::stop()).await
    }

    pub async fn reset(&mut self) -> Result<(), OiError> {
        self.send(Command::reset()).await
    }

    /// Start followed by Control. If Start fails, Control is not sent.
    pub async fn control(&mut self) -> Result<(), OiError> {
        self.start().await?;
        self.send(Command::control()).await
    }

    pub async fn clean(&mut self) -> Result<(), OiError> {
        self.send(Command::clean()).await
    }

    pub async fn spot(&mut self) -> Result<(), OiError> {
        self.send(Command::spot()).await
    }

    pub async fn max(&mut self) -> Result<(), OiError> {
        self.send(Command::max()).await
    }

    pub async fn seek_dock(&mut self) -> Result<(), OiError> {
        self.send(Command::seek_dock()).await
    }

    pub async fn power(&mut self) -> Result<(), OiError> {
        self.send(Command::power()).await
    }

    pub async fn baud(&mut self, code: u8) -> Result<(), OiError> {
        self.send(Command::baud(code)?).await
    }

    pub async fn set_day_time(&mut self, day: u8, hour: u8, minute: u8) -> Result<(), OiError> {
        self.send(Command::set_day_time(day, hour, minute)?).await
    }

    pub async fn schedule(&mut self, days: &[Option<(u8, u8)>; 7]) -> Result<(), OiError> {
        self.send(Command::schedule(days)?).await
    }

    // --- Actuators ---

    pub async fn drive(&mut self, velocity: i16, radius: i16) -> Result<(), OiError> {
        self.send(Command::drive(velocity, radius)?).await
    }

    pub async fn drive_radius(&mut self, velocity: i16, radius: Radius) -> Result<(), OiError> {
        self.send(Command::drive_radius(velocity, radius)?).await
    }

    pub async fn direct_drive(&mut self, right: i16, left: i16) -> Result<(), OiError> {
        self.send(Command::direct_drive(right, left)?).await
    }

    pub async fn drive_pwm(&mut self, right: i16, left: i16) -> Result<(), OiError> {
        self.send(Command::drive_pwm(right, left)?).await
    }

    pub async fn motors(&mut self, motors: Motors) -> Result<(), OiError> {
        self.send(Command::motors(motors)).await
    }

    pub async fn pwm_motors(&mut self, main_brush: i8, side_brush: i8, vacuum: u8) -> Result<(), OiError> {
        self.send(Command::pwm_motors(main_brush, side_brush, vacuum)?).await
    }

    pub async fn leds(
        &mut self,
        check_robot: bool,
        dock: bool,
        spot: bool,
        debris: bool,
        color: u8,
        intensity: u8,
    ) -> Result<(), OiError> {
        self.send(Command::leds(check_robot, dock, spot, debris, color, intensity))
            .await
    }

    pub async fn digit_leds_ascii(&mut self, digits: [u8; 4]) -> Result<(), OiError> {
        self.send(Command::digit_leds_ascii(digits)?).await
    }

    pub async fn buttons(&mut self, bits: u8) -> Result<(), OiError> {
        self.send(Command::buttons(bits)).await
    }

    pub async fn song(&mut self, number: u8, notes: &[(u8, u8)]) -> Result<(), OiError> {
        self.send(Command::song(number, notes)?).await
    }

    pub async fn play(&mut self, number: u8) -> Result<(), OiError> {
        self.send(Command::play(number)?).await
    }

    // --- Query executor ---

    /// Reads the raw payload of packet `id`.
    pub async fn sensors(&mut self, id: u8) -> Result<Bytes, OiError> {
        let mut payloads = self.query(Command::sensors(id)?, &[id]).await?;
        Ok(payloads.pop().unwrap_or_default())
    }

    /// Reads several packets in one exchange. Payloads come back in request
    /// order.
    pub async fn query_list(&mut self, ids: &[u8]) -> Result<Vec<Bytes>, OiError> {
        self.query(Command::query_list(ids)?, ids).await
    }

    /// Reads packet `id` and decodes it.
    pub async fn sensor_reading(&mut self, id: u8) -> Result<SensorReading, OiError> {
        let payload = self.sensors(id).await?;
        SensorReading::decode(id, &payload)
    }

    /// Mode reported by the device (packet 35). The declared mode is not
    /// changed.
    pub async fn query_mode(&mut self) -> Result<Mode, OiError> {
        match self.sensor_reading(OI_MODE).await? {
            SensorReading::Mode(mode) => {
                debug!(declared = %self.mode, reported = %mode, "OI mode queried");
                Ok(mode)
            }
            other => Err(OiError::out_of_range(
                "oi mode",
                other.as_i32().unwrap_or(-1),
                0,
                3,
            )),
        }
    }

    async fn query(&mut self, command: Command, ids: &[u8]) -> Result<Vec<Bytes>, OiError> {
        self.ensure_idle()?;
        let mut io = self.transport.lock().await;
        write_command(&mut *io, &command, self.config.read_timeout).await?;

        let mut payloads = Vec::with_capacity(ids.len());
        for &id in ids {
            let len = sensor::lookup(id)? as usize;
            let payload = match read_payload(&mut *io, id, len, self.config.read_timeout).await {
                Ok(payload) => payload,
                Err(err @ (OiError::Timeout(_) | OiError::IncompletePacket { .. })) => {
                    // A late reply must not be read as the answer to the next query.
                    let discarded = drain_input(&mut *io, PAUSE_DRAIN_QUIET, PAUSE_DRAIN_LIMIT).await;
                    warn!(id, error = %err, discarded, "Sensor query failed, input drained");
                    return Err(err);
                }
                Err(err) => return Err(err),
            };
            debug!(id, bytes = hex::encode(&payload), "Sensor packet");
            payloads.push(payload);
        }
        Ok(payloads)
    }

    // --- Streaming ---

    /// Starts streaming `ids` and returns the session receiving the frames.
    ///
    /// A pause requested before this call takes effect on the worker's first
    /// iteration.
    pub async fn stream(&mut self, ids: &[u8]) -> Result<StreamSession, OiError> {
        let command = Command::stream(ids)?;
        let layout = FrameLayout::new(ids)?;
        self.ensure_idle()?;
        {
            let mut io = self.transport.lock().await;
            write_command(&mut *io, &command, self.config.read_timeout).await?;
        }
        let session = stream::spawn_worker(
            self.transport.clone(),
            layout,
            &self.config,
            self.pending_pause.swap(false, Ordering::AcqRel),
            self.streaming.clone(),
        );
        self.session_pause = Some(session.pause_token());
        Ok(session)
    }

    /// Requests a pause. The stream worker sends the pause command at its next
    /// iteration and then closes the session. Repeated requests before that
    /// collapse into one. With no session running the request is held for
    /// the next [`Roomba::stream`].
    pub fn pause_stream(&self) {
        match &self.session_pause {
            Some(token) if self.is_streaming() => token.store(true, Ordering::Release),
            _ => self.pending_pause.store(true, Ordering::Release),
        }
    }
}
