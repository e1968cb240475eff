//! # Sensor streaming
//!
//! A stream frame on the wire is
//!
//! ```text
//! 0x13 | N | id₁ payload₁ | id₂ payload₂ | ... | checksum
//! ```
//!
//! where `N` counts the id and payload bytes. For a request of ids `p₁..pₖ`
//! every frame is exactly `Σ len(pᵢ) + k + 3` bytes, which is what
//! [`FrameLayout`] precomputes.
//!
//! The worker spawned by [`crate::Roomba::stream`] reads whole frames (across
//! short reads and read deadlines), decodes them and sends each result to a
//! [`StreamSession`]. Decode failures are reported and skipped; the worker only
//! stops on pause, end of input, a hard transport error or when the session
//! is dropped.

use crate::command::Command;
use crate::config::{ChecksumMode, DriverConfig};
use crate::constants::{FRAME_MARKER, FRAME_OVERHEAD, MAX_FRAME_BODY, PAUSE_DRAIN_LIMIT, PAUSE_DRAIN_QUIET};
use crate::error::{OiError, ProtocolError};
use crate::reading::SensorReading;
use crate::sensor;
use crate::transport::{Transport, drain_input, is_transient, read_some, write_command};
use bytes::{BufMut, Bytes, BytesMut};
use futures_lite::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// The packet ids of a stream request and the frame size they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    ids: Vec<u8>,
    frame_len: usize,
}

impl FrameLayout {
    pub fn new(ids: &[u8]) -> Result<Self, OiError> {
        sensor::validate(ids)?;
        let body = sensor::payload_len(ids) + ids.len();
        if body > MAX_FRAME_BODY {
            return Err(OiError::out_of_range(
                "stream frame body",
                body as i32,
                0,
                MAX_FRAME_BODY as i32,
            ));
        }
        Ok(Self {
            ids: ids.to_vec(),
            frame_len: body + FRAME_OVERHEAD,
        })
    }

    pub fn ids(&self) -> &[u8] {
        &self.ids
    }

    /// Total frame size in bytes, marker and checksum included.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Value of the frame's length byte.
    pub fn body_len(&self) -> u8 {
        (self.frame_len - FRAME_OVERHEAD) as u8
    }
}

/// One packet carried in a stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorPacket {
    pub id: u8,
    pub data: Bytes,
}

/// A decoded stream frame. Packets are in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub packets: Vec<SensorPacket>,
}

impl StreamFrame {
    pub fn get(&self, id: u8) -> Option<&Bytes> {
        self.packets.iter().find(|p| p.id == id).map(|p| &p.data)
    }

    pub fn payloads(&self) -> impl Iterator<Item = &Bytes> {
        self.packets.iter().map(|p| &p.data)
    }

    /// Typed values for every packet in the frame.
    pub fn readings(&self) -> Result<Vec<(u8, SensorReading)>, OiError> {
        self.packets
            .iter()
            .map(|p| Ok((p.id, SensorReading::decode(p.id, &p.data)?)))
            .collect()
    }
}

/// Byte sum the checksum rule expects to be zero.
pub fn checksum_sum(frame: &[u8], mode: ChecksumMode) -> u8 {
    let covered = match mode {
        ChecksumMode::ExcludeMarker => frame.get(1..).unwrap_or_default(),
        ChecksumMode::IncludeMarker => frame,
    };
    covered.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Builds a complete frame around `packets`.
pub fn encode_frame(packets: &[(u8, &[u8])], mode: ChecksumMode) -> Result<Bytes, OiError> {
    let body: usize = packets.iter().map(|(_, data)| 1 + data.len()).sum();
    if body > MAX_FRAME_BODY {
        return Err(OiError::out_of_range("stream frame body", body as i32, 0, MAX_FRAME_BODY as i32));
    }

    let mut frame = BytesMut::with_capacity(body + FRAME_OVERHEAD);
    frame.put_u8(FRAME_MARKER);
    frame.put_u8(body as u8);
    for (id, data) in packets {
        frame.put_u8(*id);
        frame.extend_from_slice(data);
    }
    let sum = checksum_sum(&frame, mode);
    frame.put_u8(0u8.wrapping_sub(sum));
    Ok(frame.freeze())
}

/// Decodes one complete frame of `layout.frame_len()` bytes.
///
/// The checks run in a fixed order: marker, length byte, checksum, then the
/// packet walk against the registry and the requested ids.
pub fn decode_frame(frame: &[u8], layout: &FrameLayout, mode: ChecksumMode) -> Result<StreamFrame, ProtocolError> {
    debug_assert_eq!(frame.len(), layout.frame_len());

    if frame[0] != FRAME_MARKER {
        return Err(ProtocolError::FrameSync { found: frame[0] });
    }
    if frame[1] != layout.body_len() {
        return Err(ProtocolError::LengthMismatch {
            expected: layout.body_len(),
            found: frame[1],
        });
    }
    let sum = checksum_sum(frame, mode);
    if sum != 0 {
        return Err(ProtocolError::Checksum { sum });
    }

    let end = frame.len() - 1;
    let mut offset = 2;
    let mut packets = Vec::with_capacity(layout.ids.len());
    while offset < end {
        let id = frame[offset];
        let len = sensor::lookup(id).map_err(|_| ProtocolError::UnknownPacketInFrame(id))? as usize;
        if offset + 1 + len > end {
            return Err(ProtocolError::PacketOverrun { id, offset });
        }
        let index = packets.len();
        match layout.ids.get(index) {
            Some(&expected) if expected == id => {}
            Some(&expected) => return Err(ProtocolError::UnexpectedPacket { index, expected, found: id }),
            None => {
                return Err(ProtocolError::PacketCount {
                    expected: layout.ids.len(),
                    found: index + 1,
                });
            }
        }
        packets.push(SensorPacket {
            id,
            data: Bytes::copy_from_slice(&frame[offset + 1..offset + 1 + len]),
        });
        offset += 1 + len;
    }

    if packets.len() != layout.ids.len() {
        return Err(ProtocolError::PacketCount {
            expected: layout.ids.len(),
            found: packets.len(),
        });
    }
    Ok(StreamFrame { packets })
}

/// Frame-sized buffer that keeps its fill offset between reads.
#[derive(Debug)]
struct FrameBuffer {
    buf: Vec<u8>,
    filled: usize,
}

impl FrameBuffer {
    fn new(len: usize) -> Self {
        Self { buf: vec![0; len], filled: 0 }
    }

    fn is_full(&self) -> bool {
        self.filled == self.buf.len()
    }

    fn unfilled(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    fn advance(&mut self, n: usize) {
        self.filled += n;
    }

    fn frame(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    fn clear(&mut self) {
        self.filled = 0;
    }

    /// Moves the next marker after position 0 to the front and keeps what
    /// follows it. Without another marker the buffer is emptied.
    fn resync(&mut self) {
        match self.buf[1..self.filled].iter().position(|&b| b == FRAME_MARKER) {
            Some(pos) => {
                let start = pos + 1;
                self.buf.copy_within(start..self.filled, 0);
                self.filled -= start;
            }
            None => self.filled = 0,
        }
    }
}

enum Fill {
    Complete,
    Retry,
    Closed,
    Failed(OiError),
}

#[derive(Debug)]
enum Exit {
    Paused,
    ConsumerGone,
    EndOfInput,
    TransportFailed,
}

type FrameResult = Result<StreamFrame, OiError>;

struct StreamWorker<T> {
    transport: Arc<Mutex<T>>,
    layout: FrameLayout,
    config: DriverConfig,
    pause: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    frames: mpsc::Sender<FrameResult>,
}

impl<T: Transport> StreamWorker<T> {
    async fn run(self) {
        info!(packets = ?self.layout.ids(), frame_len = self.layout.frame_len(), "Sensor stream started");
        let mut buffer = FrameBuffer::new(self.layout.frame_len());

        let exit = loop {
            if self.pause.swap(false, Ordering::AcqRel) {
                break Exit::Paused;
            }
            if self.frames.is_closed() {
                break Exit::ConsumerGone;
            }

            match self.fill(&mut buffer).await {
                Fill::Complete => {}
                Fill::Retry => continue,
                Fill::Closed => break Exit::EndOfInput,
                Fill::Failed(err) => {
                    error!(error = %err, "Sensor stream read failed");
                    let _ = self.frames.send(Err(err)).await;
                    break Exit::TransportFailed;
                }
            }

            let item = match decode_frame(buffer.frame(), &self.layout, self.config.checksum) {
                Ok(frame) => {
                    trace!(bytes = hex::encode(buffer.frame()), "Stream frame");
                    buffer.clear();
                    Ok(frame)
                }
                Err(err) => {
                    warn!(error = %err, bytes = hex::encode(buffer.frame()), "Bad stream frame");
                    if self.config.resync {
                        buffer.resync();
                    } else {
                        buffer.clear();
                    }
                    Err(err.into())
                }
            };
            if self.frames.send(item).await.is_err() {
                break Exit::ConsumerGone;
            }
        };

        if matches!(exit, Exit::Paused | Exit::ConsumerGone) {
            self.pause_device().await;
        }
        self.streaming.store(false, Ordering::Release);
        info!(reason = ?exit, "Sensor stream stopped");
    }

    async fn fill(&self, buffer: &mut FrameBuffer) -> Fill {
        let mut io = self.transport.lock().await;
        while !buffer.is_full() {
            match read_some(&mut *io, buffer.unfilled(), self.config.read_timeout).await {
                Ok(0) => return Fill::Closed,
                Ok(n) => buffer.advance(n),
                Err(err) if is_transient(&err) => {
                    debug!(error = %err, filled = buffer.filled, "Stream read interrupted, retrying");
                    return Fill::Retry;
                }
                Err(err) => return Fill::Failed(err),
            }
        }
        Fill::Complete
    }

    async fn pause_device(&self) {
        let mut io = self.transport.lock().await;
        let pause = Command::pause_resume_stream(false);
        if let Err(err) = write_command(&mut *io, &pause, self.config.read_timeout).await {
            warn!(error = %err, "Failed to pause the sensor stream");
            return;
        }
        let discarded = drain_input(&mut *io, PAUSE_DRAIN_QUIET, PAUSE_DRAIN_LIMIT).await;
        if discarded > 0 {
            debug!(discarded, "Discarded stream bytes after pause");
        }
    }
}

/// Spawns the worker for a stream whose start command has already been
/// written.
pub(crate) fn spawn_worker<T: Transport>(
    transport: Arc<Mutex<T>>,
    layout: FrameLayout,
    config: &DriverConfig,
    paused: bool,
    streaming: Arc<AtomicBool>,
) -> StreamSession {
    // Each session owns its pause token, so a request aimed at one session
    // never reaches the next.
    let pause = Arc::new(AtomicBool::new(paused));
    let (tx, rx) = mpsc::channel(config.stream_buffer.max(1));
    let ids = layout.ids().to_vec();
    let frame_len = layout.frame_len();
    streaming.store(true, Ordering::Release);

    let worker = StreamWorker {
        transport,
        layout,
        config: config.clone(),
        pause: pause.clone(),
        streaming,
        frames: tx,
    };
    let handle = tokio::spawn(worker.run());

    StreamSession {
        ids,
        frame_len,
        frames: rx,
        pause,
        worker: handle,
    }
}

/// Consumer side of a running sensor stream.
///
/// Yields one item per frame read: a decoded [`StreamFrame`], or the error
/// that frame produced. `None` means the worker has stopped.
pub struct StreamSession {
    ids: Vec<u8>,
    frame_len: usize,
    frames: mpsc::Receiver<FrameResult>,
    pause: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl StreamSession {
    pub fn packet_ids(&self) -> &[u8] {
        &self.ids
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub async fn next_frame(&mut self) -> Option<FrameResult> {
        self.frames.recv().await
    }

    /// Asks the worker to pause the device at its next iteration.
    pub fn pause(&self) {
        self.pause.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub(crate) fn pause_token(&self) -> Arc<AtomicBool> {
        self.pause.clone()
    }

    /// Pauses the stream and waits for the worker to finish. Frames still
    /// queued are discarded; their count is returned.
    pub async fn close(mut self) -> usize {
        self.pause();
        let mut discarded = 0;
        while self.frames.recv().await.is_some() {
            discarded += 1;
        }
        if let Err(err) = (&mut self.worker).await {
            warn!(error = %err, "Stream worker did not exit cleanly");
        }
        discarded
    }
}

impl Stream for StreamSession {
    type Item = FrameResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().frames.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{CLIFF_FRONT_LEFT_SIGNAL, DISTANCE, VIRTUAL_WALL};

    const FRAME: [u8; 8] = [19, 5, 29, 2, 25, 13, 0, 182];

    fn layout() -> FrameLayout {
        FrameLayout::new(&[CLIFF_FRONT_LEFT_SIGNAL, VIRTUAL_WALL]).unwrap()
    }

    #[test]
    fn layout_sizes() {
        let layout = layout();
        assert_eq!(layout.frame_len(), 8);
        assert_eq!(layout.body_len(), 5);
        assert_eq!(FrameLayout::new(&[]).unwrap().frame_len(), 3);
        assert!(matches!(FrameLayout::new(&[7, 99]), Err(OiError::UnknownSensorId(99))));
        // Four copies of group 100 do not fit a length byte.
        assert!(FrameLayout::new(&[100, 100, 100, 100]).is_err());
    }

    #[test]
    fn decodes_reference_frame() {
        let frame = decode_frame(&FRAME, &layout(), ChecksumMode::ExcludeMarker).unwrap();
        assert_eq!(frame.packets.len(), 2);
        assert_eq!(frame.packets[0].id, 29);
        assert_eq!(&frame.packets[0].data[..], &[2, 25]);
        assert_eq!(frame.packets[1].id, 13);
        assert_eq!(&frame.packets[1].data[..], &[0]);
        assert_eq!(frame.get(VIRTUAL_WALL).map(|b| b.to_vec()), Some(vec![0]));
        assert_eq!(
            frame.readings().unwrap(),
            vec![(29, SensorReading::U16(537)), (13, SensorReading::Bool(false))]
        );
    }

    #[test]
    fn include_marker_checksum() {
        let mut frame = FRAME;
        frame[7] = 163;
        assert!(decode_frame(&frame, &layout(), ChecksumMode::IncludeMarker).is_ok());
        assert_eq!(
            decode_frame(&frame, &layout(), ChecksumMode::ExcludeMarker),
            Err(ProtocolError::Checksum { sum: 237 })
        );
    }

    #[test]
    fn encode_matches_reference_frames() {
        let packets: [(u8, &[u8]); 2] = [(29, &[2, 25]), (13, &[0])];
        assert_eq!(&encode_frame(&packets, ChecksumMode::ExcludeMarker).unwrap()[..], &FRAME);
        assert_eq!(
            hex::encode(encode_frame(&packets, ChecksumMode::IncludeMarker).unwrap()),
            "13051d02190d00a3"
        );
    }

    #[test]
    fn every_single_byte_corruption_is_detected() {
        let layout = layout();
        for index in 0..FRAME.len() {
            let mut frame = FRAME;
            frame[index] ^= 0x40;
            let err = decode_frame(&frame, &layout, ChecksumMode::ExcludeMarker).unwrap_err();
            match index {
                0 => assert!(matches!(err, ProtocolError::FrameSync { .. })),
                1 => assert!(matches!(err, ProtocolError::LengthMismatch { expected: 5, .. })),
                _ => assert!(matches!(err, ProtocolError::Checksum { .. }), "index {index}: {err:?}"),
            }
        }
    }

    #[test]
    fn packet_walk_errors() {
        let layout = layout();

        // Valid checksum, unregistered id in the first slot.
        let frame = encode_frame(&[(99, &[2, 25]), (13, &[0])], ChecksumMode::ExcludeMarker).unwrap();
        assert_eq!(
            decode_frame(&frame, &layout, ChecksumMode::ExcludeMarker),
            Err(ProtocolError::UnknownPacketInFrame(99))
        );

        // Distance (2 bytes) where the request had a 1-byte packet last.
        let frame = encode_frame(&[(13, &[0, 0]), (DISTANCE, &[0])], ChecksumMode::ExcludeMarker).unwrap();
        assert_eq!(
            decode_frame(&frame, &layout, ChecksumMode::ExcludeMarker),
            Err(ProtocolError::UnexpectedPacket { index: 0, expected: 29, found: 13 })
        );

        let frame = encode_frame(&[(29, &[2, 25]), (DISTANCE, &[0])], ChecksumMode::ExcludeMarker).unwrap();
        assert_eq!(
            decode_frame(&frame, &layout, ChecksumMode::ExcludeMarker),
            Err(ProtocolError::PacketOverrun { id: DISTANCE, offset: 5 })
        );
    }

    #[test]
    fn resync_keeps_bytes_from_next_marker() {
        let mut buffer = FrameBuffer::new(8);
        let junk = [0xAA, 0xBB, 19, 5, 29, 2, 25, 13];
        buffer.unfilled().copy_from_slice(&junk);
        buffer.advance(8);
        buffer.resync();
        assert_eq!(buffer.frame(), &[19, 5, 29, 2, 25, 13]);

        buffer.unfilled().copy_from_slice(&[0, 182]);
        buffer.advance(2);
        assert!(buffer.is_full());
        assert!(decode_frame(buffer.frame(), &layout(), ChecksumMode::ExcludeMarker).is_ok());
    }

    #[test]
    fn resync_without_marker_empties_buffer() {
        let mut buffer = FrameBuffer::new(4);
        buffer.unfilled().copy_from_slice(&[19, 1, 2, 3]);
        buffer.advance(4);
        buffer.resync();
        assert_eq!(buffer.frame(), &[] as &[u8]);
    }
}
