//! Ordered playback of synthesized replies.
//!
//! A dedicated worker thread owns the output sink (rodio sinks are not
//! `Send` on every platform) and a FIFO of decoded items. `enqueue` never
//! blocks the caller; items play strictly one at a time in arrival order;
//! `stop_all` clears the queue and halts the active item without running
//! its completion path, so a stop never advances into now-irrelevant items.

use crate::error::{VoiceError, VoiceResult};
use crate::wav::{decode_wav, WireAudioPayload};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A decoded audio buffer ready for the speaker.
#[derive(Debug, Clone)]
pub struct PlaybackItem {
    /// Mono samples (f32, -1.0..1.0).
    pub samples: Vec<f32>,
    /// Sample rate from the container header.
    pub sample_rate: u32,
    /// Playback duration derived from the sample count.
    pub duration: Duration,
}

impl PlaybackItem {
    fn from_payload(payload: &WireAudioPayload) -> VoiceResult<Self> {
        let (samples, sample_rate) = decode_wav(&payload.bytes)?;
        let duration = if sample_rate > 0 {
            Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64)
        } else {
            Duration::ZERO
        };
        Ok(Self {
            samples,
            sample_rate,
            duration,
        })
    }
}

/// Output-device seam. `begin` starts one item without blocking; `is_idle`
/// reports whether the item has finished; `halt` stops it immediately.
pub trait AudioSink {
    fn begin(&mut self, item: &PlaybackItem) -> VoiceResult<()>;
    fn is_idle(&self) -> bool;
    fn halt(&mut self);
}

/// Production sink backed by rodio's default output device.
pub struct RodioSink {
    _stream: rodio::OutputStream,
    _handle: rodio::OutputStreamHandle,
    sink: rodio::Sink,
}

impl RodioSink {
    pub fn new() -> VoiceResult<Self> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = rodio::Sink::try_new(&handle)
            .map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("Playback: output sink ready");
        Ok(Self {
            _stream: stream,
            _handle: handle,
            sink,
        })
    }
}

impl AudioSink for RodioSink {
    fn begin(&mut self, item: &PlaybackItem) -> VoiceResult<()> {
        let source = rodio::buffer::SamplesBuffer::new(
            1,
            item.sample_rate,
            item.samples.clone(),
        );
        self.sink.append(source);
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.sink.empty()
    }

    fn halt(&mut self) {
        self.sink.stop();
    }
}

/// Placeholder sink: simulates playback and records the order of items it
/// was given. Use for exercising queue semantics without audio hardware.
#[derive(Default)]
pub struct NullSink {
    /// Sample counts of every item begun, in order.
    played: Arc<Mutex<Vec<usize>>>,
    /// When the current simulated item finishes. None = idle.
    finish_at: Option<Instant>,
    /// When true, items finish instantly instead of in real time.
    instant: bool,
}

impl NullSink {
    /// Items complete on the next idle check.
    pub fn instant() -> Self {
        Self {
            instant: true,
            ..Self::default()
        }
    }

    /// Items take their real duration to complete.
    pub fn realtime() -> Self {
        Self::default()
    }

    /// Instant sink writing into a caller-held log (for factory seams where
    /// the sink is built inside the worker thread).
    pub fn instant_with_log(log: Arc<Mutex<Vec<usize>>>) -> Self {
        Self {
            played: log,
            finish_at: None,
            instant: true,
        }
    }

    /// Shared handle to the play-order log.
    pub fn play_log(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.played)
    }
}

impl AudioSink for NullSink {
    fn begin(&mut self, item: &PlaybackItem) -> VoiceResult<()> {
        if let Ok(mut log) = self.played.lock() {
            log.push(item.samples.len());
        }
        self.finish_at = if self.instant {
            Some(Instant::now())
        } else {
            Some(Instant::now() + item.duration)
        };
        Ok(())
    }

    fn is_idle(&self) -> bool {
        match self.finish_at {
            Some(at) => Instant::now() >= at,
            None => true,
        }
    }

    fn halt(&mut self) {
        self.finish_at = None;
    }
}

enum PlaybackCommand {
    Enqueue(WireAudioPayload),
    StopAll,
    Shutdown,
}

struct PlaybackShared {
    queued: AtomicUsize,
    playing: AtomicBool,
}

/// FIFO playback queue driven by a worker thread.
pub struct PlaybackQueue {
    cmd_tx: mpsc::Sender<PlaybackCommand>,
    shared: Arc<PlaybackShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PlaybackQueue {
    /// Spawn the worker thread. The sink is built inside the thread (it
    /// may not be `Send`); a build failure fails the spawn.
    pub fn spawn<F>(sink_builder: F) -> VoiceResult<Self>
    where
        F: FnOnce() -> VoiceResult<Box<dyn AudioSink>> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let shared = Arc::new(PlaybackShared {
            queued: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name("anima-playback".to_string())
            .spawn(move || {
                let mut sink = match sink_builder() {
                    Ok(s) => {
                        let _ = ready_tx.send(Ok(()));
                        s
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_worker(&mut *sink, cmd_rx, worker_shared);
            })
            .map_err(|e| VoiceError::Playback(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("playback worker died".to_string()))??;

        Ok(Self {
            cmd_tx,
            shared,
            worker: Some(worker),
        })
    }

    /// Decode and append one payload; playback starts immediately when
    /// nothing is active. Never blocks the caller.
    pub fn enqueue(&self, payload: WireAudioPayload) {
        if self.cmd_tx.send(PlaybackCommand::Enqueue(payload)).is_err() {
            warn!("Playback: enqueue after shutdown, dropping payload");
        }
    }

    /// Clear the queue and halt the active item. Its completion path does
    /// not run.
    pub fn stop_all(&self) {
        let _ = self.cmd_tx.send(PlaybackCommand::StopAll);
    }

    /// Whether an item is currently active.
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Items waiting behind the active one.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Stop the worker thread. Idempotent; also runs on Drop.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.cmd_tx.send(PlaybackCommand::Shutdown);
            let _ = worker.join();
            debug!("Playback: worker stopped");
        }
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    sink: &mut dyn AudioSink,
    cmd_rx: mpsc::Receiver<PlaybackCommand>,
    shared: Arc<PlaybackShared>,
) {
    let mut queue: std::collections::VecDeque<PlaybackItem> = Default::default();
    let mut active = false;

    loop {
        match cmd_rx.recv_timeout(Duration::from_millis(5)) {
            Ok(PlaybackCommand::Enqueue(payload)) => {
                match PlaybackItem::from_payload(&payload) {
                    Ok(item) => {
                        debug!(
                            "Playback: queued {:.2}s ({} waiting)",
                            item.duration.as_secs_f32(),
                            queue.len()
                        );
                        queue.push_back(item);
                    }
                    // Malformed incoming audio is non-fatal: skip it.
                    Err(e) => warn!("Playback: could not decode payload: {}", e),
                }
            }
            Ok(PlaybackCommand::StopAll) => {
                queue.clear();
                sink.halt();
                active = false;
                debug!("Playback: stopped, queue cleared");
            }
            Ok(PlaybackCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                sink.halt();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if active && sink.is_idle() {
            active = false;
        }
        if !active {
            if let Some(item) = queue.pop_front() {
                match sink.begin(&item) {
                    Ok(()) => {
                        active = true;
                        debug!(
                            "Playback: playing {:.2}s — {} left in queue",
                            item.duration.as_secs_f32(),
                            queue.len()
                        );
                    }
                    // Skip the item and try the next one.
                    Err(e) => warn!("Playback: sink error, skipping item: {}", e),
                }
            }
        }

        shared.queued.store(queue.len(), Ordering::Release);
        shared.playing.store(active, Ordering::Release);
    }
}
