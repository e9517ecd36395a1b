//! MJPEG broadcaster
//!
//! Every viewer gets its own stream that samples the latest-frame slot on a
//! fixed tick, independent of the producer's frame rate. An unchanged slot
//! means the same JPEG is sent again; an empty slot means the placeholder.
//! Per-client statistics are kept the same way for every connection.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::placeholder::{PlaceholderRenderer, DEFAULT_PLACEHOLDER_TEXT};
use crate::pipeline::LatestFrameSlot;
use crate::utils::LogThrottler;
use crate::video::codec::{encode_jpeg, jpeg_for, CodecError, DEFAULT_JPEG_QUALITY};
use crate::video::mjpeg::create_mjpeg_part;
use crate::video::SourceState;

/// Client ID type (UUID string unless the viewer supplied one)
pub type ClientId = String;

#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Target frames per second per client
    pub fps: u32,
    pub jpeg_quality: u8,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    pub placeholder_text: String,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            placeholder_width: 1280,
            placeholder_height: 720,
            placeholder_text: DEFAULT_PLACEHOLDER_TEXT.to_string(),
        }
    }
}

impl BroadcasterConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.clamp(1, 120)
    }
}

/// Rolling window FPS calculator
#[derive(Debug, Clone)]
pub struct FpsCalculator {
    frame_times: VecDeque<Instant>,
    window: Duration,
}

impl FpsCalculator {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(120),
            window: Duration::from_secs(1),
        }
    }

    pub fn record_frame(&mut self) {
        self.record_at(Instant::now());
    }

    fn record_at(&mut self, now: Instant) {
        self.frame_times.push_back(now);
        while let Some(&oldest) = self.frame_times.front() {
            if now.duration_since(oldest) > self.window {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Frames recorded in the last second
    pub fn current_fps(&self) -> u32 {
        self.frame_times.len() as u32
    }
}

impl Default for FpsCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-client session information
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub id: ClientId,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub frames_sent: u64,
    pub fps_calculator: FpsCalculator,
}

impl ClientSession {
    pub fn new(id: ClientId) -> Self {
        let now = Instant::now();
        Self {
            id,
            connected_at: now,
            last_activity: now,
            frames_sent: 0,
            fps_calculator: FpsCalculator::new(),
        }
    }

    pub fn connected_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Client statistics reported by `/api/status`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClientStats {
    pub id: String,
    pub fps: u32,
    pub frames_sent: u64,
    pub connected_secs: u64,
}

pub struct MjpegBroadcaster {
    slot: Arc<LatestFrameSlot>,
    source_state: watch::Receiver<SourceState>,
    config: BroadcasterConfig,
    placeholder: PlaceholderRenderer,
    /// Placeholder JPEG for one tick period, shared by all waiting clients
    placeholder_cache: Mutex<Option<(u64, Arc<OnceCell<Bytes>>)>>,
    clients: RwLock<HashMap<ClientId, ClientSession>>,
    frames_sent: AtomicU64,
    started: Instant,
    shutdown: CancellationToken,
    encode_errors: LogThrottler,
}

impl MjpegBroadcaster {
    pub fn new(
        slot: Arc<LatestFrameSlot>,
        source_state: watch::Receiver<SourceState>,
        config: BroadcasterConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let placeholder = PlaceholderRenderer::new(
            config.placeholder_width,
            config.placeholder_height,
            config.placeholder_text.clone(),
        );
        Self {
            slot,
            source_state,
            config,
            placeholder,
            placeholder_cache: Mutex::new(None),
            clients: RwLock::new(HashMap::new()),
            frames_sent: AtomicU64::new(0),
            started: Instant::now(),
            shutdown,
            encode_errors: LogThrottler::with_secs(5),
        }
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    pub fn source_state(&self) -> SourceState {
        *self.source_state.borrow()
    }

    /// Total chunks handed to all clients
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn register_client(&self, client_id: ClientId) {
        let session = ClientSession::new(client_id.clone());
        let total = {
            let mut clients = self.clients.write();
            clients.insert(client_id.clone(), session);
            clients.len()
        };
        info!("Client {} connected (total: {})", client_id, total);
    }

    pub fn unregister_client(&self, client_id: &str) {
        if let Some(session) = self.clients.write().remove(client_id) {
            let secs = session.connected_duration().as_secs_f32();
            let avg_fps = if secs > 0.1 {
                session.frames_sent as f32 / secs
            } else {
                0.0
            };
            info!(
                "Client {} disconnected after {:.1}s ({} frames, {:.1} avg FPS)",
                client_id, secs, session.frames_sent, avg_fps
            );
        }
    }

    pub fn record_frame_sent(&self, client_id: &str) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(session) = self.clients.write().get_mut(client_id) {
            session.last_activity = Instant::now();
            session.frames_sent += 1;
            session.fps_calculator.record_frame();
        }
    }

    /// Per-client statistics, ordered by id
    pub fn clients_stat(&self) -> Vec<ClientStats> {
        let mut stats: Vec<ClientStats> = self
            .clients
            .read()
            .values()
            .map(|session| ClientStats {
                id: session.id.clone(),
                fps: session.fps_calculator.current_fps(),
                frames_sent: session.frames_sent,
                connected_secs: session.connected_duration().as_secs(),
            })
            .collect();
        stats.sort_by(|a, b| a.id.cmp(&b.id));
        stats
    }

    /// JPEG to send on this tick: the latest frame or the placeholder
    pub async fn current_jpeg(&self) -> Result<Bytes, CodecError> {
        match self.slot.current() {
            Some(published) => jpeg_for(&published.frame, self.config.jpeg_quality).await,
            None => self.placeholder_jpeg().await,
        }
    }

    /// Placeholder for the current tick period, rendered at most once per tick
    ///
    /// Callers in the same tick share one cell; the first renders and the
    /// rest wait for it. A caller that lags behind a newer tick reuses the
    /// newer image.
    pub async fn placeholder_jpeg(&self) -> Result<Bytes, CodecError> {
        let elapsed = self.started.elapsed();
        let tick = (elapsed.as_nanos() / self.config.tick_interval().as_nanos().max(1)) as u64;

        let (tick, cell) = {
            let mut cache = self.placeholder_cache.lock();
            match cache.as_ref() {
                Some((cached_tick, cell)) if *cached_tick >= tick => (*cached_tick, cell.clone()),
                _ => {
                    let cell = Arc::new(OnceCell::new());
                    *cache = Some((tick, cell.clone()));
                    (tick, cell)
                }
            }
        };

        cell.get_or_try_init(|| {
            let renderer = self.placeholder.clone();
            let state = self.source_state();
            let quality = self.config.jpeg_quality;
            async move {
                tokio::task::spawn_blocking(move || -> Result<Bytes, CodecError> {
                    let frame = renderer.render(state, elapsed, tick)?;
                    encode_jpeg(&frame, quality)
                })
                .await
                .map_err(|e| CodecError::Task(e.to_string()))?
            }
        })
        .await
        .cloned()
    }

    /// Infinite multipart body for one client
    ///
    /// Ends when the body is dropped (client went away) or on server shutdown.
    pub fn client_stream(
        self: &Arc<Self>,
        client_id: ClientId,
    ) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let guard = ClientGuard::new(client_id, self.clone());
        let broadcaster = self.clone();
        let shutdown = self.shutdown.clone();
        let tick = self.config.tick_interval();

        async_stream::stream! {
            let guard = guard;
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match broadcaster.current_jpeg().await {
                    Ok(jpeg) => {
                        yield Ok::<Bytes, io::Error>(create_mjpeg_part(&jpeg));
                        broadcaster.record_frame_sent(guard.id());
                    }
                    Err(e) => {
                        if broadcaster.encode_errors.check("encode").should_log() {
                            warn!("Failed to encode frame for client {}: {}", guard.id(), e);
                        }
                    }
                }
            }
        }
    }
}

/// RAII guard for client lifecycle management
///
/// Registers on creation, unregisters on drop (including when the HTTP body
/// is dropped mid-stream).
pub struct ClientGuard {
    client_id: ClientId,
    broadcaster: Arc<MjpegBroadcaster>,
}

impl ClientGuard {
    pub fn new(client_id: ClientId, broadcaster: Arc<MjpegBroadcaster>) -> Self {
        broadcaster.register_client(client_id.clone());
        Self {
            client_id,
            broadcaster,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.client_id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.broadcaster.unregister_client(&self.client_id);
    }
}
