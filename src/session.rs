//! Async session over an MPlayer slave-mode stream pair.
//!
//! Owns the one background reader of the player's output, the playlist
//! position state driven by its unsolicited status lines, and the
//! per-property coalescing of concurrent queries onto a single wire
//! round-trip (the protocol carries no request identifiers, so two
//! outstanding requests for the same property would race for one answer).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{self, PlayerLine, QueryKind};

/// Terminal session failures. Once one of these is recorded it is permanent
/// and every later operation returns it unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
  /// The player closed its output stream.
  #[error("player stream ended")]
  StreamEnded,
  /// Reading or writing the player's streams failed.
  #[error("player stream error: {0}")]
  Stream(String),
  /// The session was shut down.
  #[error("session closed")]
  Closed,
}

/// Failures producing a ready session from a fresh stream pair. These occur
/// before any session exists, so nothing sticky is recorded.
#[derive(Error, Debug)]
pub enum StartupError {
  #[error("Failed to write to the player's input stream: {0}")]
  Stdin(std::io::Error),
  #[error("Player output ended before startup completed")]
  StartupIncomplete,
  #[error("Failed to read the player's output stream: {0}")]
  Stdout(std::io::Error),
}

/// What to do when playback falls off the end of the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPolicy {
  /// Stop after the last track.
  #[default]
  Off,
  /// Reload the playlist from the top forever.
  Infinite,
  /// Play the whole list this many times in total, then stop.
  /// `Count(1)` behaves like [`LoopPolicy::Off`].
  Count(u32),
}

/// Unsolicited playback notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
  /// The first playlist entry began playing.
  PlaylistStarted,
  /// Playback moved to the entry at `position`.
  TrackChanged { position: usize },
  /// Playback fell off the end of the list and stopped.
  PlaylistEnded,
  /// Playback fell off the end of the list and the list was reloaded.
  PlaylistRestarted,
}

type Waiter = oneshot::Sender<Result<String, SessionError>>;

/// Per-property bookkeeping: whether a request line is already on the wire,
/// and everyone waiting for its answer.
#[derive(Default)]
struct PendingQuery {
  in_flight: bool,
  waiters: Vec<Waiter>,
}

struct SessionState {
  sticky: Option<SessionError>,
  pending: HashMap<QueryKind, PendingQuery>,
  tracks: Vec<String>,
  position: Option<usize>,
  loop_policy: LoopPolicy,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between callers and the reader task.
struct Shared {
  state: Mutex<SessionState>,
  writer: tokio::sync::Mutex<BoxedWriter>,
  event_tx: Sender<PlayerEvent>,
}

/// Live session over the player's standard streams.
pub struct PlayerSession {
  shared: Arc<Shared>,
  event_rx: Receiver<PlayerEvent>,
  cancel: CancellationToken,
  reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerSession {
  /// Drive the startup handshake and return a ready session.
  ///
  /// Writes the startup probe, then reads the player's output until the
  /// completion marker appears, collecting any tracks the player reports as
  /// already queued. Only then is the read side handed to the background
  /// reader. A stream that ends first is a startup failure, never a session.
  pub async fn connect<R, W>(reader: R, writer: W) -> Result<Self, StartupError>
  where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let mut writer: BoxedWriter = Box::new(writer);
    writer
      .write_all(protocol::STARTUP_PROBE.as_bytes())
      .await
      .map_err(StartupError::Stdin)?;
    writer.flush().await.map_err(StartupError::Stdin)?;

    let mut reader = BufReader::new(reader);
    let mut tracks = Vec::new();
    let mut line = String::new();
    loop {
      line.clear();
      match reader.read_line(&mut line).await {
        Ok(0) => return Err(StartupError::StartupIncomplete),
        Ok(_) => {
          let trimmed = line.trim_end_matches(['\r', '\n']);
          if let Some(track) = trimmed.strip_prefix(protocol::TRACK_ADDED_PREFIX) {
            log::debug!("Startup: player already queued {}", track);
            tracks.push(track.to_string());
          } else if trimmed == protocol::STARTUP_COMPLETE {
            break;
          }
          // Everything else in the startup phase is configuration noise.
        }
        Err(e) => return Err(StartupError::Stdout(e)),
      }
    }

    log::info!("Player startup complete ({} track(s) queued)", tracks.len());

    let (event_tx, event_rx) = async_channel::unbounded();
    let shared = Arc::new(Shared {
      state: Mutex::new(SessionState {
        sticky: None,
        pending: HashMap::new(),
        tracks,
        position: None,
        loop_policy: LoopPolicy::Off,
      }),
      writer: tokio::sync::Mutex::new(writer),
      event_tx,
    });

    let cancel = CancellationToken::new();
    let reader_shared = shared.clone();
    let reader_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
      reader_loop(reader, reader_shared, reader_cancel).await;
    });

    Ok(Self {
      shared,
      event_rx,
      cancel,
      reader_handle: Mutex::new(Some(handle)),
    })
  }

  /// Send one already-encoded command line to the player.
  pub async fn send(&self, line: &str) -> Result<(), SessionError> {
    self.shared.write_line(line).await
  }

  /// Ask the player for a property and wait for the matching answer.
  ///
  /// Callers arriving while a request for the same property is outstanding
  /// join its wait instead of writing a second request; all of them receive
  /// the one answer (or the one terminal error).
  pub async fn query(&self, kind: QueryKind) -> Result<String, SessionError> {
    let (tx, rx) = oneshot::channel();
    let responsible = {
      let mut st = self.shared.state.lock();
      if let Some(err) = st.sticky.clone() {
        return Err(err);
      }
      let entry = st.pending.entry(kind).or_default();
      entry.waiters.push(tx);
      !std::mem::replace(&mut entry.in_flight, true)
    };

    if responsible {
      if let Err(err) = self.shared.write_line(&kind.request_line()).await {
        // write_line already failed the session, which released every
        // waiter (ours included) and cleared the table.
        return Err(err);
      }
    }

    match rx.await {
      Ok(result) => result,
      Err(_) => Err(self.sticky()),
    }
  }

  /// Replace the playlist wholesale and start playing it.
  ///
  /// The position resets to "no track active" until the player confirms the
  /// first entry started.
  pub async fn play(&self, tracks: &[String], loop_policy: LoopPolicy) -> Result<(), SessionError> {
    let batch = {
      let mut st = self.shared.state.lock();
      if let Some(err) = st.sticky.clone() {
        return Err(err);
      }
      st.tracks = tracks.to_vec();
      st.position = None;
      st.loop_policy = loop_policy;
      protocol::load_playlist(&st.tracks)
    };
    self.shared.write_line(&batch).await
  }

  /// Tracks currently loaded, in playback order.
  pub fn playlist(&self) -> Vec<String> {
    self.shared.state.lock().tracks.clone()
  }

  /// Index of the active track, or `None` when stopped.
  pub fn position(&self) -> Option<usize> {
    self.shared.state.lock().position
  }

  /// The loop policy in effect for the current playlist.
  pub fn loop_policy(&self) -> LoopPolicy {
    self.shared.state.lock().loop_policy
  }

  /// Receiver for unsolicited playback notifications.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.event_rx.clone()
  }

  /// Tear the session down.
  ///
  /// Records `reason` (unless a terminal error is already recorded),
  /// releases every pending waiter, writes the terminate command best-effort
  /// and stops the reader. Safe to call more than once.
  pub async fn shutdown(&self, reason: SessionError) {
    let already_closed = self.shared.state.lock().sticky.is_some();
    self.shared.fail(reason);

    if !already_closed {
      // Best effort: the player may already be gone.
      let mut writer = self.shared.writer.lock().await;
      if let Err(e) = writer.write_all(protocol::QUIT.as_bytes()).await {
        log::debug!("Terminate command not delivered: {}", e);
      }
      let _ = writer.flush().await;
    }

    self.cancel.cancel();
    let handle = self.reader_handle.lock().take();
    if let Some(handle) = handle {
      let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
  }

  fn sticky(&self) -> SessionError {
    self
      .shared
      .state
      .lock()
      .sticky
      .clone()
      .unwrap_or(SessionError::Closed)
  }
}

impl Drop for PlayerSession {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Sole consumer of the player's output stream. Runs until the stream ends,
/// a read fails, or the session is cancelled.
async fn reader_loop<R: AsyncRead + Unpin>(
  mut reader: BufReader<R>,
  shared: Arc<Shared>,
  cancel: CancellationToken,
) {
  log::debug!("Player reader loop started");
  let mut line = String::new();
  loop {
    line.clear();
    let read = tokio::select! {
      _ = cancel.cancelled() => {
        log::debug!("Player reader loop cancelled");
        return;
      }
      read = reader.read_line(&mut line) => read,
    };

    match read {
      Ok(0) => {
        log::info!("Player closed its output stream");
        shared.fail(SessionError::StreamEnded);
        return;
      }
      Ok(_) => {
        shared
          .handle_line(line.trim_end_matches(['\r', '\n']))
          .await;
      }
      Err(e) => {
        log::error!("Player read error: {}", e);
        shared.fail(SessionError::Stream(e.to_string()));
        return;
      }
    }
  }
}

impl Shared {
  async fn handle_line(&self, line: &str) {
    match protocol::classify(line) {
      PlayerLine::PlaylistStarted => {
        self.state.lock().position = Some(0);
        let _ = self.event_tx.send(PlayerEvent::PlaylistStarted).await;
      }
      PlayerLine::Advanced => {
        let changed = {
          let mut st = self.state.lock();
          match st.position {
            None => {
              st.position = Some(0);
              Some(0)
            }
            Some(i) if i + 1 < st.tracks.len() => {
              st.position = Some(i + 1);
              Some(i + 1)
            }
            // An advance at the last entry without an end marker: keep the
            // index in bounds and wait for the end marker.
            Some(_) => None,
          }
        };
        if let Some(position) = changed {
          let _ = self.event_tx.send(PlayerEvent::TrackChanged { position }).await;
        }
      }
      PlayerLine::Exhausted => self.handle_exhausted().await,
      PlayerLine::Answer { kind, value } => self.resolve_answer(kind, value),
      PlayerLine::TrackAdded(_) => {}
      PlayerLine::Unknown => log::debug!("Ignoring player output: {}", line),
    }
  }

  /// Playback ran off the end of the list: stop or reload per the loop
  /// policy. The reload write happens with the state lock released.
  async fn handle_exhausted(&self) {
    enum Outcome {
      Stop,
      Replay(String),
    }

    let outcome = {
      let mut st = self.state.lock();
      match st.loop_policy {
        LoopPolicy::Off => {
          st.position = None;
          Outcome::Stop
        }
        LoopPolicy::Infinite => {
          st.position = Some(0);
          Outcome::Replay(protocol::load_playlist(&st.tracks))
        }
        LoopPolicy::Count(n) if n > 1 => {
          st.loop_policy = LoopPolicy::Count(n - 1);
          st.position = Some(0);
          Outcome::Replay(protocol::load_playlist(&st.tracks))
        }
        LoopPolicy::Count(_) => {
          st.position = None;
          Outcome::Stop
        }
      }
    };

    match outcome {
      Outcome::Stop => {
        log::debug!("Playlist exhausted, stopping");
        let _ = self.event_tx.send(PlayerEvent::PlaylistEnded).await;
      }
      Outcome::Replay(batch) => {
        log::debug!("Playlist exhausted, reloading");
        if let Err(e) = self.write_line(&batch).await {
          log::warn!("Failed to reload playlist: {}", e);
          return;
        }
        let _ = self.event_tx.send(PlayerEvent::PlaylistRestarted).await;
      }
    }
  }

  /// Deliver an answer to everyone queued for its property, clearing the
  /// in-flight marker. Answers nobody asked for are dropped.
  fn resolve_answer(&self, kind: QueryKind, value: String) {
    let waiters = {
      let mut st = self.state.lock();
      match st.pending.remove(&kind) {
        Some(pending) => pending.waiters,
        None => Vec::new(),
      }
    };

    if waiters.is_empty() {
      log::debug!("Discarding unsolicited {:?} answer", kind);
      return;
    }

    for waiter in waiters {
      let _ = waiter.send(Ok(value.clone()));
    }
  }

  /// Write one pre-encoded line (or batch of lines) to the player, holding
  /// the write lock across the whole write so lines never interleave.
  async fn write_line(&self, line: &str) -> Result<(), SessionError> {
    if let Some(err) = self.state.lock().sticky.clone() {
      return Err(err);
    }

    let mut writer = self.writer.lock().await;
    let result: std::io::Result<()> = async {
      writer.write_all(line.as_bytes()).await?;
      writer.flush().await
    }
    .await;

    match result {
      Ok(()) => Ok(()),
      Err(e) => {
        log::error!("Player write error: {}", e);
        Err(self.fail(SessionError::Stream(e.to_string())))
      }
    }
  }

  /// Record the terminal error (first writer wins) and release every queued
  /// waiter with it. Returns the error actually recorded.
  fn fail(&self, reason: SessionError) -> SessionError {
    let (sticky, pending) = {
      let mut st = self.state.lock();
      let sticky = st.sticky.get_or_insert(reason).clone();
      let pending = std::mem::take(&mut st.pending);
      (sticky, pending)
    };

    for (_, entry) in pending {
      for waiter in entry.waiters {
        let _ = waiter.send(Err(sticky.clone()));
      }
    }

    sticky
  }
}
