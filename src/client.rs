//! High-level player handle with command methods.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use async_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Child;

use crate::config::PlayerConfig;
use crate::process::{spawn_player, ProcessError};
use crate::protocol::{self, QueryKind};
use crate::session::{LoopPolicy, PlayerEvent, PlayerSession, SessionError, StartupError};

#[derive(Error, Debug)]
pub enum PlayerError {
  #[error("Invalid configuration: {0}")]
  Config(String),
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("Startup error: {0}")]
  Startup(#[from] StartupError),
  #[error("Session error: {0}")]
  Session(#[from] SessionError),
  #[error("Player returned an invalid {0} answer: {1}")]
  InvalidAnswer(&'static str, String),
}

/// Controls one MPlayer process for its whole lifetime.
///
/// Cloning is cheap; clones share the same process and session.
pub struct Player {
  session: Arc<PlayerSession>,
  process: Arc<Mutex<Option<Child>>>,
}

impl Player {
  /// Spawn the player and drive it to a ready session.
  pub async fn start(config: &PlayerConfig) -> Result<Self, PlayerError> {
    config.validate().map_err(PlayerError::Config)?;

    let player_path = config.executable.as_ref().map(PathBuf::from);
    let mut child = spawn_player(player_path.as_ref(), &config.extra_args)?;

    let stdin = child.stdin.take().ok_or(ProcessError::MissingStdio)?;
    let stdout = child.stdout.take().ok_or(ProcessError::MissingStdio)?;

    let session = match PlayerSession::connect(stdout, stdin).await {
      Ok(session) => session,
      Err(e) => {
        // Reap the half-started child before reporting the failure.
        let _ = child.start_kill();
        let _ = child.wait().await;
        return Err(e.into());
      }
    };

    log::info!(
      "Player ready ({} track(s) preloaded)",
      session.playlist().len()
    );

    Ok(Self {
      session: Arc::new(session),
      process: Arc::new(Mutex::new(Some(child))),
    })
  }

  /// Replace the playlist and start playback, stopping after the last track.
  pub async fn play<S: AsRef<str>>(&self, tracks: &[S]) -> Result<(), PlayerError> {
    self.play_looped(tracks, LoopPolicy::Off).await
  }

  /// Replace the playlist and start playback with the given loop policy.
  pub async fn play_looped<S: AsRef<str>>(
    &self,
    tracks: &[S],
    loop_policy: LoopPolicy,
  ) -> Result<(), PlayerError> {
    let tracks: Vec<String> = tracks.iter().map(|t| t.as_ref().to_string()).collect();
    self.session.play(&tracks, loop_policy).await?;
    Ok(())
  }

  /// Toggle pause.
  pub async fn pause(&self) -> Result<(), PlayerError> {
    self.session.send(protocol::PAUSE).await?;
    Ok(())
  }

  /// Stop playback, keeping the player idle.
  pub async fn stop(&self) -> Result<(), PlayerError> {
    self.session.send(protocol::STOP).await?;
    Ok(())
  }

  /// Skip to the next playlist entry.
  pub async fn next(&self) -> Result<(), PlayerError> {
    self.session.send(protocol::NEXT).await?;
    Ok(())
  }

  /// Go back to the previous playlist entry.
  pub async fn previous(&self) -> Result<(), PlayerError> {
    self.session.send(protocol::PREVIOUS).await?;
    Ok(())
  }

  /// Seek to an absolute position (seconds) in the current track.
  pub async fn seek(&self, seconds: f64) -> Result<(), PlayerError> {
    self.session.send(&protocol::seek(seconds)).await?;
    Ok(())
  }

  /// Set the volume to an absolute level (0-100).
  pub async fn set_volume(&self, volume: f64) -> Result<(), PlayerError> {
    self.session.send(&protocol::set_volume(volume)).await?;
    Ok(())
  }

  /// Set or clear mute.
  pub async fn set_mute(&self, mute: bool) -> Result<(), PlayerError> {
    self.session.send(&protocol::set_mute(mute)).await?;
    Ok(())
  }

  /// Whether playback is currently paused.
  pub async fn is_paused(&self) -> Result<bool, PlayerError> {
    let answer = self.session.query(QueryKind::Pause).await?;
    parse_bool_answer("pause", &answer)
  }

  /// Whether audio is currently muted.
  pub async fn is_muted(&self) -> Result<bool, PlayerError> {
    let answer = self.session.query(QueryKind::Mute).await?;
    parse_bool_answer("mute", &answer)
  }

  /// Current volume level (0-100).
  pub async fn volume(&self) -> Result<f64, PlayerError> {
    let answer = self.session.query(QueryKind::Volume).await?;
    parse_float_answer("volume", &answer)
  }

  /// Length of the current track in seconds.
  pub async fn track_length(&self) -> Result<f64, PlayerError> {
    let answer = self.session.query(QueryKind::Length).await?;
    parse_float_answer("length", &answer)
  }

  /// Raw metadata string for the current track.
  pub async fn metadata(&self) -> Result<String, PlayerError> {
    Ok(self.session.query(QueryKind::Metadata).await?)
  }

  /// Tracks currently loaded, in playback order.
  pub fn playlist(&self) -> Vec<String> {
    self.session.playlist()
  }

  /// Index of the active track, or `None` when stopped.
  pub fn position(&self) -> Option<usize> {
    self.session.position()
  }

  /// Receiver for unsolicited playback notifications.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.session.events()
  }

  /// Shut the session down, ask the player to terminate and wait for it.
  ///
  /// Returns the exit status, or `None` when the process was already
  /// reaped by an earlier call.
  pub async fn quit(&self) -> Result<Option<ExitStatus>, PlayerError> {
    self.session.shutdown(SessionError::Closed).await;

    let child = self.process.lock().take();
    match child {
      Some(mut child) => {
        let status = child.wait().await.map_err(ProcessError::WaitFailed)?;
        log::info!("Player exited with {}", status);
        Ok(Some(status))
      }
      None => Ok(None),
    }
  }

  /// Shut the session down and kill the player instead of waiting for it to
  /// honor the terminate command.
  pub async fn kill(&self) -> Result<(), PlayerError> {
    self.session.shutdown(SessionError::Closed).await;

    let child = self.process.lock().take();
    if let Some(mut child) = child {
      let _ = child.start_kill();
      let _ = child.wait().await;
      log::info!("Player killed");
    }
    Ok(())
  }
}

// Clones share the session and the process handle.
impl Clone for Player {
  fn clone(&self) -> Self {
    Self {
      session: self.session.clone(),
      process: self.process.clone(),
    }
  }
}

fn parse_bool_answer(property: &'static str, answer: &str) -> Result<bool, PlayerError> {
  match answer {
    "yes" => Ok(true),
    "no" => Ok(false),
    other => Err(PlayerError::InvalidAnswer(property, other.to_string())),
  }
}

fn parse_float_answer(property: &'static str, answer: &str) -> Result<f64, PlayerError> {
  answer
    .trim()
    .parse()
    .map_err(|_| PlayerError::InvalidAnswer(property, answer.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_bool_answer() {
    assert!(parse_bool_answer("pause", "yes").unwrap());
    assert!(!parse_bool_answer("pause", "no").unwrap());
    assert!(matches!(
      parse_bool_answer("pause", "maybe"),
      Err(PlayerError::InvalidAnswer("pause", _))
    ));
  }

  #[test]
  fn test_parse_float_answer() {
    assert_eq!(parse_float_answer("volume", "81.527905").unwrap(), 81.527905);
    assert_eq!(parse_float_answer("length", "180").unwrap(), 180.0);
    assert!(matches!(
      parse_float_answer("volume", "loud"),
      Err(PlayerError::InvalidAnswer("volume", _))
    ));
  }
}
