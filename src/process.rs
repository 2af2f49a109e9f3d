//! MPlayer binary detection and process spawning.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("MPlayer spawned without piped standard streams")]
  MissingStdio,
  #[error("Failed to await MPlayer exit: {0}")]
  WaitFailed(std::io::Error),
}

/// Fixed argument set for slave mode.
///
/// Keyboard bindings and user configuration are disabled so the command
/// stream is the only input; the message level silences everything except
/// the global status lines and the config-parser lines the session reads.
const SLAVE_ARGS: &[&str] = &[
  "-slave",
  "-quiet",
  "-idle",
  "-input",
  "nodefault-bindings",
  "-noconfig",
  "all",
  "-msglevel",
  "all=-1:global=4:cfgparser=7",
];

/// Find the MPlayer executable in common locations.
pub fn find_player() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mplayer") {
    return Some(path);
  }

  // Platform-specific common locations
  #[cfg(windows)]
  {
    let common_paths = [
      r"C:\Program Files\MPlayer\mplayer.exe",
      r"C:\Program Files (x86)\MPlayer\mplayer.exe",
      r"C:\MPlayer\mplayer.exe",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "macos")]
  {
    let common_paths = [
      "/usr/local/bin/mplayer",
      "/opt/homebrew/bin/mplayer",
      "/opt/local/bin/mplayer",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "linux")]
  {
    let common_paths = ["/usr/bin/mplayer", "/usr/local/bin/mplayer"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  None
}

/// Spawn MPlayer in slave mode with its control streams piped.
pub fn spawn_player(
  player_path: Option<&PathBuf>,
  extra_args: &[String],
) -> Result<Child, ProcessError> {
  let player_exe = player_path
    .cloned()
    .or_else(find_player)
    .ok_or(ProcessError::NotFound)?;

  log::info!("Spawning MPlayer: {:?}", player_exe);
  if !extra_args.is_empty() {
    log::info!("Extra MPlayer args: {:?}", extra_args);
  }

  let mut cmd = Command::new(&player_exe);
  cmd.args(SLAVE_ARGS);

  // Add user-specified extra arguments
  for arg in extra_args {
    cmd.arg(arg);
  }

  let child = cmd
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()?;

  Ok(child)
}
