//! Player launch configuration.

use serde::{Deserialize, Serialize};

/// Configuration for launching the player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub executable: Option<String>,

  /// Additional MPlayer command-line arguments.
  #[serde(default)]
  pub extra_args: Vec<String>,
}

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if let Some(executable) = &self.executable {
      if executable.trim().is_empty() {
        return Err("Player executable path cannot be empty".to_string());
      }
    }
    for arg in &self.extra_args {
      if arg.contains('\n') || arg.contains('\r') {
        return Err(format!("Player argument {:?} contains a line break", arg));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    assert!(PlayerConfig::default().validate().is_ok());
  }

  #[test]
  fn test_rejects_empty_executable() {
    let config = PlayerConfig {
      executable: Some("  ".to_string()),
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_rejects_arguments_with_line_breaks() {
    let config = PlayerConfig {
      extra_args: vec!["-volume\n50".to_string()],
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }
}
