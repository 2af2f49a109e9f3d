//! Slave-mode line vocabulary: commands, property requests and output markers.
//!
//! Everything in this module is pure string handling, so the classifier can
//! be tested without a live player process.

/// Probe written right after spawn. Its answer doubles as the last line of
/// the startup phase.
pub const STARTUP_PROBE: &str = "pausing_keep_force get_property pause\n";

/// Answer to the startup probe; seeing it means configuration parsing is done
/// and the steady-state protocol begins.
pub const STARTUP_COMPLETE: &str = "ANS_pause=no";

/// Startup lines reporting tracks the player already queued from its own
/// command line.
pub const TRACK_ADDED_PREFIX: &str = "Adding file ";

const PLAYLIST_STARTED: &str = "Config pushed level is now 2";
const PLAYLIST_ADVANCED: &str = "Config poped level=2";
const PLAYLIST_EXHAUSTED: &str = "Config poped level=1";
const ANSWER_PREFIX: &str = "ANS_";

/// Fire-and-forget command lines.
pub const PAUSE: &str = "pause\n";
pub const STOP: &str = "stop\n";
pub const QUIT: &str = "quit\n";
pub const NEXT: &str = "pt_step 1 1\n";
pub const PREVIOUS: &str = "pt_step -1 1\n";

/// Seek to an absolute position (seconds) in the current track.
pub fn seek(seconds: f64) -> String {
  format!("seek {} 2\n", seconds)
}

/// Set the volume to an absolute level (0-100).
pub fn set_volume(volume: f64) -> String {
  format!("volume {} 1\n", volume)
}

/// Set or clear mute.
pub fn set_mute(mute: bool) -> String {
  format!("mute {}\n", if mute { 1 } else { 0 })
}

/// Build the single batched write that (re)loads a whole playlist.
///
/// The first entry replaces whatever the player had queued; the rest carry a
/// nonzero append flag. Keeping this one write is what stops a concurrent
/// command line from landing in the middle of the batch.
pub fn load_playlist(tracks: &[String]) -> String {
  let mut out = String::new();
  for (index, track) in tracks.iter().enumerate() {
    out.push_str(&format!("loadfile {:?} {}\n", track, index.min(1)));
  }
  out
}

/// Properties the player can be asked about.
///
/// The wire protocol carries no request identifiers, so this closed set is
/// also the unit of answer correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
  /// Whether playback is paused.
  Pause,
  /// Whether audio is muted.
  Mute,
  /// Current volume level.
  Volume,
  /// Metadata of the current track.
  Metadata,
  /// Length of the current track in seconds.
  Length,
}

impl QueryKind {
  /// Property name as it appears on the wire.
  pub fn property(self) -> &'static str {
    match self {
      QueryKind::Pause => "pause",
      QueryKind::Mute => "mute",
      QueryKind::Volume => "volume",
      QueryKind::Metadata => "metadata",
      QueryKind::Length => "length",
    }
  }

  /// Request line asking the player for this property.
  pub fn request_line(self) -> String {
    format!("pausing_keep_force get_property {}\n", self.property())
  }

  fn from_property(name: &str) -> Option<Self> {
    match name {
      "pause" => Some(QueryKind::Pause),
      "mute" => Some(QueryKind::Mute),
      "volume" => Some(QueryKind::Volume),
      "metadata" => Some(QueryKind::Metadata),
      "length" => Some(QueryKind::Length),
      _ => None,
    }
  }
}

/// One line of player output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerLine {
  /// The first playlist entry began playing.
  PlaylistStarted,
  /// The player moved on to the next playlist entry.
  Advanced,
  /// Playback fell off the end of the playlist.
  Exhausted,
  /// Answer to an earlier property request.
  Answer { kind: QueryKind, value: String },
  /// A track reported as queued; only meaningful during startup.
  TrackAdded(String),
  /// Anything else.
  Unknown,
}

/// Classify one line of player output (without its trailing newline).
///
/// Answer lines whose property name is outside the [`QueryKind`] vocabulary
/// classify as [`PlayerLine::Unknown`], as does any other unrecognized line.
pub fn classify(line: &str) -> PlayerLine {
  match line {
    PLAYLIST_STARTED => return PlayerLine::PlaylistStarted,
    PLAYLIST_ADVANCED => return PlayerLine::Advanced,
    PLAYLIST_EXHAUSTED => return PlayerLine::Exhausted,
    _ => {}
  }

  if let Some(track) = line.strip_prefix(TRACK_ADDED_PREFIX) {
    return PlayerLine::TrackAdded(track.to_string());
  }

  if let Some(rest) = line.strip_prefix(ANSWER_PREFIX) {
    // Split at the first '=' only; metadata values contain their own.
    if let Some((name, value)) = rest.split_once('=') {
      if let Some(kind) = QueryKind::from_property(name) {
        return PlayerLine::Answer {
          kind,
          value: value.to_string(),
        };
      }
    }
  }

  PlayerLine::Unknown
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_playlist_markers() {
    assert_eq!(
      classify("Config pushed level is now 2"),
      PlayerLine::PlaylistStarted
    );
    assert_eq!(classify("Config poped level=2"), PlayerLine::Advanced);
    assert_eq!(classify("Config poped level=1"), PlayerLine::Exhausted);
  }

  #[test]
  fn test_classify_answer() {
    assert_eq!(
      classify("ANS_pause=yes"),
      PlayerLine::Answer {
        kind: QueryKind::Pause,
        value: "yes".to_string()
      }
    );
    assert_eq!(
      classify("ANS_volume=81.527905"),
      PlayerLine::Answer {
        kind: QueryKind::Volume,
        value: "81.527905".to_string()
      }
    );
  }

  #[test]
  fn test_classify_answer_splits_at_first_equals() {
    assert_eq!(
      classify("ANS_metadata=Title=Foo,Artist=Bar"),
      PlayerLine::Answer {
        kind: QueryKind::Metadata,
        value: "Title=Foo,Artist=Bar".to_string()
      }
    );
  }

  #[test]
  fn test_classify_unknown_answer_name() {
    // Properties outside the vocabulary must not correlate with anything.
    assert_eq!(classify("ANS_percent_pos=10"), PlayerLine::Unknown);
    assert_eq!(classify("ANS_ERROR=PROPERTY_UNKNOWN"), PlayerLine::Unknown);
    assert_eq!(classify("ANS_"), PlayerLine::Unknown);
  }

  #[test]
  fn test_classify_track_added() {
    assert_eq!(
      classify("Adding file music/intro.mp3"),
      PlayerLine::TrackAdded("music/intro.mp3".to_string())
    );
  }

  #[test]
  fn test_classify_noise() {
    assert_eq!(classify("MPlayer SVN-r38151 (C) 2000-2019"), PlayerLine::Unknown);
    assert_eq!(classify(""), PlayerLine::Unknown);
  }

  #[test]
  fn test_request_line() {
    assert_eq!(
      QueryKind::Volume.request_line(),
      "pausing_keep_force get_property volume\n"
    );
    assert_eq!(
      QueryKind::Length.request_line(),
      "pausing_keep_force get_property length\n"
    );
  }

  #[test]
  fn test_load_playlist_batch() {
    let tracks = vec!["a.mp3".to_string(), "b dir/b.mp3".to_string(), "c.mp3".to_string()];
    assert_eq!(
      load_playlist(&tracks),
      "loadfile \"a.mp3\" 0\nloadfile \"b dir/b.mp3\" 1\nloadfile \"c.mp3\" 1\n"
    );
    assert_eq!(load_playlist(&[]), "");
  }
}
