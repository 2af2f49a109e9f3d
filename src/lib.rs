//! Controls an external MPlayer process through its slave-mode line protocol.
//!
//! The player is spawned with its standard streams piped; single-line
//! commands go down its input while a background reader multiplexes the
//! unsolicited status lines and query answers coming back up, which the
//! protocol neither frames nor correlates.
//!
//! Architecture:
//! - `process.rs` - MPlayer binary detection and process spawning
//! - `protocol.rs` - slave-mode line vocabulary and the output classifier
//! - `session.rs` - command/answer multiplexing over the player's stdio
//! - `client.rs` - high-level player handle with command methods
//! - `config.rs` - launch configuration

mod client;
mod config;
mod process;
mod protocol;
mod session;

pub use client::{Player, PlayerError};
pub use config::PlayerConfig;
pub use process::{find_player, ProcessError};
pub use protocol::QueryKind;
pub use session::{LoopPolicy, PlayerEvent, PlayerSession, SessionError, StartupError};
