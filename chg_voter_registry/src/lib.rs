//! chg_voter_registry
//!
//! Process-facing layer around `chg_voter_core`:
//! - a named registry so drivers find shared votables by name
//! - text debug endpoints (`status`, `force_val`, `force_active`) per votable
//!
//! No IO. No async. The registry never holds its own locks while a votable's
//! lock or callback is active.

pub mod debugfs;
pub mod registry;

pub use debugfs::{format_status, parse_u32, read_entry, write_entry, DebugEntry, DebugError, DebugFs};
pub use registry::{RegistryCfg, RegistrySnapshot, VotableRegistry};
