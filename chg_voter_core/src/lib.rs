//! chg_voter_core
//!
//! Votable arbitration: many independent clients vote on one control value,
//! an election of a fixed kind (MIN, MAX, SET_ANY) picks the effective value,
//! and a callback applies it whenever it changes.
//!
//! Layering, highest priority first: debug force, override, election.

pub mod cfg;
pub mod check;
pub mod clients;
pub mod election;
pub mod error;
pub mod inspect;
pub mod state;
pub mod value_map;
pub mod votable;

pub use cfg::{VotableCfg, DEBUG_FORCE_CLIENT};
pub use check::{VoteCheck, VoteRequest};
pub use clients::{ClientId, ClientTable, ClientVote};
pub use election::{elect, Election, ElectionKind};
pub use error::{result_or_einval, HookError, VoteError};
pub use inspect::{ClientStatus, Inspectable, OverrideStatus, VotableStatus};
pub use state::VotableState;
pub use value_map::ValueMap;
pub use votable::{Decision, Votable, VotableGuard, VotableHandle, VoteCallback};
