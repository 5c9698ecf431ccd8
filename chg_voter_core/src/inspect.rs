//! Read/write surface for debug tooling.
//!
//! Presentation (text files, CLI, ...) lives outside the core and talks to a
//! votable only through [`Inspectable`].

use serde::{Deserialize, Serialize};

use crate::election::ElectionKind;
use crate::error::VoteError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client: String,
    pub enabled: bool,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideStatus {
    pub client: String,
    pub value: i64,
}

/// Point-in-time copy of a votable, taken under its lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotableStatus {
    pub name: String,
    pub kind: ElectionKind,
    /// Registered clients in registration order.
    pub clients: Vec<ClientStatus>,
    /// Layered (force > override > election) client.
    pub effective_client: Option<String>,
    /// Layered (force > override > election) result.
    pub effective_result: Option<i64>,
    pub override_vote: Option<OverrideStatus>,
    pub force_active: bool,
    pub force_val: u32,
}

pub trait Inspectable {
    fn name(&self) -> &str;

    fn status(&self) -> Result<VotableStatus, VoteError>;

    fn force_val(&self) -> Result<u32, VoteError>;

    /// Store the forced value. Takes effect on the next force activation.
    fn set_force_val(&self, val: u32) -> Result<(), VoteError>;

    fn force_active(&self) -> Result<bool, VoteError>;

    /// Engage or release the force layer and re-run the callback with
    /// whatever layer is authoritative afterwards.
    fn set_force_active(&self, active: bool) -> Result<(), VoteError>;
}
