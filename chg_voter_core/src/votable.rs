//! The arbitration object.
//!
//! A [`Votable`] owns one primary lock over its [`VotableState`] and the user
//! callback, plus a narrower lock over its validation checks. Every public
//! method takes the primary lock for its whole duration; [`Votable::lock`]
//! hands out a [`VotableGuard`] so several operations can run under one
//! acquisition.
//!
//! The callback runs with the primary lock held. Calling back into the same
//! votable from the callback (or from a check) on the same thread fails with
//! [`VoteError::Reentrant`] instead of deadlocking.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, trace, warn};

use crate::cfg::VotableCfg;
use crate::check::{CheckChain, VoteCheck, VoteRequest};
use crate::clients::ClientVote;
use crate::election::{elect, ElectionKind};
use crate::error::{HookError, NameDisplay, VoteError};
use crate::inspect::{Inspectable, VotableStatus};
use crate::state::{OverrideVote, VotableState};

/// Shared handle to a votable.
pub type VotableHandle = Arc<Votable>;

/// What the callback is asked to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision<'a> {
    /// `None` when a MIN/MAX votable has no enabled voter.
    pub value: Option<i64>,
    pub client: Option<&'a str>,
    pub step: bool,
}

/// Side effect run when the effective decision changes.
pub trait VoteCallback: Send {
    fn on_decision(&mut self, state: &VotableState, decision: Decision<'_>) -> Result<(), HookError>;
}

impl<F> VoteCallback for F
where
    F: FnMut(&VotableState, Decision<'_>) -> Result<(), HookError> + Send,
{
    fn on_decision(&mut self, state: &VotableState, decision: Decision<'_>) -> Result<(), HookError> {
        self(state, decision)
    }
}

struct Inner {
    state: VotableState,
    callback: Box<dyn VoteCallback>,
}

pub struct Votable {
    name: String,
    kind: ElectionKind,
    inner: Mutex<Inner>,
    checks: CheckChain,
    owner: Mutex<Option<ThreadId>>,
}

pub(crate) fn check_name(what: &str, name: &str, max_len: usize) -> Result<(), VoteError> {
    if name.is_empty() {
        return Err(VoteError::InvalidArgument(format!("empty {what} name")));
    }
    if name.len() > max_len {
        return Err(VoteError::InvalidArgument(format!(
            "{what} name {name:?} longer than {max_len} bytes"
        )));
    }
    Ok(())
}

impl Votable {
    pub fn new<C>(name: &str, kind: ElectionKind, cfg: VotableCfg, callback: C) -> Result<Self, VoteError>
    where
        C: VoteCallback + 'static,
    {
        check_name("votable", name, cfg.max_name_len)?;
        if cfg.capacity == 0 {
            return Err(VoteError::InvalidArgument("client capacity must be non-zero".into()));
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            inner: Mutex::new(Inner {
                state: VotableState::new(name.to_string(), kind, cfg),
                callback: Box::new(callback),
            }),
            checks: CheckChain::default(),
            owner: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElectionKind {
        self.kind
    }

    fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn held_by_current_thread(&self) -> bool {
        *self.owner() == Some(thread::current().id())
    }

    /// Take the primary lock.
    ///
    /// A callback that panicked leaves the lock poisoned; the state it left
    /// behind is still consistent, so the poison is ignored.
    pub fn lock(&self) -> Result<VotableGuard<'_>, VoteError> {
        if self.held_by_current_thread() {
            return Err(VoteError::Reentrant(self.name.clone()));
        }
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner() = Some(thread::current().id());
        Ok(VotableGuard { votable: self, inner })
    }

    /// Append a validation check. Only the check-list lock is taken.
    pub fn add_check<K>(&self, check: K) -> Result<(), VoteError>
    where
        K: VoteCheck + 'static,
    {
        // The chain stays locked while its checks run.
        if self.checks.running_on_current_thread() {
            return Err(VoteError::Reentrant(self.name.clone()));
        }
        self.checks.push(Box::new(check));
        Ok(())
    }

    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    pub fn vote(&self, client: &str, enabled: bool, value: i64, step: bool) -> Result<(), VoteError> {
        self.lock()?.vote(client, enabled, value, step)
    }

    pub fn vote_override(&self, client: &str, enabled: bool, value: i64, step: bool) -> Result<(), VoteError> {
        self.lock()?.vote_override(client, enabled, value, step)
    }

    pub fn rerun_election(&self, step: bool) -> Result<(), VoteError> {
        self.lock()?.rerun_election(step)
    }

    pub fn add_map(&self, original: i64, mapped: i64) -> Result<(), VoteError> {
        self.lock()?.add_map(original, mapped);
        Ok(())
    }

    pub fn effective_result(&self) -> Result<Option<i64>, VoteError> {
        Ok(self.lock()?.effective_result())
    }

    /// Like [`Self::effective_result`], but "no enabled voter" is an error.
    pub fn effective_value(&self) -> Result<i64, VoteError> {
        self.lock()?.effective_value()
    }

    pub fn effective_client(&self) -> Result<Option<String>, VoteError> {
        Ok(self.lock()?.effective_client().map(str::to_string))
    }

    pub fn effective_result_exclude_client(&self, client: &str) -> Result<Option<i64>, VoteError> {
        Ok(self.lock()?.effective_result_exclude_client(client))
    }

    pub fn is_client_vote_enabled(&self, client: &str) -> Result<bool, VoteError> {
        self.lock()?.is_client_vote_enabled(client)
    }

    pub fn get_client_vote(&self, client: &str) -> Result<Option<i64>, VoteError> {
        self.lock()?.get_client_vote(client)
    }

    pub fn is_override_vote_enabled(&self) -> Result<bool, VoteError> {
        Ok(self.lock()?.is_override_vote_enabled())
    }
}

impl fmt::Debug for Votable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Votable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Inspectable for Votable {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Result<VotableStatus, VoteError> {
        Ok(self.lock()?.state().status())
    }

    fn force_val(&self) -> Result<u32, VoteError> {
        Ok(self.lock()?.state().force_val())
    }

    fn set_force_val(&self, val: u32) -> Result<(), VoteError> {
        self.lock()?.set_force_val(val);
        Ok(())
    }

    fn force_active(&self) -> Result<bool, VoteError> {
        Ok(self.lock()?.state().force_active())
    }

    fn set_force_active(&self, active: bool) -> Result<(), VoteError> {
        self.lock()?.set_force_active(active)
    }
}

/// Primary lock of a votable, held. Every operation here assumes the lock.
pub struct VotableGuard<'a> {
    votable: &'a Votable,
    inner: MutexGuard<'a, Inner>,
}

impl Drop for VotableGuard<'_> {
    fn drop(&mut self) {
        *self.votable.owner() = None;
    }
}

fn notify<C: VoteCallback + ?Sized>(callback: &mut C, state: &VotableState, decision: Decision<'_>) -> Result<(), VoteError> {
    trace!(
        votable = %state.name,
        value = ?decision.value,
        client = %NameDisplay(decision.client),
        step = decision.step,
        "invoking callback"
    );
    callback.on_decision(state, decision).map_err(|e| {
        debug!(votable = %state.name, error = %e, "callback failed");
        VoteError::CallbackFailed(e)
    })
}

impl VotableGuard<'_> {
    pub fn state(&self) -> &VotableState {
        &self.inner.state
    }

    fn client_name_ok(&self, client: &str) -> Result<(), VoteError> {
        check_name("client", client, self.inner.state.cfg.max_name_len)
    }

    /// Cast or update `client`'s vote.
    ///
    /// Repeating the stored ballot is a no-op once anyone has voted. The
    /// callback fires on the first vote and whenever the election result
    /// changes, unless force or override is engaged. A callback error is
    /// returned after the vote has been committed.
    pub fn vote(&mut self, client: &str, enabled: bool, value: i64, step: bool) -> Result<(), VoteError> {
        self.client_name_ok(client)?;
        let votable = self.votable;
        let Inner { state, callback } = &mut *self.inner;

        let id = state.clients.get_or_create(&state.name, client)?;

        // SET_ANY elects on `enabled` alone.
        let value = if state.kind == ElectionKind::SetAny {
            enabled as i64
        } else {
            value
        };
        let ballot = ClientVote { enabled, value };

        let current = state
            .clients
            .vote(id)
            .ok_or_else(|| VoteError::InvalidClient(client.to_string()))?;
        if current == ballot && state.voted_on {
            trace!(votable = %state.name, client, enabled, value, "ignoring repeated vote");
            return Ok(());
        }

        let req = VoteRequest {
            state: &*state,
            client,
            enabled,
            value,
            step,
        };
        votable.checks.run(&req).map_err(|source| {
            warn!(votable = %state.name, client, enabled, value, error = %source, "vote rejected");
            VoteError::ValidationRejected {
                client: client.to_string(),
                source,
            }
        })?;

        if !state.clients.set_vote(id, ballot) {
            return Err(VoteError::InvalidClient(client.to_string()));
        }
        debug!(votable = %state.name, client, client_id = id.index(), enabled, value, "voting");

        let election = elect(state.kind, &state.clients, &state.map, None, Some(id));

        let mut rc = Ok(());
        if !state.voted_on || election.value != state.effective_result {
            state.effective_result = election.value;
            state.effective_client = election.client;
            debug!(
                votable = %state.name,
                result = ?election.value,
                client = %NameDisplay(state.clients.name(election.client)),
                "effective vote changed"
            );
            if !state.force_active && state.override_vote.is_none() {
                let decision = Decision {
                    value: election.value,
                    client: state.clients.name(election.client),
                    step,
                };
                rc = notify(&mut **callback, &*state, decision);
            }
        } else if election.client != state.effective_client {
            state.effective_client = election.client;
            debug!(
                votable = %state.name,
                result = ?election.value,
                client = %NameDisplay(state.clients.name(election.client)),
                "effective client changed"
            );
        }

        state.voted_on = true;
        rc
    }

    /// Engage or release an override that preempts the election.
    ///
    /// Engaging only sticks if the callback accepts the value; releasing always
    /// clears the override and tells the callback the election's result.
    /// While force is active only the recorded override changes.
    pub fn vote_override(&mut self, client: &str, enabled: bool, value: i64, step: bool) -> Result<(), VoteError> {
        self.client_name_ok(client)?;
        let Inner { state, callback } = &mut *self.inner;

        if state.force_active {
            state.override_vote = enabled.then(|| OverrideVote {
                client: client.to_string(),
                value,
            });
            debug!(votable = %state.name, client, enabled, value, "override recorded under force");
            return Ok(());
        }

        if enabled {
            let decision = Decision {
                value: Some(value),
                client: Some(client),
                step,
            };
            notify(&mut **callback, &*state, decision)?;
            state.override_vote = Some(OverrideVote {
                client: client.to_string(),
                value,
            });
            debug!(votable = %state.name, client, value, "override engaged");
            Ok(())
        } else {
            let decision = Decision {
                value: state.effective_result,
                client: state.clients.name(state.effective_client),
                step,
            };
            let rc = notify(&mut **callback, &*state, decision);
            state.override_vote = None;
            debug!(votable = %state.name, client, "override released");
            rc
        }
    }

    /// Re-apply the current decision through the callback.
    ///
    /// Reasserts the force value if engaged, otherwise the cached election
    /// result. An engaged override is not consulted.
    pub fn rerun_election(&mut self, step: bool) -> Result<(), VoteError> {
        let Inner { state, callback } = &mut *self.inner;

        let decision = if state.force_active {
            Decision {
                value: Some(state.force_val as i64),
                client: Some(state.cfg.force_client.as_str()),
                step: false,
            }
        } else {
            Decision {
                value: state.effective_result,
                client: state.clients.name(state.effective_client),
                step,
            }
        };
        notify(&mut **callback, &*state, decision)
    }

    /// Map `original` to `mapped` for MIN/MAX comparisons. Duplicates are ignored.
    pub fn add_map(&mut self, original: i64, mapped: i64) {
        let state = &mut self.inner.state;
        if !state.map.insert(original, mapped) {
            warn!(votable = %state.name, original, mapped, "duplicate mapping ignored");
        }
    }

    pub fn effective_result(&self) -> Option<i64> {
        self.inner.state.effective_result()
    }

    pub fn effective_value(&self) -> Result<i64, VoteError> {
        self.effective_result()
            .ok_or_else(|| VoteError::NoActiveVoter(self.inner.state.name.clone()))
    }

    pub fn effective_client(&self) -> Option<&str> {
        self.inner.state.effective_client()
    }

    pub fn effective_result_exclude_client(&self, client: &str) -> Option<i64> {
        self.inner.state.effective_result_exclude_client(client)
    }

    pub fn is_override_vote_enabled(&self) -> bool {
        self.inner.state.is_override_vote_enabled()
    }

    /// Whether `client` currently participates. Registers `client` if unseen.
    pub fn is_client_vote_enabled(&mut self, client: &str) -> Result<bool, VoteError> {
        self.client_name_ok(client)?;
        let state = &mut self.inner.state;
        let id = state.clients.get_or_create(&state.name, client)?;
        Ok(state.clients.vote(id).map(|v| v.enabled).unwrap_or(false))
    }

    /// Value `client` voted for, `None` if a MIN/MAX client is not enabled.
    /// Registers `client` if unseen.
    pub fn get_client_vote(&mut self, client: &str) -> Result<Option<i64>, VoteError> {
        self.client_name_ok(client)?;
        let state = &mut self.inner.state;
        let id = state.clients.get_or_create(&state.name, client)?;
        let vote = state
            .clients
            .vote(id)
            .ok_or_else(|| VoteError::InvalidClient(client.to_string()))?;

        if state.kind != ElectionKind::SetAny && !vote.enabled {
            return Ok(None);
        }
        Ok(Some(vote.value))
    }

    pub fn set_force_val(&mut self, val: u32) {
        let state = &mut self.inner.state;
        state.force_val = val;
        debug!(votable = %state.name, force_val = val, "force value set");
    }

    /// Toggle the force layer and push the now-authoritative value to the
    /// callback (force value, else override, else election).
    pub fn set_force_active(&mut self, active: bool) -> Result<(), VoteError> {
        let Inner { state, callback } = &mut *self.inner;
        state.force_active = active;
        debug!(votable = %state.name, active, force_val = state.force_val, "force layer toggled");

        let decision = if active {
            Decision {
                value: Some(state.force_val as i64),
                client: Some(state.cfg.force_client.as_str()),
                step: false,
            }
        } else if let Some(ov) = &state.override_vote {
            Decision {
                value: Some(ov.value),
                client: Some(ov.client.as_str()),
                step: false,
            }
        } else {
            Decision {
                value: state.effective_result,
                client: state.clients.name(state.effective_client),
                step: false,
            }
        };
        notify(&mut **callback, &*state, decision)
    }
}
