//! Named registry of votables.
//!
//! Independently initialised subsystems find a shared votable by name through
//! one `VotableRegistry`. The registry is an ordinary value: a process keeps
//! one for its lifetime, tests build as many as they like.
//!
//! Names are sharded across a few mutexes (FNV-1a of the name) so lookups for
//! different votables rarely contend. A shard lock is held only for the map
//! operation itself, never across a votable lock or a callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use chg_voter_core::{ElectionKind, Inspectable, Votable, VotableCfg, VotableHandle, VotableStatus, VoteCallback, VoteError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryCfg {
    /// Number of name shards. `0` is treated as `1`.
    pub shards: usize,
    /// Limits given to votables created without an explicit cfg.
    pub votable: VotableCfg,
}

impl Default for RegistryCfg {
    fn default() -> Self {
        Self {
            shards: 4,
            votable: VotableCfg::default(),
        }
    }
}

/// Status of every registered votable, sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub votables: Vec<VotableStatus>,
}

#[derive(Default, Debug)]
struct Shard {
    votables: HashMap<String, VotableHandle>,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(name: &str, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(name) as usize) % shard_count
}

#[derive(Debug)]
pub struct VotableRegistry {
    cfg: RegistryCfg,
    shards: Vec<Mutex<Shard>>,
}

impl Default for VotableRegistry {
    fn default() -> Self {
        Self::new(RegistryCfg::default())
    }
}

impl VotableRegistry {
    pub fn new(cfg: RegistryCfg) -> Self {
        let count = cfg.shards.max(1);
        let mut shards = Vec::with_capacity(count);
        for _ in 0..count {
            shards.push(Mutex::new(Shard::default()));
        }
        Self { cfg, shards }
    }

    pub fn cfg(&self) -> &RegistryCfg {
        &self.cfg
    }

    fn shard(&self, name: &str) -> MutexGuard<'_, Shard> {
        let idx = shard_index(name, self.shards.len());
        self.shards[idx].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create and register a votable with the registry's default limits.
    pub fn create<C>(&self, name: &str, kind: ElectionKind, callback: C) -> Result<VotableHandle, VoteError>
    where
        C: VoteCallback + 'static,
    {
        self.create_with_cfg(name, kind, self.cfg.votable.clone(), callback)
    }

    /// Create and register a votable. Fails with `AlreadyExists` if `name` is taken.
    pub fn create_with_cfg<C>(
        &self,
        name: &str,
        kind: ElectionKind,
        cfg: VotableCfg,
        callback: C,
    ) -> Result<VotableHandle, VoteError>
    where
        C: VoteCallback + 'static,
    {
        let votable = Arc::new(Votable::new(name, kind, cfg, callback)?);

        let mut shard = self.shard(name);
        if shard.votables.contains_key(name) {
            return Err(VoteError::AlreadyExists(name.to_string()));
        }
        shard.votables.insert(name.to_string(), votable.clone());
        drop(shard);

        debug!(votable = name, ?kind, "votable created");
        Ok(votable)
    }

    pub fn find(&self, name: &str) -> Option<VotableHandle> {
        self.shard(name).votables.get(name).cloned()
    }

    /// Unregister `name` and hand back the registry's handle.
    ///
    /// The name is free for reuse at once. Handles held elsewhere keep the
    /// votable alive; callers must stop using it themselves.
    pub fn destroy(&self, name: &str) -> Result<VotableHandle, VoteError> {
        let removed = self.shard(name).votables.remove(name);
        match removed {
            Some(v) => {
                debug!(votable = name, "votable destroyed");
                Ok(v)
            }
            None => Err(VoteError::NotFound(name.to_string())),
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            out.extend(guard.votables.keys().cloned());
        }
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).votables.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handles(&self) -> Vec<VotableHandle> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            out.extend(guard.votables.values().cloned());
        }
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Status of every votable, sorted by name.
    ///
    /// Each votable is locked in turn after the shard locks are released.
    pub fn snapshot(&self) -> Result<RegistrySnapshot, VoteError> {
        self.snapshot_filtered(|_| true)
    }

    /// Like [`Self::snapshot`], keeping only statuses `predicate` accepts.
    pub fn snapshot_filtered<F>(&self, mut predicate: F) -> Result<RegistrySnapshot, VoteError>
    where
        F: FnMut(&VotableStatus) -> bool,
    {
        let mut votables = Vec::new();
        for v in self.handles() {
            let st = v.status()?;
            if predicate(&st) {
                votables.push(st);
            }
        }
        Ok(RegistrySnapshot { votables })
    }

    /// Unregister everything. Returns how many votables were dropped.
    pub fn shutdown(&self) -> usize {
        let mut dropped = 0;
        for shard in &self.shards {
            let mut guard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            dropped += guard.votables.len();
            guard.votables.clear();
        }
        debug!(dropped, "votable registry shut down");
        dropped
    }
}
