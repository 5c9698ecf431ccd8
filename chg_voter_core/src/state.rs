use crate::cfg::VotableCfg;
use crate::clients::{ClientId, ClientTable, ClientVote};
use crate::election::{elect, ElectionKind};
use crate::inspect::{ClientStatus, OverrideStatus, VotableStatus};
use crate::value_map::ValueMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct OverrideVote {
    pub client: String,
    pub value: i64,
}

/// Everything the primary lock of a votable protects.
///
/// Callbacks and checks get a shared reference to it while the lock is held,
/// so they can look at the votes without re-entering the votable.
#[derive(Debug)]
pub struct VotableState {
    pub(crate) name: String,
    pub(crate) kind: ElectionKind,
    pub(crate) cfg: VotableCfg,
    pub(crate) clients: ClientTable,
    pub(crate) map: ValueMap,
    pub(crate) effective_result: Option<i64>,
    pub(crate) effective_client: Option<ClientId>,
    pub(crate) override_vote: Option<OverrideVote>,
    pub(crate) voted_on: bool,
    pub(crate) force_active: bool,
    pub(crate) force_val: u32,
}

impl VotableState {
    pub(crate) fn new(name: String, kind: ElectionKind, cfg: VotableCfg) -> Self {
        Self {
            name,
            kind,
            clients: ClientTable::new(cfg.capacity),
            cfg,
            map: ValueMap::new(),
            effective_result: kind.initial_result(),
            effective_client: None,
            override_vote: None,
            voted_on: false,
            force_active: false,
            force_val: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElectionKind {
        self.kind
    }

    pub fn cfg(&self) -> &VotableCfg {
        &self.cfg
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn value_map(&self) -> &ValueMap {
        &self.map
    }

    pub fn voted_on(&self) -> bool {
        self.voted_on
    }

    /// Result with the force and override layers applied.
    pub fn effective_result(&self) -> Option<i64> {
        if self.force_active {
            return Some(self.force_val as i64);
        }
        if let Some(ov) = &self.override_vote {
            return Some(ov.value);
        }
        self.effective_result
    }

    /// Client credited with [`Self::effective_result`].
    pub fn effective_client(&self) -> Option<&str> {
        if self.force_active {
            return Some(self.cfg.force_client.as_str());
        }
        if let Some(ov) = &self.override_vote {
            return Some(ov.client.as_str());
        }
        self.clients.name(self.effective_client)
    }

    /// Cached result of the last election, ignoring force and override.
    pub fn election_result(&self) -> Option<i64> {
        self.effective_result
    }

    pub fn election_client(&self) -> Option<&str> {
        self.clients.name(self.effective_client)
    }

    /// Ballot of an already registered client. Does not register `client`.
    pub fn client_vote(&self, client: &str) -> Option<ClientVote> {
        self.clients.lookup(client).and_then(|id| self.clients.vote(id))
    }

    pub fn is_override_vote_enabled(&self) -> bool {
        self.override_vote.is_some()
    }

    pub fn override_vote(&self) -> Option<(&str, i64)> {
        self.override_vote
            .as_ref()
            .map(|ov| (ov.client.as_str(), ov.value))
    }

    /// What the result would be if `client` abstained. Mutates nothing.
    pub fn effective_result_exclude_client(&self, client: &str) -> Option<i64> {
        if self.force_active {
            return Some(self.force_val as i64);
        }
        if let Some(ov) = &self.override_vote {
            return Some(ov.value);
        }
        elect(self.kind, &self.clients, &self.map, Some(client), None).value
    }

    pub fn force_active(&self) -> bool {
        self.force_active
    }

    pub fn force_val(&self) -> u32 {
        self.force_val
    }

    pub fn status(&self) -> VotableStatus {
        VotableStatus {
            name: self.name.clone(),
            kind: self.kind,
            clients: self
                .clients
                .iter()
                .map(|(_, name, vote)| ClientStatus {
                    client: name.to_string(),
                    enabled: vote.enabled,
                    value: vote.value,
                })
                .collect(),
            effective_client: self.effective_client().map(str::to_string),
            effective_result: self.effective_result(),
            override_vote: self.override_vote.as_ref().map(|ov| OverrideStatus {
                client: ov.client.clone(),
                value: ov.value,
            }),
            force_active: self.force_active,
            force_val: self.force_val,
        }
    }
}
