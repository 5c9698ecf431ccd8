use serde::{Deserialize, Serialize};

use crate::error::VoteError;

/// Dense index of a client within one votable, assigned on first use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub(crate) usize);

impl ClientId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One client's current ballot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientVote {
    pub enabled: bool,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub(crate) struct ClientSlot {
    pub name: String,
    pub vote: ClientVote,
}

/// Fixed-capacity name -> id table. Ids are never reused or released.
#[derive(Clone, Debug)]
pub struct ClientTable {
    slots: Vec<ClientSlot>,
    capacity: usize,
}

impl ClientTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Find a registered client without creating it.
    pub fn lookup(&self, name: &str) -> Option<ClientId> {
        self.slots.iter().position(|s| s.name == name).map(ClientId)
    }

    /// Resolve `name`, registering it in the next free slot if unseen.
    ///
    /// `votable` only labels the error.
    pub fn get_or_create(&mut self, votable: &str, name: &str) -> Result<ClientId, VoteError> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }
        if self.slots.len() >= self.capacity {
            return Err(VoteError::CapacityExceeded {
                votable: votable.to_string(),
                client: name.to_string(),
                capacity: self.capacity,
            });
        }

        let mut owned = String::new();
        owned
            .try_reserve_exact(name.len())
            .map_err(|_| VoteError::OutOfMemory(name.to_string()))?;
        owned.push_str(name);
        self.slots
            .try_reserve(1)
            .map_err(|_| VoteError::OutOfMemory(name.to_string()))?;

        self.slots.push(ClientSlot {
            name: owned,
            vote: ClientVote::default(),
        });
        Ok(ClientId(self.slots.len() - 1))
    }

    pub fn name(&self, id: Option<ClientId>) -> Option<&str> {
        id.and_then(|id| self.slots.get(id.0)).map(|s| s.name.as_str())
    }

    pub fn vote(&self, id: ClientId) -> Option<ClientVote> {
        self.slots.get(id.0).map(|s| s.vote)
    }

    pub(crate) fn set_vote(&mut self, id: ClientId, vote: ClientVote) -> bool {
        match self.slots.get_mut(id.0) {
            Some(slot) => {
                slot.vote = vote;
                true
            }
            None => false,
        }
    }

    /// Registered clients in id (registration) order.
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &str, ClientVote)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (ClientId(i), s.name.as_str(), s.vote))
    }
}
