use serde::{Deserialize, Serialize};

use crate::clients::{ClientId, ClientTable};
use crate::error::VoteError;
use crate::value_map::ValueMap;

/// How a votable folds its clients' votes into one decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionKind {
    Min,
    Max,
    SetAny,
}

impl ElectionKind {
    /// Label used by the status dump.
    pub fn label(self) -> &'static str {
        match self {
            ElectionKind::Min => "Min",
            ElectionKind::Max => "Max",
            ElectionKind::SetAny => "Set_any",
        }
    }

    /// Result a freshly created votable reports before anyone votes.
    pub fn initial_result(self) -> Option<i64> {
        match self {
            ElectionKind::SetAny => Some(0),
            ElectionKind::Min | ElectionKind::Max => None,
        }
    }
}

impl TryFrom<i32> for ElectionKind {
    type Error = VoteError;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(ElectionKind::Min),
            1 => Ok(ElectionKind::Max),
            2 => Ok(ElectionKind::SetAny),
            other => Err(VoteError::InvalidKind(other)),
        }
    }
}

/// Outcome of one election run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Election {
    pub value: Option<i64>,
    pub client: Option<ClientId>,
}

/// Run the election of `kind` over `clients`.
///
/// `exclude` drops one client by name, for "what if I abstained" queries.
/// `voter` is only used by SET_ANY, which credits whoever triggered the run.
pub fn elect(
    kind: ElectionKind,
    clients: &ClientTable,
    map: &ValueMap,
    exclude: Option<&str>,
    voter: Option<ClientId>,
) -> Election {
    match kind {
        ElectionKind::SetAny => set_any(clients, exclude, voter),
        ElectionKind::Min => extremum(clients, map, exclude, |cand, best| cand < best),
        ElectionKind::Max => extremum(clients, map, exclude, |cand, best| cand > best),
    }
}

fn set_any(clients: &ClientTable, exclude: Option<&str>, voter: Option<ClientId>) -> Election {
    let any = clients
        .iter()
        .filter(|(_, name, _)| Some(*name) != exclude)
        .any(|(_, _, vote)| vote.enabled);

    Election {
        value: Some(any as i64),
        client: voter,
    }
}

// `better` is strict, so the earliest registered client keeps ties.
fn extremum<F>(clients: &ClientTable, map: &ValueMap, exclude: Option<&str>, better: F) -> Election
where
    F: Fn(i64, i64) -> bool,
{
    let mut best: Option<(i64, ClientId, i64)> = None;

    for (id, name, vote) in clients.iter() {
        if Some(name) == exclude || !vote.enabled {
            continue;
        }
        let cand = map.mapped(vote.value);
        match best {
            Some((mapped, _, _)) if !better(cand, mapped) => {}
            _ => best = Some((cand, id, vote.value)),
        }
    }

    match best {
        Some((_, id, raw)) => Election {
            value: Some(raw),
            client: Some(id),
        },
        None => Election::default(),
    }
}
