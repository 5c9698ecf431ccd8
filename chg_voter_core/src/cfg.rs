use serde::{Deserialize, Serialize};

/// Client name reported while the debug force layer is engaged.
pub const DEBUG_FORCE_CLIENT: &str = "DEBUG_FORCE_CLIENT";

/// Per-votable limits, fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotableCfg {
    /// Maximum number of distinct client names a votable will track.
    pub capacity: usize,
    /// Longest accepted votable or client name, in bytes.
    pub max_name_len: usize,
    /// Name attributed to the force layer's value.
    pub force_client: String,
}

impl Default for VotableCfg {
    fn default() -> Self {
        Self {
            capacity: 32,
            max_name_len: 64,
            force_client: DEBUG_FORCE_CLIENT.to_string(),
        }
    }
}
