//! Text endpoints for poking at votables from a shell or test harness.
//!
//! Each votable exposes three entries, addressed as `"<votable>/<entry>"`:
//! - `status`: read-only dump of every client plus the effective decision
//! - `force_val`: the value pinned by the force layer
//! - `force_active`: `1` engages the force layer, `0` releases it
//!
//! Values are read back as newline-terminated decimal integers. Writes accept
//! a decimal, `0x` hex or leading-`0` octal integer with surrounding
//! whitespace ignored.

use std::fmt::Write as _;

use chg_voter_core::{result_or_einval, Inspectable, VotableStatus, VoteError};

use crate::registry::VotableRegistry;

#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error("no such debug entry: {0}")]
    NotFound(String),

    #[error("debug entry {0} is read-only")]
    ReadOnly(String),

    #[error("cannot parse {input:?} for {entry}")]
    Parse { entry: &'static str, input: String },

    #[error(transparent)]
    Vote(#[from] VoteError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugEntry {
    Status,
    ForceVal,
    ForceActive,
}

impl DebugEntry {
    pub const ALL: [DebugEntry; 3] = [DebugEntry::Status, DebugEntry::ForceVal, DebugEntry::ForceActive];

    pub fn name(self) -> &'static str {
        match self {
            DebugEntry::Status => "status",
            DebugEntry::ForceVal => "force_val",
            DebugEntry::ForceActive => "force_active",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == s)
    }
}

/// Render a status dump: one line per client, then the effective decision.
pub fn format_status(st: &VotableStatus) -> String {
    let mut out = String::new();
    for c in &st.clients {
        let _ = writeln!(
            out,
            "{}: {}:\t\t\ten={} v={}",
            st.name, c.client, c.enabled as u8, c.value
        );
    }
    let _ = writeln!(
        out,
        "{}: effective={} type={} v={}",
        st.name,
        st.effective_client.as_deref().unwrap_or("none"),
        st.kind.label(),
        result_or_einval(st.effective_result)
    );
    out
}

/// Parse an unsigned integer the way the kernel's `kstrtou32(.., 0, ..)` does.
///
/// One leading `+` is allowed; no sign may follow it or the radix prefix.
pub fn parse_u32(input: &str) -> Option<u32> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    if digits.starts_with(['+', '-']) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

pub fn read_entry<I: Inspectable + ?Sized>(v: &I, entry: DebugEntry) -> Result<String, DebugError> {
    Ok(match entry {
        DebugEntry::Status => format_status(&v.status()?),
        DebugEntry::ForceVal => format!("{}\n", v.force_val()?),
        DebugEntry::ForceActive => format!("{}\n", v.force_active()? as u8),
    })
}

pub fn write_entry<I: Inspectable + ?Sized>(v: &I, entry: DebugEntry, input: &str) -> Result<(), DebugError> {
    let parse = |input: &str| {
        parse_u32(input).ok_or_else(|| DebugError::Parse {
            entry: entry.name(),
            input: input.to_string(),
        })
    };

    match entry {
        DebugEntry::Status => Err(DebugError::ReadOnly(format!("{}/{}", v.name(), entry.name()))),
        DebugEntry::ForceVal => {
            v.set_force_val(parse(input)?)?;
            Ok(())
        }
        DebugEntry::ForceActive => {
            v.set_force_active(parse(input)? != 0)?;
            Ok(())
        }
    }
}

/// Path-addressed view of every votable in a registry.
pub struct DebugFs<'a> {
    registry: &'a VotableRegistry,
}

impl<'a> DebugFs<'a> {
    pub fn new(registry: &'a VotableRegistry) -> Self {
        Self { registry }
    }

    fn resolve(&self, path: &str) -> Result<(chg_voter_core::VotableHandle, DebugEntry), DebugError> {
        let not_found = || DebugError::NotFound(path.to_string());
        let (name, entry) = path.rsplit_once('/').ok_or_else(not_found)?;
        let entry = DebugEntry::from_name(entry).ok_or_else(not_found)?;
        let votable = self.registry.find(name).ok_or_else(not_found)?;
        Ok((votable, entry))
    }

    pub fn read(&self, path: &str) -> Result<String, DebugError> {
        let (votable, entry) = self.resolve(path)?;
        read_entry(&*votable, entry)
    }

    pub fn write(&self, path: &str, input: &str) -> Result<(), DebugError> {
        let (votable, entry) = self.resolve(path)?;
        write_entry(&*votable, entry, input)
    }

    /// Every entry path, sorted by votable name.
    pub fn list(&self) -> Vec<String> {
        self.registry
            .names()
            .into_iter()
            .flat_map(|name| DebugEntry::ALL.into_iter().map(move |e| format!("{}/{}", name, e.name())))
            .collect()
    }
}
