//! src/node.rs
//!
//! The node record: a plain value type describing one cluster member. No
//! behavior of its own — mutations happen only inside `NetworkMap` under its
//! lock (§4.1, §4.2).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A cluster member's advertised status.
///
/// `Pending` exists only for bookkeeping while a remote node's state is
/// still being assembled by the syncer (§3); it is never returned from a
/// `NetworkMap` read and never advertised over gossip (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Active,
    Down,
    Left,
}

impl Status {
    /// The lowercase ASCII wire representation used for the `status` gossip
    /// key (§6). `Pending` has no wire representation — callers must not
    /// advertise it.
    pub fn as_wire_str(&self) -> Option<&'static str> {
        match self {
            Status::Pending => None,
            Status::Active => Some("active"),
            Status::Down => Some("down"),
            Status::Left => Some("left"),
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_wire_str() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "pending"),
        }
    }
}

/// Error returned when a `status` gossip value does not match one of the
/// advertised terminal statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized status value: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "down" => Ok(Status::Down),
            "left" => Ok(Status::Left),
            // "pending" is never advertised (§6); treat it, and anything
            // else, as malformed.
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One cluster member, as known locally.
///
/// Equality and `Clone` are field-wise (§4.1 "Copy"); there is no other
/// behavior attached to this type. Invariants on any node handed back to a
/// caller of `NetworkMap` are enforced by `NetworkMap`, not by this type
/// itself — `Node` is happy to represent a transient, not-yet-visible
/// record (e.g. the syncer's pending buffer) with an empty address.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: String,
    pub status: Status,
    pub proxy_addr: String,
    pub admin_addr: String,
    pub endpoints: HashMap<String, u32>,
}

impl Node {
    /// A fresh node record with no addresses and no endpoints yet.
    pub fn new(id: impl Into<String>, status: Status) -> Self {
        Self {
            id: id.into(),
            status,
            proxy_addr: String::new(),
            admin_addr: String::new(),
            endpoints: HashMap::new(),
        }
    }

    /// Whether this record satisfies the invariants `NetworkMap` enforces
    /// on anything it exposes to subscribers/readers (§3): non-`Pending`
    /// status, both addresses present.
    pub fn meets_visibility_invariants(&self) -> bool {
        self.status.is_visible() && !self.proxy_addr.is_empty() && !self.admin_addr.is_empty()
    }

    /// Returns the listener count for `endpoint`, if any (count is always
    /// `>= 1`; zero-valued entries are never stored, §3).
    pub fn endpoint_count(&self, endpoint: &str) -> Option<u32> {
        self.endpoints.get(endpoint).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_strings() {
        for s in [Status::Active, Status::Down, Status::Left] {
            let wire = s.as_wire_str().unwrap();
            assert_eq!(Status::from_str(wire).unwrap(), s);
        }
    }

    #[test]
    fn pending_has_no_wire_representation() {
        assert_eq!(Status::Pending.as_wire_str(), None);
    }

    #[test]
    fn pending_is_rejected_as_an_incoming_wire_value() {
        assert!(Status::from_str("pending").is_err());
    }

    #[test]
    fn unknown_status_value_is_rejected() {
        assert!(Status::from_str("quiescent").is_err());
    }

    #[test]
    fn fresh_node_fails_visibility_invariants() {
        let node = Node::new("n1", Status::Active);
        assert!(!node.meets_visibility_invariants());
    }

    #[test]
    fn fully_populated_node_meets_visibility_invariants() {
        let mut node = Node::new("n1", Status::Active);
        node.proxy_addr = "10.0.0.1:8000".into();
        node.admin_addr = "10.0.0.1:8001".into();
        assert!(node.meets_visibility_invariants());
    }

    #[test]
    fn pending_node_never_meets_visibility_invariants_even_with_addresses() {
        let mut node = Node::new("n1", Status::Pending);
        node.proxy_addr = "10.0.0.1:8000".into();
        node.admin_addr = "10.0.0.1:8001".into();
        assert!(!node.meets_visibility_invariants());
    }
}
