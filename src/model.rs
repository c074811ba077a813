//! Wire and on-disk types shared by the node store, the coordinator, and the HTTP handlers.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A bundle's lifecycle state. Canceled and Deleted are sticky terminal states: once reached,
/// `store::delete` leaves the descriptor in place (as a tombstone) rather than removing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum Status {
    Unknown,
    Started,
    InProgress,
    Done,
    Canceled,
    Deleted,
}

impl Status {
    /// `Unknown` counts as terminal here: a remote node reporting an unreadable descriptor is
    /// never going to resolve on its own, so a poller should stop and report failure rather than
    /// spin until its deadline.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled | Self::Deleted | Self::Unknown)
    }

    pub fn is_tombstone(self) -> bool {
        matches!(self, Self::Canceled | Self::Deleted)
    }
}

/// The on-disk / wire descriptor for one bundle (node-local or cluster-aggregate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    #[serde(default)]
    pub size: u64,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Bundle {
    pub fn started(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            size: 0,
            status: Status::Started,
            started_at: now,
            stopped_at: None,
            errors: Vec::new(),
        }
    }
}

/// A cluster member the coordinator can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub role: NodeRole,
    pub ip: IpAddr,
    #[serde(default)]
    pub leader: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeRole {
    Master,
    Agent,
}

/// One node's terminal outcome for a bundle, as published on the coordinator's status channel.
#[derive(Debug, Clone)]
pub struct BundleStatus {
    pub id: String,
    pub node: Node,
    pub done: bool,
    pub err: Option<String>,
}

/// A single endpoint to fetch on behalf of one node, as consumed by the fetcher.
#[derive(Debug, Clone)]
pub struct EndpointFetchRequest {
    pub url: String,
    pub node: Node,
    pub filename: String,
}

/// Per-request progress published by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchStatusUpdate {
    pub url: String,
    pub error: Option<String>,
}

/// The body of a create request, `{"type": "local"}` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBundleRequest {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for CreateBundleRequest {
    fn default() -> Self {
        Self {
            kind: "local".to_string(),
        }
    }
}
