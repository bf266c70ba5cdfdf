//! Shared data model for the nodewatch pipeline.
//!
//! Everything here is a read-only snapshot of the fleet at fetch time: the
//! fetcher builds these tables once per run and the checks only ever borrow
//! them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};
use time::PrimitiveDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// A node's 16-character lowercase hex identifier.
///
/// The recent-data CSVs publish a shortened id; [`NodeId::from_short`]
/// restores the `0000` prefix so every table keys the same way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        let mut id = id.into();
        id.make_ascii_lowercase();
        NodeId(id)
    }

    /// Restore the `0000` prefix dropped by the recent-data CSVs.
    pub fn from_short(id: &str) -> Self {
        NodeId::new(format!("0000{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::new(s)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(NodeId::new(String::deserialize(deserializer)?))
    }
}

/// One row of the node-info CSV: static metadata per physical node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    pub vsn: String,
    pub rssh_port: String,
    pub opmode: String,
    pub project: String,
    pub description: String,
    pub location: String,
}

/// One row of the node-status CSV: current connectivity per node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub opmode: String,
    #[serde(deserialize_with = "de_flag")]
    pub ssh_connection: bool,
    #[serde(deserialize_with = "de_flag")]
    pub rmq_connection: bool,
    #[serde(deserialize_with = "de_flag")]
    pub data_frames: bool,
}

/// One telemetry reading. Values are `None` where the feed published `NA`.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub node_id: NodeId,
    pub timestamp: PrimitiveDateTime,
    pub subsystem: String,
    pub sensor: String,
    pub parameter: String,
    pub value_raw: Option<f64>,
    pub value_hrf: Option<f64>,
}

/// The full per-run fetch result: the join surface for every check.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub info: BTreeMap<NodeId, NodeInfo>,
    pub status: Vec<NodeStatus>,
    pub measurements: Vec<Measurement>,
}

/// Status-flag coercion: the feed writes `true`/`false` in assorted casings,
/// and anything else counts as false.
pub fn truthy(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("true")
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(truthy(&s))
}
