//! The check battery: a fixed, ordered table of declarative rules plus one
//! generic evaluator, and the aggregator that folds every check's matches
//! into the per-node error map.
//!
//! Checks are pure set filters over the fetched snapshot. They never talk
//! to the network or the mailer; the caller decides what to do with a
//! non-empty match set.

mod rules;

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use tracing::warn;

use nodewatch_core::{Measurement, NodeId, NodeStatus, Snapshot};

pub use rules::{Audience, Cmp, Rule, RuleKind, Tier, RULES};

/// Run one rule against the snapshot and return the matching node ids.
///
/// The set is ordered, so a rule's matches always come out the same way for
/// the same snapshot.
pub fn evaluate(rule: &Rule, snapshot: &Snapshot) -> BTreeSet<NodeId> {
    match &rule.kind {
        RuleKind::Connectivity(tier) => connectivity(*tier, &snapshot.status),
        RuleKind::Threshold { subsystem, sensor, parameter, cmp, threshold } => snapshot
            .measurements
            .iter()
            .filter(|m| subsystem.map_or(true, |s| m.subsystem == s))
            .filter(|m| sensor.map_or(true, |s| m.sensor == s))
            .filter(|m| m.parameter == *parameter)
            .filter(|m| cmp.matches(m.value_hrf, *threshold))
            .map(|m| m.node_id.clone())
            .collect(),
        RuleKind::BothBoardsZero { parameter } => {
            let ep = zero_readings("ep", parameter, &snapshot.measurements);
            let nc = zero_readings("nc", parameter, &snapshot.measurements);
            ep.intersection(&nc).cloned().collect()
        }
        RuleKind::MissingSubsystem { subsystem, capability } => {
            missing_subsystem(subsystem, *capability, snapshot)
        }
    }
}

/// Nodes nominally up whose connection chain breaks at the given tier.
/// The tiers are mutually exclusive: a node missing SSH is never also
/// reported for RMQ or data frames.
fn connectivity(tier: Tier, status: &[NodeStatus]) -> BTreeSet<NodeId> {
    status
        .iter()
        .filter(|n| n.opmode == "up")
        .filter(|n| match tier {
            Tier::NoSsh => !n.ssh_connection,
            Tier::NoRmq => n.ssh_connection && !n.rmq_connection,
            Tier::NoFrames => n.ssh_connection && n.rmq_connection && !n.data_frames,
        })
        .map(|n| n.node_id.clone())
        .collect()
}

fn zero_readings(subsystem: &str, parameter: &str, measurements: &[Measurement]) -> BTreeSet<NodeId> {
    measurements
        .iter()
        .filter(|m| m.subsystem == subsystem && m.parameter == parameter)
        .filter(|m| m.value_hrf == Some(0.0))
        .map(|m| m.node_id.clone())
        .collect()
}

/// Nodes that are up and streaming (optionally gated on a bracketed
/// capability code in their description) but have no measurement at all
/// for the given subsystem.
fn missing_subsystem(
    subsystem: &str,
    capability: Option<&str>,
    snapshot: &Snapshot,
) -> BTreeSet<NodeId> {
    let cap_regex = capability.map(|code| Regex::new(&format!(r"\[.*{code}.*\]")).unwrap());

    let expected: BTreeSet<NodeId> = snapshot
        .status
        .iter()
        .filter(|n| n.opmode == "up" && n.data_frames)
        .filter(|n| match &cap_regex {
            None => true,
            Some(re) => match snapshot.info.get(&n.node_id) {
                Some(info) => re.is_match(&info.description),
                None => {
                    warn!(node_id = %n.node_id, "status row has no info record; skipping");
                    false
                }
            },
        })
        .map(|n| n.node_id.clone())
        .collect();

    let reporting: BTreeSet<NodeId> = snapshot
        .measurements
        .iter()
        .filter(|m| m.subsystem == subsystem)
        .map(|m| m.node_id.clone())
        .collect();

    expected.difference(&reporting).cloned().collect()
}

/// Per-node error labels in the order the checks fired, keyed in
/// first-seen order. Built once per run, read once by the report writer.
#[derive(Debug, Default)]
pub struct NodeErrorMap {
    order: Vec<NodeId>,
    labels: HashMap<NodeId, Vec<&'static str>>,
}

impl NodeErrorMap {
    pub fn record(&mut self, nodes: &BTreeSet<NodeId>, label: &'static str) {
        use std::collections::hash_map::Entry;
        for node_id in nodes {
            match self.labels.entry(node_id.clone()) {
                Entry::Occupied(mut e) => e.get_mut().push(label),
                Entry::Vacant(e) => {
                    self.order.push(node_id.clone());
                    e.insert(vec![label]);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &[&'static str])> {
        self.order.iter().map(|id| (id, self.labels[id].as_slice()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewatch_core::{NodeInfo, NodeStatus};
    use time::macros::datetime;

    fn info(id: &str, description: &str) -> NodeInfo {
        NodeInfo {
            node_id: id.into(),
            vsn: "004".into(),
            rssh_port: "50052".into(),
            opmode: "up".into(),
            project: "AoT_Chicago".into(),
            description: description.into(),
            location: "State St & Jackson Blvd Chicago IL".into(),
        }
    }

    fn status(id: &str, opmode: &str, ssh: bool, rmq: bool, frames: bool) -> NodeStatus {
        NodeStatus {
            node_id: id.into(),
            opmode: opmode.into(),
            ssh_connection: ssh,
            rmq_connection: rmq,
            data_frames: frames,
        }
    }

    fn meas(id: &str, subsystem: &str, sensor: &str, parameter: &str, hrf: Option<f64>) -> Measurement {
        Measurement {
            node_id: id.into(),
            timestamp: datetime!(2019-07-29 12:23:34),
            subsystem: subsystem.into(),
            sensor: sensor.into(),
            parameter: parameter.into(),
            value_raw: hrf,
            value_hrf: hrf,
        }
    }

    fn rule(label: &str) -> &'static Rule {
        RULES.iter().find(|r| r.label == label).expect("known label")
    }

    fn ids(set: &BTreeSet<NodeId>) -> Vec<&str> {
        set.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn table_is_fixed_and_labels_unique() {
        assert_eq!(RULES.len(), 38);
        let labels: BTreeSet<&str> = RULES.iter().map(|r| r.label).collect();
        assert_eq!(labels.len(), RULES.len());
        // every alert goes at least to the operators
        assert!(RULES.iter().all(|r| r.audience.contains(&Audience::Operators)));
    }

    #[test]
    fn connectivity_tiers_are_exclusive() {
        let snapshot = Snapshot {
            status: vec![
                status("n1", "up", false, false, false),
                status("n2", "up", true, false, false),
                status("n3", "up", true, true, false),
                status("n4", "up", true, true, true),
                status("n5", "testing", false, false, false),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(rule("No SSH Conn"), &snapshot)), ["n1"]);
        assert_eq!(ids(&evaluate(rule("No RMQ Conn"), &snapshot)), ["n2"]);
        assert_eq!(ids(&evaluate(rule("No Data Frames"), &snapshot)), ["n3"]);
    }

    #[test]
    fn uptime_threshold_is_strict() {
        let snapshot = Snapshot {
            measurements: vec![
                meas("n2", "nc", "uptime", "uptime", Some(42.0)),
                meas("n3", "nc", "uptime", "uptime", Some(900.0)),
                meas("n4", "ep", "uptime", "uptime", Some(42.0)),
                meas("n5", "nc", "uptime", "uptime", None),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(rule("Rebooted NC"), &snapshot)), ["n2"]);
        assert_eq!(ids(&evaluate(rule("Rebooted EP"), &snapshot)), ["n4"]);
    }

    #[test]
    fn camera_down_needs_both_boards() {
        let snapshot = Snapshot {
            measurements: vec![
                meas("n3", "ep", "camera", "bcam", Some(0.0)),
                meas("n3", "nc", "camera", "bcam", Some(1.0)),
                meas("n6", "ep", "camera", "bcam", Some(0.0)),
                meas("n6", "nc", "camera", "bcam", Some(0.0)),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(rule("BCam Down"), &snapshot)), ["n6"]);
    }

    #[test]
    fn device_threshold_ignores_absent_values() {
        let snapshot = Snapshot {
            measurements: vec![
                meas("n1", "nc", "device", "wwan", Some(0.0)),
                meas("n2", "nc", "device", "wwan", Some(1.0)),
                meas("n3", "nc", "device", "wwan", None),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(rule("WWAN Down"), &snapshot)), ["n1"]);
    }

    #[test]
    fn fail_count_threshold_is_inclusive() {
        let snapshot = Snapshot {
            measurements: vec![
                meas("n1", "nc", "wagman_fc", "nc", Some(3.0)),
                meas("n2", "nc", "wagman_fc", "nc", Some(2.0)),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(rule("NC High FC"), &snapshot)), ["n1"]);
    }

    #[test]
    fn disk_usage_scopes_to_board_and_partition() {
        let snapshot = Snapshot {
            measurements: vec![
                meas("n1", "nc", "disk_used_ratio", "boot", Some(0.85)),
                meas("n2", "ep", "disk_used_ratio", "boot", Some(0.95)),
                meas("n3", "nc", "disk_used_ratio", "root", Some(0.95)),
                meas("n4", "nc", "disk_used_ratio", "boot", Some(0.5)),
            ],
            ..Default::default()
        };
        assert_eq!(ids(&evaluate(rule("NC Boot High Disk Usage"), &snapshot)), ["n1"]);
        assert_eq!(ids(&evaluate(rule("NC Root High Disk Usage"), &snapshot)), ["n3"]);
        assert_eq!(ids(&evaluate(rule("EP Boot High Disk Usage"), &snapshot)), ["n2"]);
    }

    #[test]
    fn missing_subsystem_without_gate_covers_all_streaming_nodes() {
        let snapshot = Snapshot {
            info: [("n1", ""), ("n2", "")]
                .into_iter()
                .map(|(id, desc)| (NodeId::new(id), info(id, desc)))
                .collect(),
            status: vec![
                status("n1", "up", true, true, true),
                status("n2", "up", true, true, true),
                status("n3", "up", true, true, false),
            ],
            measurements: vec![meas("n1", "metsense", "htu21d", "temperature", Some(28.45))],
        };
        // n2 streams but has no metsense rows; n3 is not streaming
        assert_eq!(ids(&evaluate(rule("Missing Metsense Data"), &snapshot)), ["n2"]);
    }

    #[test]
    fn capability_gate_reads_the_description() {
        let snapshot = Snapshot {
            info: [
                ("n1", "AoT Chicago (S) [C]"),
                ("n2", "AoT Chicago (S)"),
                ("n3", "AoT Chicago (S) [C A]"),
            ]
            .into_iter()
            .map(|(id, desc)| (NodeId::new(id), info(id, desc)))
            .collect(),
            status: vec![
                status("n1", "up", true, true, true),
                status("n2", "up", true, true, true),
                status("n3", "up", true, true, true),
            ],
            measurements: vec![meas("n3", "chemsense", "co", "concentration", Some(1.0))],
        };
        // n1 carries [C] and reports nothing; n2 has no chemsense capability;
        // n3 carries [C] but is reporting
        assert_eq!(ids(&evaluate(rule("Missing Chemsense Data"), &snapshot)), ["n1"]);
    }

    #[test]
    fn image_classifier_gate_matches_cls_token() {
        let snapshot = Snapshot {
            info: [("n1", "AoT Chicago [Cls]"), ("n2", "AoT Chicago [C]")]
                .into_iter()
                .map(|(id, desc)| (NodeId::new(id), info(id, desc)))
                .collect(),
            status: vec![
                status("n1", "up", true, true, true),
                status("n2", "up", true, true, true),
            ],
            measurements: vec![],
        };
        assert_eq!(ids(&evaluate(rule("Missing Img Data"), &snapshot)), ["n1"]);
    }

    #[test]
    fn aggregation_preserves_check_order() {
        let mut map = NodeErrorMap::default();
        let c1: BTreeSet<NodeId> = ["a"].into_iter().map(NodeId::new).collect();
        let c2: BTreeSet<NodeId> = ["a", "b"].into_iter().map(NodeId::new).collect();
        map.record(&c1, "C1-label");
        map.record(&c2, "C2-label");

        let rows: Vec<_> = map.iter().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.as_str(), "a");
        assert_eq!(rows[0].1, ["C1-label", "C2-label"]);
        assert_eq!(rows[1].0.as_str(), "b");
        assert_eq!(rows[1].1, ["C2-label"]);
    }
}
