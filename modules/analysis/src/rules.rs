//! The declarative rule table. One entry per check, in the fixed order the
//! battery runs them; the generic evaluator in the crate root gives each
//! entry its semantics.

/// Who gets the alert email, resolved to addresses by configuration.
/// Operators are on every alert; the other groups are per-check additions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Operators,
    Infrastructure,
    Sensing,
    Vision,
}

/// Where the connectivity chain breaks for a nominally-up node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    NoSsh,
    NoRmq,
    NoFrames,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cmp {
    Lt,
    Ge,
    Eq,
}

impl Cmp {
    /// Absent readings never match, whatever the comparator.
    pub fn matches(self, value: Option<f64>, threshold: f64) -> bool {
        match (self, value) {
            (_, None) => false,
            (Cmp::Lt, Some(v)) => v < threshold,
            (Cmp::Ge, Some(v)) => v >= threshold,
            (Cmp::Eq, Some(v)) => v == threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Connectivity(Tier),
    Threshold {
        subsystem: Option<&'static str>,
        sensor: Option<&'static str>,
        parameter: &'static str,
        cmp: Cmp,
        threshold: f64,
    },
    /// Zero readings for the same parameter on both the EP and the NC.
    BothBoardsZero { parameter: &'static str },
    /// Up-and-streaming nodes (optionally gated on a bracketed capability
    /// code in the description) with no measurement for the subsystem.
    MissingSubsystem {
        subsystem: &'static str,
        capability: Option<&'static str>,
    },
}

#[derive(Debug)]
pub struct Rule {
    /// Short label recorded in the combined report.
    pub label: &'static str,
    /// Alert email subject (templated into "Waggle Alert: ... [n Nodes]").
    pub subject: &'static str,
    /// Alert email body lead-in.
    pub body: &'static str,
    pub audience: &'static [Audience],
    pub kind: RuleKind,
}

use Audience::{Infrastructure, Operators, Sensing, Vision};

const OPS: &[Audience] = &[Operators];
const OPS_INFRA: &[Audience] = &[Operators, Infrastructure];
const OPS_SENSING: &[Audience] = &[Operators, Sensing];
const OPS_SENSING_VISION: &[Audience] = &[Operators, Sensing, Vision];

/// Every check, in evaluation order. The report's per-node label sequences
/// follow this order, so reordering entries changes output.
pub static RULES: &[Rule] = &[
    // connectivity tiering
    Rule {
        label: "No SSH Conn",
        subject: "No SSH Conns",
        body: "The following nodes do not have an active SSH connection",
        audience: OPS_INFRA,
        kind: RuleKind::Connectivity(Tier::NoSsh),
    },
    Rule {
        label: "No RMQ Conn",
        subject: "No RMQ Conns",
        body: "The following nodes do not have an active RMQ connection",
        audience: OPS,
        kind: RuleKind::Connectivity(Tier::NoRmq),
    },
    Rule {
        label: "No Data Frames",
        subject: "No Data Frames",
        body: "The following nodes are not sending data frames",
        audience: OPS,
        kind: RuleKind::Connectivity(Tier::NoFrames),
    },
    // rebooted boards
    Rule {
        label: "Rebooted NC",
        subject: "Rebooted NC",
        body: "The following nodes have recently rebooted their node controller",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: Some("nc"),
            sensor: None,
            parameter: "uptime",
            cmp: Cmp::Lt,
            threshold: 600.0,
        },
    },
    Rule {
        label: "Rebooted EP",
        subject: "Rebooted EP",
        body: "The following nodes have recently rebooted their edge processor",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: Some("ep"),
            sensor: None,
            parameter: "uptime",
            cmp: Cmp::Lt,
            threshold: 600.0,
        },
    },
    // devices attached to both boards
    Rule {
        label: "BCam Down",
        subject: "BCam Down",
        body: "The following node bottom cameras are down",
        audience: OPS_SENSING_VISION,
        kind: RuleKind::BothBoardsZero { parameter: "bcam" },
    },
    Rule {
        label: "TCam Down",
        subject: "TCam Down",
        body: "The following node top cameras are down",
        audience: OPS_SENSING_VISION,
        kind: RuleKind::BothBoardsZero { parameter: "tcam" },
    },
    Rule {
        label: "Mic Down",
        subject: "Mic Down",
        body: "The following node microphones are down",
        audience: OPS_SENSING_VISION,
        kind: RuleKind::BothBoardsZero { parameter: "mic" },
    },
    // nc devices
    Rule {
        label: "WWAN Down",
        subject: "WWAN Down",
        body: "The following nodes have a down WWAN",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("device"),
            parameter: "wwan",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    Rule {
        label: "LAN Down",
        subject: "LAN Down",
        body: "The following nodes have a down LAN",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("device"),
            parameter: "lan",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    Rule {
        label: "Modem Down",
        subject: "Modem Down",
        body: "The following nodes have a down modem",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("device"),
            parameter: "modem",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    Rule {
        label: "Coresense Down",
        subject: "Coresense Down",
        body: "The following nodes have a down Coresense",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("device"),
            parameter: "coresense",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    Rule {
        label: "Wagman Down",
        subject: "Wagman Down",
        body: "The following nodes have a down Wagman",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("device"),
            parameter: "wagman",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    // wagman health
    Rule {
        label: "NC High FC",
        subject: "NC High Fail Count",
        body: "The following nodes have high fail counts for their node controllers",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("wagman_fc"),
            parameter: "nc",
            cmp: Cmp::Ge,
            threshold: 3.0,
        },
    },
    Rule {
        label: "EP High FC",
        subject: "EP High Fail Count",
        body: "The following nodes have high fail counts for their edge processors",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("wagman_fc"),
            parameter: "ep",
            cmp: Cmp::Ge,
            threshold: 3.0,
        },
    },
    Rule {
        label: "CS High FC",
        subject: "CS High Fail Count",
        body: "The following nodes have high fail counts for their Coresense boards",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("wagman_fc"),
            parameter: "cs",
            cmp: Cmp::Ge,
            threshold: 3.0,
        },
    },
    Rule {
        label: "Wagman Wiped",
        subject: "Wagman Got Wiped",
        body: "The following nodes have a wiped out Wagman",
        audience: OPS_INFRA,
        kind: RuleKind::Threshold {
            subsystem: None,
            sensor: Some("wagman_comm"),
            parameter: "up",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    Rule {
        label: "Stuck CS Bootloader",
        subject: "Stuck Coresense Bootloader",
        body: "The following nodes have a stuck Coresense bootloader",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: Some("nc"),
            sensor: None,
            parameter: "samba",
            cmp: Cmp::Eq,
            threshold: 1.0,
        },
    },
    // disk usage
    Rule {
        label: "NC Boot High Disk Usage",
        subject: "NC Boot Disk Full",
        body: "The following nodes have a (nearly) full boot disk",
        audience: OPS,
        kind: disk_rule("nc", "boot"),
    },
    Rule {
        label: "NC Root High Disk Usage",
        subject: "NC Root Disk Full",
        body: "The following nodes have a (nearly) full root disk",
        audience: OPS,
        kind: disk_rule("nc", "root"),
    },
    Rule {
        label: "NC RW High Disk Usage",
        subject: "NC RW Disk Full",
        body: "The following nodes have a (nearly) full rw disk",
        audience: OPS,
        kind: disk_rule("nc", "rw"),
    },
    Rule {
        label: "EP Boot High Disk Usage",
        subject: "EP Boot Disk Full",
        body: "The following nodes have a (nearly) full boot disk",
        audience: OPS,
        kind: disk_rule("ep", "boot"),
    },
    Rule {
        label: "EP Root High Disk Usage",
        subject: "EP Root Disk Full",
        body: "The following nodes have a (nearly) full root disk",
        audience: OPS,
        kind: disk_rule("ep", "root"),
    },
    Rule {
        label: "EP RW High Disk Usage",
        subject: "EP RW Disk Full",
        body: "The following nodes have a (nearly) full rw disk",
        audience: OPS,
        kind: disk_rule("ep", "rw"),
    },
    // on-board services
    Rule {
        label: "NC RMQ Unavailable",
        subject: "NC RMQ Service Unavailable",
        body: "The following nodes have an unavailable RMQ on their NC",
        audience: OPS,
        kind: service_rule("nc", "rabbitmq"),
    },
    Rule {
        label: "Coresense Unavailable",
        subject: "Coresense Service Unavailable",
        body: "The following nodes have an unavailable Coresense",
        audience: OPS,
        kind: service_rule("nc", "coresense"),
    },
    Rule {
        label: "EP RMQ Unavailable",
        subject: "EP RMQ Service Unavailable",
        body: "The following nodes have an unavailable RMQ on their EP",
        audience: OPS,
        kind: service_rule("ep", "rabbitmq"),
    },
    // plugins
    Rule {
        label: "NC Plugins Inactive",
        subject: "NC Plugins Inactive",
        body: "The following nodes have inactive NC plugins",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: Some("nc"),
            sensor: Some("plugins"),
            parameter: "active",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    Rule {
        label: "EP Plugins Inactive",
        subject: "EP Plugins Inactive",
        body: "The following nodes have inactive EP plugins",
        audience: OPS,
        kind: RuleKind::Threshold {
            subsystem: Some("ep"),
            sensor: Some("plugins"),
            parameter: "active",
            cmp: Cmp::Eq,
            threshold: 0.0,
        },
    },
    // expected-but-missing subsystems
    Rule {
        label: "Missing Metsense Data",
        subject: "Missing Metsense",
        body: "The following nodes are missing Metsense readings",
        audience: OPS_SENSING,
        kind: RuleKind::MissingSubsystem { subsystem: "metsense", capability: None },
    },
    Rule {
        label: "Missing Lightsense Data",
        subject: "Missing Lightsense",
        body: "The following nodes are missing Lightsense readings",
        audience: OPS_SENSING,
        kind: RuleKind::MissingSubsystem { subsystem: "lightsense", capability: None },
    },
    Rule {
        label: "Missing Chemsense Data",
        subject: "Missing Chemsense",
        body: "The following nodes are missing Chemsense readings",
        audience: OPS_SENSING,
        kind: RuleKind::MissingSubsystem { subsystem: "chemsense", capability: Some("C") },
    },
    Rule {
        label: "Missing Alphasense Data",
        subject: "Missing Alphasense",
        body: "The following nodes are missing Alphasense readings",
        audience: OPS_SENSING,
        kind: RuleKind::MissingSubsystem { subsystem: "alphasense", capability: Some("A") },
    },
    Rule {
        label: "Missing Plantower Data",
        subject: "Missing Plantower",
        body: "The following nodes are missing Plantower readings",
        audience: OPS_SENSING,
        kind: RuleKind::MissingSubsystem { subsystem: "plantower", capability: Some("P") },
    },
    Rule {
        label: "Missing Img Data",
        subject: "Missing Image Classifier Counts",
        body: "The following nodes are missing image classifier readings",
        audience: OPS_SENSING_VISION,
        kind: RuleKind::MissingSubsystem { subsystem: "image", capability: Some("Cls") },
    },
    Rule {
        label: "Missing SPL Data",
        subject: "Missing SPL Measurements",
        body: "The following nodes are missing SPL readings",
        audience: OPS_SENSING_VISION,
        kind: RuleKind::MissingSubsystem { subsystem: "spl", capability: Some("S") },
    },
    Rule {
        label: "Missing NC Telemetry",
        subject: "Missing NC Telemetry",
        body: "The following nodes are missing NC telemetry data",
        audience: OPS,
        kind: RuleKind::MissingSubsystem { subsystem: "nc", capability: Some("T") },
    },
    Rule {
        label: "Missing EP Telemetry",
        subject: "Missing EP Telemetry",
        body: "The following nodes are missing EP telemetry data",
        audience: OPS,
        kind: RuleKind::MissingSubsystem { subsystem: "ep", capability: Some("T") },
    },
];

const fn disk_rule(board: &'static str, partition: &'static str) -> RuleKind {
    RuleKind::Threshold {
        subsystem: Some(board),
        sensor: Some("disk_used_ratio"),
        parameter: partition,
        cmp: Cmp::Ge,
        threshold: 0.8,
    }
}

const fn service_rule(board: &'static str, service: &'static str) -> RuleKind {
    RuleKind::Threshold {
        subsystem: Some(board),
        sensor: Some("service_active"),
        parameter: service,
        cmp: Cmp::Eq,
        threshold: 0.0,
    }
}
