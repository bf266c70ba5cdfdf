//! The combined report: one CSV on stdout, one row per node that matched at
//! least one check, rows in first-seen order and labels in check order.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use tracing::warn;

use analysis::NodeErrorMap;
use nodewatch_core::{NodeId, NodeInfo};

pub fn write_report<W: Write>(
    out: W,
    errors: &NodeErrorMap,
    info: &BTreeMap<NodeId, NodeInfo>,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["node_id", "vsn", "rssh_port", "description", "location", "errors"])?;
    for (node_id, labels) in errors.iter() {
        let Some(info) = info.get(node_id) else {
            warn!(node_id = %node_id, "matched node has no info record; omitting from report");
            continue;
        };
        let joined = labels.join(", ");
        writer.write_record([
            node_id.as_str(),
            info.vsn.as_str(),
            info.rssh_port.as_str(),
            info.description.as_str(),
            info.location.as_str(),
            joined.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
