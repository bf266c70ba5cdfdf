//! Download and decode the Beehive CSV snapshots: node info, node status,
//! and the recent telemetry CSVs linked from the downloads index page.
//!
//! Transport and parsing are split so the parsers can be exercised on plain
//! strings. Any transport error or structurally malformed CSV is fatal to
//! the caller; only individual unparsable measurement rows are dropped.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use time::macros::format_description;
use time::PrimitiveDateTime;
use tracing::{debug, info, warn};

use nodewatch_core::{Measurement, NodeId, NodeInfo, NodeStatus};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Download the node-info CSV and key it by node id.
pub async fn fetch_node_info(
    client: &reqwest::Client,
    url: &str,
) -> Result<BTreeMap<NodeId, NodeInfo>, FetchError> {
    info!("downloading info csv");
    let body = get_text(client, url).await?;
    parse_node_info(&body)
}

/// Download the node-status CSV, coercing the connection flags to booleans.
pub async fn fetch_node_status(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<NodeStatus>, FetchError> {
    info!("downloading status csv");
    let body = get_text(client, url).await?;
    parse_node_status(&body)
}

/// Download every `.complete.recent.csv` linked from the downloads index
/// page and concatenate their rows in discovery order.
pub async fn fetch_recent_measurements(
    client: &reqwest::Client,
    index_url: &str,
) -> Result<Vec<Measurement>, FetchError> {
    info!("downloading recent data csvs");
    let index = get_text(client, index_url).await?;

    let mut measurements = Vec::new();
    for url in extract_recent_links(&index) {
        debug!(url, "downloading recent csv");
        let body = get_text(client, &url).await?;
        measurements.extend(parse_measurements(&body)?);
    }
    Ok(measurements)
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let res = client.get(url).send().await?.error_for_status()?;
    Ok(res.text().await?)
}

pub fn parse_node_info(body: &str) -> Result<BTreeMap<NodeId, NodeInfo>, FetchError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut nodes = BTreeMap::new();
    for row in reader.deserialize::<NodeInfo>() {
        let info = row?;
        nodes.insert(info.node_id.clone(), info);
    }
    Ok(nodes)
}

pub fn parse_node_status(body: &str) -> Result<Vec<NodeStatus>, FetchError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    reader.deserialize::<NodeStatus>().map(|row| Ok(row?)).collect()
}

/// Attribute-value scan of the index page, not HTML parsing: every href
/// target ending in `.complete.recent.csv`, in document order.
pub fn extract_recent_links(html: &str) -> Vec<String> {
    let href = Regex::new(r#"href=['"]?([^'" >]+)"#).unwrap();
    href.captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|target| target.ends_with(".complete.recent.csv"))
        .collect()
}

/// Shape of a recent-data CSV row before normalization.
#[derive(Debug, Deserialize)]
struct RawMeasurement {
    timestamp: String,
    node_id: String,
    subsystem: String,
    sensor: String,
    parameter: String,
    value_raw: String,
    value_hrf: String,
}

pub fn parse_measurements(body: &str) -> Result<Vec<Measurement>, FetchError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut measurements = Vec::new();
    for row in reader.deserialize::<RawMeasurement>() {
        if let Some(m) = normalize_measurement(row?) {
            measurements.push(m);
        }
    }
    Ok(measurements)
}

/// Per-row transform: pad the node id, parse the fixed timestamp pattern,
/// map `NA` values to absent. Returns `None` to drop the row when either
/// value or the timestamp is not parseable.
fn normalize_measurement(raw: RawMeasurement) -> Option<Measurement> {
    let pattern = format_description!("[year]/[month]/[day] [hour]:[minute]:[second]");
    let timestamp = match PrimitiveDateTime::parse(&raw.timestamp, &pattern) {
        Ok(ts) => ts,
        Err(_) => {
            warn!(timestamp = %raw.timestamp, "dropping row with unparsable timestamp");
            return None;
        }
    };
    Some(Measurement {
        node_id: NodeId::from_short(&raw.node_id),
        timestamp,
        subsystem: raw.subsystem,
        sensor: raw.sensor,
        parameter: raw.parameter,
        value_raw: parse_value(&raw.value_raw)?,
        value_hrf: parse_value(&raw.value_hrf)?,
    })
}

/// `NA` (any casing) is an absent value; anything else must be a float or
/// the row is dropped.
fn parse_value(s: &str) -> Option<Option<f64>> {
    if s.eq_ignore_ascii_case("na") {
        return Some(None);
    }
    match s.parse::<f64>() {
        Ok(v) => Some(Some(v)),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_CSV: &str = "\
node_id,vsn,rssh_port,opmode,project,description,location
0000001e0610ba46,004,50052,up,AoT_Chicago,AoT Chicago (S) [C],State St & Jackson Blvd Chicago IL
0000001e0610ba57,010,50011,testing,AoT_Chicago,AoT Chicago (S),Ohio St & Grand Ave Chicago IL
";

    const STATUS_CSV: &str = "\
node_id,vsn,project,rssh_port,opmode,ssh_connection,rmq_connection,data_frames,description
0000001e0610ba46,004,AoT_Chicago,50052,up,True,true,FALSE,AoT Chicago (S) [C]
0000001e0610ba57,010,AoT_Chicago,50011,up,false,maybe,true,AoT Chicago (S)
";

    #[test]
    fn info_rows_key_by_node_id() {
        let nodes = parse_node_info(INFO_CSV).unwrap();
        assert_eq!(nodes.len(), 2);
        let info = &nodes[&NodeId::new("0000001e0610ba46")];
        assert_eq!(info.vsn, "004");
        assert_eq!(info.description, "AoT Chicago (S) [C]");
    }

    #[test]
    fn info_rejects_ragged_rows() {
        let bad = "node_id,vsn,rssh_port,opmode,project,description,location\nabc,004\n";
        assert!(parse_node_info(bad).is_err());
    }

    #[test]
    fn status_flags_coerce_and_default_false() {
        let status = parse_node_status(STATUS_CSV).unwrap();
        assert!(status[0].ssh_connection);
        assert!(status[0].rmq_connection);
        assert!(!status[0].data_frames);
        // "maybe" is not a boolean literal, so it reads as false
        assert!(!status[1].ssh_connection);
        assert!(!status[1].rmq_connection);
        assert!(status[1].data_frames);
    }

    #[test]
    fn recent_links_follow_document_order() {
        let html = r#"
            <a href="https://example.org/a.complete.recent.csv">a</a>
            <a href='https://example.org/skip.csv'>skip</a>
            <a href=https://example.org/b.complete.recent.csv>b</a>
        "#;
        let links = extract_recent_links(html);
        assert_eq!(
            links,
            vec![
                "https://example.org/a.complete.recent.csv",
                "https://example.org/b.complete.recent.csv",
            ]
        );
    }

    #[test]
    fn measurement_rows_normalize() {
        let body = "\
timestamp,node_id,subsystem,sensor,parameter,value_raw,value_hrf
2019/07/29 12:23:34,001e0610ba46,metsense,htu21d,temperature,2845,28.45
2019/07/29 12:23:35,001e0610ba46,metsense,htu21d,humidity,NA,na
2019/07/29 12:23:36,001e0610ba46,metsense,htu21d,pressure,junk,10.0
not a date,001e0610ba46,metsense,htu21d,pressure,1,1
";
        let rows = parse_measurements(body).unwrap();
        // the junk-value row and the bad-timestamp row are both dropped
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].node_id, NodeId::new("0000001e0610ba46"));
        assert_eq!(rows[0].value_raw, Some(2845.0));
        assert_eq!(rows[0].value_hrf, Some(28.45));
        assert_eq!(rows[1].value_raw, None);
        assert_eq!(rows[1].value_hrf, None);
    }
}
