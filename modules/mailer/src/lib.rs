//! Alert email dispatch. One STARTTLS SMTP session per message, opened and
//! closed inside the send, so a failed send never leaks into the next
//! check. Send failures are logged and swallowed: the run continues and
//! the matches still land in the final report.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, warn};

use nodewatch_core::{NodeId, NodeInfo};

/// SMTP relay settings, always supplied via configuration.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Sends alert emails, or does nothing when sending is disabled
/// (`--skip-email` or no SMTP configuration).
#[derive(Debug)]
pub struct Mailer {
    smtp: Option<SmtpSettings>,
}

impl Mailer {
    pub fn new(smtp: Option<SmtpSettings>) -> Self {
        Mailer { smtp }
    }

    pub fn disabled() -> Self {
        Mailer { smtp: None }
    }

    /// Compose and send one alert. Subject becomes
    /// `Waggle Alert: <subject> [<n> Nodes]`.
    pub fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
        nodes: &BTreeSet<NodeId>,
        info: &BTreeMap<NodeId, NodeInfo>,
    ) {
        let Some(smtp) = &self.smtp else {
            info!("skip email set -- not sending message");
            return;
        };
        if recipients.is_empty() {
            warn!(subject, "no recipients configured for alert; not sending");
            return;
        }
        if let Err(err) = send(smtp, subject, body, recipients, nodes, info) {
            warn!(subject, error = %err, "failed to send alert email; continuing");
        }
    }
}

fn send(
    smtp: &SmtpSettings,
    subject: &str,
    body: &str,
    recipients: &[String],
    nodes: &BTreeSet<NodeId>,
    info: &BTreeMap<NodeId, NodeInfo>,
) -> Result<()> {
    let text = build_alert_body(body, nodes, info)?;

    let mut builder = Message::builder()
        .from(smtp.from.parse::<Mailbox>().context("bad sender address")?)
        .subject(format!("Waggle Alert: {subject} [{} Nodes]", nodes.len()));
    for recipient in recipients {
        builder = builder.to(recipient.parse::<Mailbox>().context("bad recipient address")?);
    }
    let message = builder.body(text)?;

    let transport = SmtpTransport::starttls_relay(&smtp.host)?
        .port(smtp.port)
        .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
        .build();
    transport.send(&message)?;
    Ok(())
}

/// Plain-text message: the body lead-in, a count line, and an embedded CSV
/// of the matched nodes' metadata. Nodes without an info record are skipped
/// with a warning rather than failing the whole message.
pub fn build_alert_body(
    body: &str,
    nodes: &BTreeSet<NodeId>,
    info: &BTreeMap<NodeId, NodeInfo>,
) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["node_id", "vsn", "rssh_port", "description", "location"])?;
    for node_id in nodes {
        match info.get(node_id) {
            Some(info) => writer.write_record([
                node_id.as_str(),
                info.vsn.as_str(),
                info.rssh_port.as_str(),
                info.description.as_str(),
                info.location.as_str(),
            ])?,
            None => warn!(node_id = %node_id, "matched node has no info record; omitting from email"),
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing embedded csv: {e}"))?;
    let table = String::from_utf8(bytes).context("embedded csv is not utf-8")?;
    Ok(format!("{body}\n\n{} Nodes\n\n{table}", nodes.len()))
}
