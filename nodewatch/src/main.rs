use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use analysis::NodeErrorMap;
use mailer::Mailer;
use nodewatch_core::Snapshot;

mod config;
mod report;

#[derive(Debug, Parser)]
#[command(name = "nodewatch", version, about = "Waggle fleet condition checks and alert emails")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./nodewatch.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Evaluate every check but do not send alert emails
    #[arg(long, default_value_t = false)]
    skip_email: bool,
}

fn main() -> Result<()> {
    // progress goes to stderr; stdout carries only the report csv
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    let mailer = if cli.skip_email {
        info!("skipping sending email");
        Mailer::disabled()
    } else if let Some(smtp) = &cfg.smtp {
        Mailer::new(Some(smtp.to_settings()))
    } else {
        warn!("no smtp configuration; alert emails disabled");
        Mailer::disabled()
    };

    let snapshot = fetch_snapshot(&cfg)?;
    info!(
        nodes = snapshot.info.len(),
        status_rows = snapshot.status.len(),
        measurements = snapshot.measurements.len(),
        "snapshot fetched"
    );

    let mut errors = NodeErrorMap::default();
    for rule in analysis::RULES {
        info!(check = rule.label, "running check");
        let matches = analysis::evaluate(rule, &snapshot);
        if matches.is_empty() {
            info!("... no matches -- not sending alert email");
        } else {
            info!(matched = matches.len(), "... matched nodes -- sending alert email");
            let recipients = cfg.recipients.resolve(rule.audience);
            mailer.send_alert(rule.subject, rule.body, &recipients, &matches, &snapshot.info);
        }
        errors.record(&matches, rule.label);
    }

    info!("building combined alerts csv");
    report::write_report(std::io::stdout().lock(), &errors, &snapshot.info)?;
    Ok(())
}

/// The three fetches, strictly in order; any transport or CSV-structure
/// failure aborts the run before a single check is evaluated.
fn fetch_snapshot(cfg: &config::Config) -> Result<Snapshot> {
    let client = reqwest::Client::builder()
        .user_agent(format!("nodewatch/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let info = beehive::fetch_node_info(&client, &cfg.urls.node_info).await?;
        let status = beehive::fetch_node_status(&client, &cfg.urls.node_status).await?;
        let measurements =
            beehive::fetch_recent_measurements(&client, &cfg.urls.downloads_index).await?;
        Ok(Snapshot { info, status, measurements })
    })
}
