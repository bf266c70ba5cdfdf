//! YAML configuration: endpoint URLs, SMTP relay settings, and the named
//! recipient groups. Credentials and addresses live here, never in code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use analysis::Audience;

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub urls: Urls,
    pub smtp: Option<SmtpConfig>,
    pub recipients: Recipients,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Urls {
    pub node_info: String,
    pub node_status: String,
    pub downloads_index: String,
}

impl Default for Urls {
    fn default() -> Self {
        Urls {
            node_info:
                "https://www.mcs.anl.gov/research/projects/waggle/downloads/beehive1/node-info.csv"
                    .into(),
            node_status:
                "https://www.mcs.anl.gov/research/projects/waggle/downloads/beehive1/node-status.csv"
                    .into(),
            downloads_index:
                "https://www.mcs.anl.gov/research/projects/waggle/downloads/datasets/index.php"
                    .into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl SmtpConfig {
    pub fn to_settings(&self) -> mailer::SmtpSettings {
        mailer::SmtpSettings {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            from: self.from.clone(),
        }
    }
}

/// The named recipient groups the rule table addresses. Operators get every
/// alert; the other groups are added per check.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Recipients {
    pub operators: Vec<String>,
    pub infrastructure: Vec<String>,
    pub sensing: Vec<String>,
    pub vision: Vec<String>,
}

impl Recipients {
    pub fn resolve(&self, audience: &[Audience]) -> Vec<String> {
        let mut out = Vec::new();
        for group in audience {
            let members = match group {
                Audience::Operators => &self.operators,
                Audience::Infrastructure => &self.infrastructure,
                Audience::Sensing => &self.sensing,
                Audience::Vision => &self.vision,
            };
            for addr in members {
                if !out.contains(addr) {
                    out.push(addr.clone());
                }
            }
        }
        out
    }
}

/// Load from an explicit `--config` path, else `./nodewatch.yaml` if it
/// exists, else built-in defaults (which leave email disabled).
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("nodewatch.yaml");
            if !p.exists() {
                return Ok(Config::default());
            }
            p.to_path_buf()
        }
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}
