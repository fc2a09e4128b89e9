use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::defs::{
    ArrayMixOpt, EpgOpt, MixOpt, MultiRepoOpt, PlaylistOpt, SiteRepoOpt, SourceSpec, DEFAULT_INTERVAL_SECS,
};

pub const DEFAULT_CONFIG_FILE: &str = "mixproxy.toml";
pub const CONFIG_ENV: &str = "MIXPROXY_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOpt {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Extra attempts after a transport error or 5xx response.
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchOpt {
    fn default() -> Self {
        Self {
            user_agent: concat!("MixProxy/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_retries: 1,
            retry_delay_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_port: u16,
    /// Address clients use to reach this proxy, eg. `http://tv.lan:8080`.
    pub external_url: String,
    /// How often the scheduler scans for expired sources.
    pub check_period_secs: u64,
    pub fetch: FetchOpt,
    pub sources: Vec<SourceSpec>,
    pub tvbox_single_repo_opt: SiteRepoOpt,
    pub tvbox_multi_repo_opt: MultiRepoOpt,
    pub epg: EpgOpt,
    pub m3u: PlaylistOpt,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            external_url: String::new(),
            check_period_secs: 60,
            fetch: FetchOpt::default(),
            sources: Vec::new(),
            tvbox_single_repo_opt: SiteRepoOpt::default(),
            tvbox_multi_repo_opt: MultiRepoOpt::default(),
            epg: EpgOpt::default(),
            m3u: PlaylistOpt::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `MIXPROXY_CONFIG` / `mixproxy.toml` when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV)
                .map(Into::into)
                .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into()),
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                info!("Using config file: {}", path.display());
                Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        config.fixture();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Fill the internal field paths and the defaults users never configure.
    pub fn fixture(&mut self) {
        let site = &mut self.tvbox_single_repo_opt;
        default_field(&mut site.spider, "spider");
        default_field(&mut site.wallpaper, "wallpaper");
        default_field(&mut site.logo, "logo");
        default_array(&mut site.sites, "sites", "name");
        default_array(&mut site.doh, "doh", "name");
        default_array(&mut site.lives, "lives", "name");
        default_array(&mut site.parses, "parses", "name");
        default_array(&mut site.flags, "flags", "");
        default_array(&mut site.rules, "rules", "name");
        default_array(&mut site.ads, "ads", "");

        default_array(&mut self.tvbox_multi_repo_opt.repos, "urls", "name");

        for source in &mut self.sources {
            if source.interval == 0 {
                source.interval = DEFAULT_INTERVAL_SECS;
            }
        }
    }

    pub fn external_url(&self) -> String {
        if self.external_url.is_empty() {
            format!("http://localhost:{}", self.server_port)
        } else {
            self.external_url.trim_end_matches('/').to_string()
        }
    }
}

fn default_field(opt: &mut MixOpt, field: &str) {
    if opt.field.is_empty() {
        opt.field = field.to_string();
    }
}

fn default_array(opts: &mut [ArrayMixOpt], field: &str, filter_by: &str) {
    for opt in opts {
        default_field(&mut opt.mix, field);
        if opt.filter_by.is_empty() {
            opt.filter_by = filter_by.to_string();
        }
    }
}
