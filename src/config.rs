//! Service configuration: `clap`-parsed environment variables and
//! flags, layered with an optional TOML overlay discovered by walking
//! up from the working directory, merged in only where an argument is
//! still at its built-in default.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Clone, Parser)]
#[command(name = "conflict-search", version, about = "Possible-conflict search façade")]
pub struct Config {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Path to the SQLite staging store database file.
    #[arg(long, env = "DATABASE_PATH", default_value = "conflict_search.db")]
    pub database_path: PathBuf,

    /// Base URL of the Solr-family leader core.
    #[arg(long, env = "SOLR_LEADER_URL", default_value = "http://localhost:8983/solr/possible_conflicts")]
    pub solr_leader_url: String,

    /// Base URL of the Solr-family follower core, when one is configured.
    #[arg(long, env = "SOLR_FOLLOWER_URL")]
    pub solr_follower_url: Option<String>,

    /// Whether a follower/replica is configured at all.
    #[arg(long, env = "HAS_FOLLOWER", default_value_t = false)]
    pub has_follower: bool,

    #[arg(long, env = "SOLR_TIMEOUT_SECS", default_value_t = 25)]
    pub solr_timeout_secs: u64,

    #[arg(long, env = "AUTH_SVC_URL", default_value = "http://localhost:8081")]
    pub auth_svc_url: String,

    #[arg(long, env = "AUTH_API_TIMEOUT", default_value_t = 20)]
    pub auth_api_timeout_secs: u64,

    #[arg(long, env = "SSO_SVC_TOKEN_URL", default_value = "http://localhost:8081/token")]
    pub sso_svc_token_url: String,

    #[arg(long, env = "SSO_SVC_TIMEOUT", default_value_t = 20)]
    pub sso_svc_timeout_secs: u64,

    #[arg(long, env = "SVC_ACC_CLIENT_ID", default_value = "")]
    pub svc_acc_client_id: String,

    #[arg(long, env = "SVC_ACC_CLIENT_SECRET", default_value = "")]
    pub svc_acc_client_secret: String,

    #[arg(long, env = "JWT_OIDC_UNIQUE_USER_KEY", default_value = "sub")]
    pub jwt_oidc_unique_user_key: String,
    #[arg(long, env = "JWT_OIDC_USERNAME", default_value = "preferred_username")]
    pub jwt_oidc_username: String,
    #[arg(long, env = "JWT_OIDC_FIRSTNAME", default_value = "given_name")]
    pub jwt_oidc_firstname: String,
    #[arg(long, env = "JWT_OIDC_LASTNAME", default_value = "family_name")]
    pub jwt_oidc_lastname: String,
    #[arg(long, env = "JWT_OIDC_LOGIN_SOURCE", default_value = "loginSource")]
    pub jwt_oidc_login_source: String,

    #[arg(long, env = "MAX_BATCH_UPDATE_NUM", default_value_t = 500)]
    pub max_batch_update_num: usize,

    #[arg(long, env = "LAST_REPLICATION_THRESHOLD", default_value_t = 2)]
    pub last_replication_threshold_hours: i64,

    /// Suffixes stripped from the end of a name-search query value
    /// before normalization (comma-separated).
    #[arg(long, env = "DESIGNATIONS", value_delimiter = ',', default_value = "LTD,LIMITED,INC,INCORPORATED,CORP,CORPORATION,LLC,LLP,ULC")]
    pub designations: Vec<String>,

    /// Allow-list of synonym-admin request keys. Defaults to the
    /// single literal value `ALL`, reproducing the original
    /// validator's effective single-type acceptance as a
    /// configuration default rather than a hardcoded constant.
    #[arg(long, env = "SYNONYM_REQUEST_TYPE_ALLOWLIST", value_delimiter = ',', default_value = "ALL")]
    pub synonym_request_type_allowlist: Vec<String>,

    /// Optional path to a TOML config file; defaults to discovering
    /// `.conflict-search/config.toml` by walking up from the cwd.
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}

/// Partial TOML overlay; any field present overrides the
/// environment/CLI default for that field only.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    bind_addr: Option<String>,
    database_path: Option<PathBuf>,
    solr_leader_url: Option<String>,
    solr_follower_url: Option<String>,
    has_follower: Option<bool>,
    solr_timeout_secs: Option<u64>,
    auth_svc_url: Option<String>,
    max_batch_update_num: Option<usize>,
    last_replication_threshold_hours: Option<i64>,
    designations: Option<Vec<String>>,
}

fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    while let Some(current) = dir {
        for name in [".conflict-search/config.toml", ".conflict-search/service.toml"] {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        dir = current.parent().map(Path::to_path_buf);
    }
    None
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();
        let discovered = config
            .config_file
            .clone()
            .or_else(|| std::env::current_dir().ok().and_then(|cwd| find_config_file(&cwd)));

        if let Some(path) = discovered {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                let overlay: ConfigFile = toml::from_str(&contents)?;
                config.apply_overlay(overlay);
            }
        }

        Ok(config)
    }

    fn apply_overlay(&mut self, overlay: ConfigFile) {
        // Only values the environment/CLI left at the built-in
        // default are overridden — an explicit env var or flag always
        // wins.
        if self.bind_addr == "0.0.0.0:8080" {
            if let Some(v) = overlay.bind_addr {
                self.bind_addr = v;
            }
        }
        if self.database_path == PathBuf::from("conflict_search.db") {
            if let Some(v) = overlay.database_path {
                self.database_path = v;
            }
        }
        if self.solr_leader_url == "http://localhost:8983/solr/possible_conflicts" {
            if let Some(v) = overlay.solr_leader_url {
                self.solr_leader_url = v;
            }
        }
        if self.solr_follower_url.is_none() {
            self.solr_follower_url = overlay.solr_follower_url;
        }
        if !self.has_follower {
            if let Some(v) = overlay.has_follower {
                self.has_follower = v;
            }
        }
        if self.solr_timeout_secs == 25 {
            if let Some(v) = overlay.solr_timeout_secs {
                self.solr_timeout_secs = v;
            }
        }
        if self.auth_svc_url == "http://localhost:8081" {
            if let Some(v) = overlay.auth_svc_url {
                self.auth_svc_url = v;
            }
        }
        if self.max_batch_update_num == 500 {
            if let Some(v) = overlay.max_batch_update_num {
                self.max_batch_update_num = v;
            }
        }
        if self.last_replication_threshold_hours == 2 {
            if let Some(v) = overlay.last_replication_threshold_hours {
                self.last_replication_threshold_hours = v;
            }
        }
        if let Some(v) = overlay.designations {
            if self.designations.len() == 9 {
                self.designations = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_only_replaces_default_values() {
        let mut config = Config::parse_from(["conflict-search"]);
        config.bind_addr = "127.0.0.1:9000".to_string();

        config.apply_overlay(ConfigFile {
            bind_addr: Some("0.0.0.0:1".to_string()),
            solr_leader_url: Some("http://leader.example/solr".to_string()),
            ..Default::default()
        });

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.solr_leader_url, "http://leader.example/solr");
    }
}
