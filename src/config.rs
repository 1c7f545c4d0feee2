//! Command-line and environment-variable configuration.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pairrelay", version, about = "Pairing-code file and message relay")]
pub struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Host/interface to bind
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Root directory for per-session file storage
    #[arg(long, default_value = "./data", env = "STORAGE_ROOT")]
    pub storage_root: String,

    /// Maximum bytes of storage per session, or -1 for unlimited
    #[arg(long, default_value_t = -1, env = "MAX_SESSION_STORAGE_BYTES")]
    pub max_session_storage_bytes: i64,

    /// Maximum number of concurrently active sessions, or -1 for unlimited
    #[arg(long, default_value_t = -1, env = "MAX_ACTIVE_SESSIONS")]
    pub max_active_sessions: i64,

    /// Comma-separated list of allowed CORS origins; empty means allow any
    #[arg(long, default_value = "", env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Public base URL used to build download links, e.g. https://relay.example.com
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Grace period before cleaning up a session with no activity history
    #[arg(long, default_value_t = 60, env = "UNUSED_GRACE_SECS")]
    pub unused_grace_secs: u64,

    /// Grace period before cleaning up a session that has seen activity
    #[arg(long, default_value_t = 1200, env = "ACTIVE_GRACE_SECS")]
    pub active_grace_secs: u64,

    /// How often the session sweeper runs
    #[arg(long, default_value_t = 30, env = "SESSION_SWEEP_INTERVAL_SECS")]
    pub session_sweep_interval_secs: u64,

    /// How long an abandoned in-progress upload is kept before being swept
    #[arg(long, default_value_t = 86_400, env = "UPLOAD_TTL_SECS")]
    pub upload_ttl_secs: u64,

    /// How often the upload sweeper runs
    #[arg(long, default_value_t = 300, env = "UPLOAD_SWEEP_INTERVAL_SECS")]
    pub upload_sweep_interval_secs: u64,
}

/// Resolved, typed configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage_root: String,
    pub base_url: String,
    pub allowed_origins: Vec<String>,
    pub max_session_storage_bytes: i64,
    pub max_active_sessions: i64,
    pub unused_grace: Duration,
    pub active_grace: Duration,
    pub session_sweep_interval: Duration,
    pub upload_ttl: Duration,
    pub upload_sweep_interval: Duration,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let base_url = args
            .base_url
            .unwrap_or_else(|| format!("http://localhost:{}", args.port));
        let allowed_origins = args
            .allowed_origins
            .into_iter()
            .filter(|o| !o.trim().is_empty())
            .collect();

        Self {
            host: args.host,
            port: args.port,
            storage_root: args.storage_root,
            base_url,
            allowed_origins,
            max_session_storage_bytes: args.max_session_storage_bytes,
            max_active_sessions: args.max_active_sessions,
            unused_grace: Duration::from_secs(args.unused_grace_secs),
            active_grace: Duration::from_secs(args.active_grace_secs),
            session_sweep_interval: Duration::from_secs(args.session_sweep_interval_secs),
            upload_ttl: Duration::from_secs(args.upload_ttl_secs),
            upload_sweep_interval: Duration::from_secs(args.upload_sweep_interval_secs),
        }
    }
}
