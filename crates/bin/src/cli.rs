//! CLI argument definitions for the Yusef binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Yusef demo application server
#[derive(Parser, Debug)]
#[command(name = "yusef")]
#[command(about = "Yusef: sections, cookie sessions and form nonces on an HTTP server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the demo application server
    Serve(ServeArgs),
    /// Check health of a running Yusef server
    Health(HealthArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "YUSEF_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "YUSEF_HOST")]
    pub host: String,

    /// JSON config file. Flags below override its values.
    #[arg(short, long, env = "YUSEF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path the application is mounted under, e.g. `/notes/`
    #[arg(long, env = "YUSEF_SERVICE_PATH")]
    pub service_path: Option<String>,

    /// Identity mixed into cookie names and nonces
    #[arg(long, env = "YUSEF_APP_IDENTITY")]
    pub app_identity: Option<String>,

    /// Directory served for the `static` section
    #[arg(long, default_value = "public", env = "YUSEF_PUBLIC_DIR")]
    pub public_dir: PathBuf,

    /// Do not redirect clients whose session was just created
    #[arg(long, env = "YUSEF_NO_SESSION_REDIRECT")]
    pub no_session_redirect: bool,

    /// Seconds between background sweeps of stale sessions
    #[arg(long, default_value_t = 60, env = "YUSEF_SWEEP_INTERVAL")]
    pub sweep_interval: u64,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            config: None,
            service_path: None,
            app_identity: None,
            public_dir: PathBuf::from("public"),
            no_session_redirect: false,
            sweep_interval: 60,
        }
    }
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(short, long, default_value = "http://127.0.0.1:3000", env = "YUSEF_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}
