//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use jetstream_controller::context::DEFAULT_WRITE_TIMEOUT;
use jetstream_controller::nats::NatsClientOptions;
use jetstream_controller::translate::parse_duration;

/// JetStream operator - manages NATS JetStream streams declared as Stream resources
#[derive(Parser, Debug)]
#[command(name = "jetstream-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print the Stream CRD as YAML and exit
    #[arg(long)]
    pub crd: bool,

    #[command(flatten)]
    pub controller: ControllerArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Operator modes
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the Stream controller (default mode)
    Controller,
}

/// Settings for the Stream controller
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Only watch Streams in this namespace; all namespaces when unset
    #[arg(long, env = "JETSTREAM_NAMESPACE")]
    pub namespace: Option<String>,

    /// Connection name reported to NATS servers
    #[arg(long, env = "NATS_CLIENT_NAME", default_value = "jetstream-controller")]
    pub nats_client_name: String,

    /// CA bundle for verifying NATS servers
    #[arg(long, env = "NATS_TLS_CA")]
    pub tls_ca: Option<PathBuf>,

    /// Client certificate for NATS mutual TLS
    #[arg(long, env = "NATS_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// Client key for NATS mutual TLS
    #[arg(long, env = "NATS_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Maximum concurrent reconciles; 0 means unbounded
    #[arg(long, env = "JETSTREAM_CONCURRENCY", default_value_t = 0)]
    pub concurrency: u16,

    /// Install or update the Stream CRD on startup
    #[arg(long, env = "JETSTREAM_INSTALL_CRDS", default_value_t = true, action = ArgAction::Set)]
    pub install_crds: bool,

    /// Deadline for each status or finalizer write (e.g. "5s")
    #[arg(long, default_value = "5s", value_parser = parse_write_timeout)]
    pub write_timeout: Duration,

    /// Log human-readable text instead of JSON
    #[arg(long, env = "JETSTREAM_LOG_TEXT")]
    pub log_text: bool,
}

impl ControllerArgs {
    /// NATS client options derived from the flags
    pub fn nats_options(&self) -> NatsClientOptions {
        NatsClientOptions {
            name: Some(self.nats_client_name.clone()),
            tls_ca: self.tls_ca.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
        }
    }
}

fn parse_write_timeout(s: &str) -> Result<Duration, String> {
    match parse_duration("--write-timeout", s) {
        Ok(d) if d.is_zero() => Ok(DEFAULT_WRITE_TIMEOUT),
        Ok(d) => Ok(d),
        Err(e) => Err(e.to_string()),
    }
}
