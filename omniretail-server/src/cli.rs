//! Command-line arguments.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Omniretail server - answers customer-service queries across order,
/// shipment, payment and support domains.
///
/// Examples:
///   omniretail-server
///   omniretail-server --config ./omniretail.toml --listen 127.0.0.1:9000
///   omniretail-server --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for omniretail.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(
        short,
        long,
        default_value = "0.0.0.0:8000",
        env = "OMNIRETAIL_LISTEN",
        value_name = "ADDR"
    )]
    pub listen: SocketAddr,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Write an example configuration file and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parses the process arguments.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["omniretail-server"]).unwrap();
        assert!(args.config.is_none());
        assert_eq!(args.listen.port(), 8000);
        assert!(!args.log_json);
        assert!(!args.init_config);
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "omniretail-server",
            "--config",
            "custom.toml",
            "--listen",
            "127.0.0.1:9100",
            "--log-json",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(args.listen, "127.0.0.1:9100".parse().unwrap());
        assert!(args.log_json);
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Args::try_parse_from(["omniretail-server", "--listen", "nowhere"]).is_err());
    }
}
