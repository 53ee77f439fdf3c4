//! Command-line surface.

use clap::{Parser, Subcommand};

/// Show information about VMware vCenter resources
#[derive(Parser, Debug)]
#[command(name = "wminfo", version)]
#[command(
    about = "Show information about VMware vCenter resources",
    after_help = "Instead of providing these options, you can use the following environment variables:\n  \
                  WMINFO_URL, WMINFO_USERNAME, WMINFO_PASSWORD\n  \
                  WMINFO_DEBUG, WMINFO_INSECURE\n  \
                  WMINFO_DC"
)]
pub struct Cli {
    /// vCenter URL [WMINFO_URL]
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Do not verify the server's certificate chain [WMINFO_INSECURE]
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Datacenter [WMINFO_DC]
    #[arg(long, global = true)]
    pub dc: Option<String>,

    /// Enable debug logging [WMINFO_DEBUG]
    #[arg(long, global = true)]
    pub debug: bool,

    /// HTTP timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Port of the web console client
    #[arg(long, global = true)]
    pub console_port: Option<u16>,

    /// Seconds to keep the session open after printing a console link (0 to exit at once)
    #[arg(long, global = true)]
    pub console_wait: Option<u64>,

    /// Use SHA-256 instead of SHA-1 for the certificate thumbprint
    #[arg(long, global = true)]
    pub sha256: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Service information and datacenters
    Info {
        /// Datacenter name pattern
        pattern: Option<String>,
    },
    /// Datastores and datastore clusters
    Ds {
        /// Name pattern
        pattern: Option<String>,
    },
    /// Networks, distributed port-groups and switches
    Net {
        /// Name pattern
        pattern: Option<String>,
    },
    /// Virtual machines
    Vms {
        /// Name pattern
        pattern: Option<String>,
    },
    /// Details and console link of matching virtual machines
    Show {
        /// VM name, guest host name, IP address or reference
        selector: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_requires_selector() {
        assert!(Cli::try_parse_from(["wminfo", "show"]).is_err());
        let cli = Cli::try_parse_from(["wminfo", "show", "10.0.0.5"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Show {
                selector: "10.0.0.5".into()
            }
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["wminfo", "vms", "--dc", "Lab", "--insecure"]).unwrap();
        assert_eq!(cli.dc.as_deref(), Some("Lab"));
        assert!(cli.insecure);
        assert_eq!(cli.command, Commands::Vms { pattern: None });
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["wminfo", "hosts"]).is_err());
        assert!(Cli::try_parse_from(["wminfo"]).is_err());
    }
}
