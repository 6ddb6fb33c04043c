//! CLI argument parsing for the ModelScan gateway

use clap::{Parser, Subcommand};

/// ModelScan - multi-tenant gateway in front of LLM provider APIs
#[derive(Parser, Debug)]
#[command(name = "modelscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway
    ///
    /// By default the gateway detaches into the background and logs to
    /// the daemon log file. The PID file records the chosen port.
    Start {
        /// Stay attached to the terminal instead of daemonising
        #[arg(long)]
        foreground: bool,

        /// Internal marker for the re-exec'd daemon child
        #[arg(long, hide = true)]
        child: bool,
    },

    /// Stop a running gateway gracefully
    Stop,

    /// Show whether a gateway is running, and where
    Status,

    /// Ask a running gateway to reload its settings file
    ///
    /// Only the safe subset applies without a restart: log level, daemon
    /// paths, and sweep window durations.
    Reload,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_flags() {
        let cli = Cli::try_parse_from(["modelscan", "start", "--foreground"]).unwrap();
        match cli.command {
            Command::Start { foreground, child } => {
                assert!(foreground);
                assert!(!child);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["modelscan"]).is_err());
    }

    #[test]
    fn test_hidden_child_flag_parses() {
        let cli = Cli::try_parse_from(["modelscan", "start", "--child"]).unwrap();
        match cli.command {
            Command::Start { child, .. } => assert!(child),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
