use clap::{Parser, Subcommand};

/// Spaces: drive the conversation-room session engine from a terminal.
#[derive(Parser, Debug)]
#[command(name = "spaces", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level override (debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective configuration as JSON.
    Config,

    /// Run a host and a visitor against in-process collaborators.
    Simulate {
        /// Topic of the simulated space. Recording needs one.
        #[arg(long)]
        topic: Option<String>,

        /// Start a capture once the visitor is in.
        #[arg(long)]
        record: bool,

        /// How long to keep the space open.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },

    /// Follow a host's presence channel on the realtime bus.
    Watch {
        /// User id of the host whose channel to follow.
        #[arg(long)]
        host: String,

        /// Presence key to connect with.
        #[arg(long, default_value = "spaces-cli")]
        user: String,
    },
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_flags_parse() {
        let args = Args::try_parse_from([
            "spaces", "--log-level", "debug", "simulate", "--topic", "ideas", "--record",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Command::Simulate {
                topic,
                record,
                seconds,
            } => {
                assert_eq!(topic.as_deref(), Some("ideas"));
                assert!(record);
                assert_eq!(seconds, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn watch_needs_a_host() {
        assert!(Args::try_parse_from(["spaces", "watch"]).is_err());
        let args = Args::try_parse_from(["spaces", "watch", "--host", "u1"]).unwrap();
        assert!(matches!(args.command, Command::Watch { ref host, ref user } if host == "u1" && user == "spaces-cli"));
    }
}
