//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator CLI for the content enforcement engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML configuration file (MODERATION_* env vars still override it)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// RocksDB ledger directory (overrides config and MODERATION_LEDGER_PATH)
    #[arg(long, global = true)]
    pub ledger_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Moderate one submission and print the outcome as JSON
    Submit {
        /// Identity submitting the content
        #[arg(long)]
        identity: String,

        /// Content to moderate; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,

        /// Channel whose `[policies.<channel>]` entry applies
        #[arg(long)]
        channel: Option<String>,
    },

    /// Print the sanction state of an identity
    Status {
        #[arg(long)]
        identity: String,
    },

    /// List recorded violations of an identity, oldest first
    Violations {
        #[arg(long)]
        identity: String,
    },

    /// Deliver queued ban events to the configured webhook
    Relay {
        /// Drain the outbox once and exit instead of polling
        #[arg(long, default_value_t = false)]
        once: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_with_inline_content() {
        let args = Args::try_parse_from([
            "moderation-cli",
            "submit",
            "--identity",
            "user-1",
            "--content",
            "hello",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Submit {
                identity: "user-1".to_string(),
                content: Some("hello".to_string()),
                channel: None,
            }
        );
    }

    #[test]
    fn test_submit_with_channel() {
        let args = Args::try_parse_from([
            "moderation-cli",
            "submit",
            "--identity",
            "user-1",
            "--channel",
            "direct_messages",
        ])
        .unwrap();
        let Command::Submit { channel, content, .. } = args.command else {
            panic!("expected submit");
        };
        assert_eq!(channel.as_deref(), Some("direct_messages"));
        assert_eq!(content, None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "moderation-cli",
            "status",
            "--identity",
            "user-1",
            "--ledger-path",
            "/tmp/ledger",
        ])
        .unwrap();
        assert_eq!(args.ledger_path, Some(PathBuf::from("/tmp/ledger")));
    }

    #[test]
    fn test_relay_once_flag() {
        let args = Args::try_parse_from(["moderation-cli", "relay", "--once"]).unwrap();
        assert_eq!(args.command, Command::Relay { once: true });
    }

    #[test]
    fn test_identity_is_required() {
        assert!(Args::try_parse_from(["moderation-cli", "violations"]).is_err());
    }
}
