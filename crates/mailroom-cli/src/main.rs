use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mailroom_cli::cli::credentials::{forget_key, load_keys, store_key};
use mailroom_cli::cli::tracing_setup::init_tracing;
use mailroom_cli::cli::{execute, open_core, print_json, run_watch, CliCommand, CliConfig, ListFilter};
use serde_json::json;

#[derive(Parser)]
#[command(name = "mailroom")]
#[command(about = "Encrypted nostr mail from the command line")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (dataDir, relays, labelNamespace, credentials)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch mail, labels and deletions missing from local coverage
    Sync {
        /// Window start (unix seconds)
        #[arg(long)]
        since: Option<u64>,
        /// Window end (unix seconds, defaults to now)
        #[arg(long)]
        until: Option<u64>,
    },

    /// Discard coverage and fetch the window again
    Resync {
        #[arg(long)]
        since: Option<u64>,
        #[arg(long)]
        until: Option<u64>,
    },

    /// Fetch the newest events without touching coverage
    FetchRecent,

    /// Stream mailbox changes as JSON lines until Ctrl-C
    Watch {
        /// Start the live subscription without catching up first
        #[arg(long)]
        no_sync: bool,
    },

    /// Retry decrypting one envelope
    Retry {
        /// Envelope event ID
        envelope_id: String,
    },

    /// Retry every envelope still awaiting decryption
    RetryAll,

    /// Count envelopes still awaiting decryption
    Failed,

    /// List messages, newest first
    List {
        #[arg(long, conflicts_with_all = ["from", "to", "label"])]
        folder: Option<String>,
        #[arg(long, conflicts_with_all = ["to", "label"])]
        from: Option<String>,
        #[arg(long, conflicts_with = "label")]
        to: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Show one message with its labels
    Show {
        /// Message ID (envelope event ID)
        message_id: String,
    },

    /// Manage message labels
    Label {
        #[command(subcommand)]
        action: LabelAction,
    },

    /// Delete a message locally and request deletion from relays
    Delete { message_id: String },

    /// Send a message
    Send {
        /// npub, hex pubkey or NIP-05 address
        #[arg(long)]
        to: String,
        #[arg(long, short = 's', default_value = "")]
        subject: String,
        body: String,
    },

    /// Show mailbox status
    Status,

    /// Store an nsec or ncryptsec in the OS keyring
    Login {
        key: String,
        /// Encrypt the stored key with this password
        #[arg(long)]
        password: Option<String>,
    },

    /// Remove the stored key from the OS keyring
    Logout,
}

#[derive(Subcommand)]
enum LabelAction {
    Add { message_id: String, label: String },
    Remove { message_id: String, label: String },
    List { message_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli);

    let command = match cli.command {
        Commands::Login { key, password } => {
            exit_on_error(store_key(&key, password.as_deref()).and_then(|pubkey| {
                print_json(&json!({ "pubkey": pubkey.to_hex() }), cli.pretty)
            }));
            return;
        }
        Commands::Logout => {
            exit_on_error(forget_key().and_then(|()| print_json(&json!({ "logged_out": true }), cli.pretty)));
            return;
        }
        Commands::Sync { since, until } => CliCommand::Sync { since, until },
        Commands::Resync { since, until } => CliCommand::Resync { since, until },
        Commands::FetchRecent => CliCommand::FetchRecent,
        Commands::Watch { no_sync } => CliCommand::Watch { skip_sync: no_sync },
        Commands::Retry { envelope_id } => CliCommand::Retry { envelope_id },
        Commands::RetryAll => CliCommand::RetryAll,
        Commands::Failed => CliCommand::Failed,
        Commands::List {
            folder,
            from,
            to,
            label,
            limit,
        } => {
            let filter = match (folder, from, to, label) {
                (Some(folder), ..) => ListFilter::Folder(folder),
                (_, Some(from), ..) => ListFilter::From(from),
                (_, _, Some(to), _) => ListFilter::To(to),
                (_, _, _, Some(label)) => ListFilter::Label(label),
                _ => ListFilter::All,
            };
            CliCommand::List { filter, limit }
        }
        Commands::Show { message_id } => CliCommand::Show { message_id },
        Commands::Label { action } => match action {
            LabelAction::Add { message_id, label } => CliCommand::LabelAdd { message_id, label },
            LabelAction::Remove { message_id, label } => {
                CliCommand::LabelRemove { message_id, label }
            }
            LabelAction::List { message_id } => CliCommand::LabelList { message_id },
        },
        Commands::Delete { message_id } => CliCommand::Delete { message_id },
        Commands::Send { to, subject, body } => CliCommand::Send { to, subject, body },
        Commands::Status => CliCommand::Status,
    };

    exit_on_error(run(&config, command, cli.pretty).await);
}

async fn run(config: &CliConfig, command: CliCommand, pretty: bool) -> anyhow::Result<()> {
    let keys = load_keys(config.credentials.as_ref())?;
    let core = open_core(config, keys, command.needs_relays()).await?;

    if let CliCommand::Watch { skip_sync } = command {
        return run_watch(&core, skip_sync, pretty).await;
    }

    let result = execute(&core, command).await?;
    print_json(&result, pretty)
}

/// Load configuration from file, falling back to defaults
fn load_config(cli: &Cli) -> CliConfig {
    match cli.config {
        Some(ref path) => match CliConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        },
        None => CliConfig::default(),
    }
}

fn exit_on_error(result: anyhow::Result<()>) {
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
