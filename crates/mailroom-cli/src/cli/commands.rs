use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use mailroom_core::engine::{DeliveryOutcome, LabelMutation};
use mailroom_core::nostr::{KeysCrypto, Nip05Resolver, RelayTransport};
use mailroom_core::store::{CoverageStore, Database};
use mailroom_core::{Collaborators, MailroomCore, Message};
use nostr_sdk::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::config::CliConfig;

/// CLI command parsed from arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Fetch whatever the local coverage is missing
    Sync { since: Option<u64>, until: Option<u64> },
    /// Forget coverage and fetch the window again
    Resync { since: Option<u64>, until: Option<u64> },
    FetchRecent,
    /// Stream changes as JSON lines until interrupted
    Watch { skip_sync: bool },
    Retry { envelope_id: String },
    RetryAll,
    Failed,
    List { filter: ListFilter, limit: Option<usize> },
    Show { message_id: String },
    LabelAdd { message_id: String, label: String },
    LabelRemove { message_id: String, label: String },
    LabelList { message_id: String },
    Delete { message_id: String },
    Send { to: String, subject: String, body: String },
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListFilter {
    #[default]
    All,
    Folder(String),
    From(String),
    To(String),
    Label(String),
}

impl CliCommand {
    /// Whether the command talks to relays. Everything else reads the local
    /// database only.
    pub fn needs_relays(&self) -> bool {
        matches!(
            self,
            CliCommand::Sync { .. }
                | CliCommand::Resync { .. }
                | CliCommand::FetchRecent
                | CliCommand::Watch { .. }
                | CliCommand::LabelAdd { .. }
                | CliCommand::LabelRemove { .. }
                | CliCommand::Delete { .. }
                | CliCommand::Send { .. }
        )
    }
}

/// Open the mailbox for `keys`, connecting to relays only when asked.
pub async fn open_core(config: &CliConfig, keys: Keys, connect: bool) -> Result<MailroomCore> {
    let core_config = config.core_config();
    if connect {
        return MailroomCore::connect(core_config, keys).await;
    }

    let db = Database::new(&core_config.data_dir).with_context(|| {
        format!("Failed to open database in {}", core_config.data_dir.display())
    })?;
    let collaborators = Collaborators {
        crypto: Arc::new(KeysCrypto::new(keys.clone())),
        transport: Arc::new(RelayTransport::new(
            Client::default(),
            core_config.query_timeout(),
            core_config.broadcast_timeout(),
        )),
        coverage: Arc::new(CoverageStore::new(db.clone())),
        resolver: Arc::new(Nip05Resolver::new()),
    };
    let core = MailroomCore::with_database(
        core_config.with_identity(keys.public_key().to_hex()),
        db,
        collaborators,
    )?;
    debug!("Opened mailbox without relay connection");
    Ok(core)
}

/// Run a one-shot command and return its JSON result.
pub async fn execute(core: &MailroomCore, command: CliCommand) -> Result<Value> {
    let value = match command {
        CliCommand::Sync { since, until } => {
            let report = core.sync(since, until).await?;
            json!({ "report": report, "stats": core.stats() })
        }
        CliCommand::Resync { since, until } => {
            let report = core.resync(since, until).await?;
            json!({ "report": report, "stats": core.stats() })
        }
        CliCommand::FetchRecent => {
            let report = core.fetch_recent().await?;
            json!({ "report": report, "stats": core.stats() })
        }
        CliCommand::Watch { .. } => anyhow::bail!("watch streams its output; use run_watch"),
        CliCommand::Retry { envelope_id } => {
            let stored = core.retry(&envelope_id).await?;
            json!({ "envelope_id": envelope_id, "stored": stored })
        }
        CliCommand::RetryAll => json!(core.retry_all().await?),
        CliCommand::Failed => json!({ "unprocessed": core.failed_count()? }),
        CliCommand::List { filter, limit } => {
            let mut messages = match filter {
                ListFilter::All => core.messages(limit)?,
                ListFilter::Folder(folder) => core.messages_in_folder(&folder)?,
                ListFilter::From(sender) => core.messages_from(&sender)?,
                ListFilter::To(recipient) => core.messages_to(&recipient)?,
                ListFilter::Label(label) => core.messages_with_label(&label)?,
            };
            if let Some(limit) = limit {
                messages.truncate(limit);
            }
            let summaries: Vec<MessageSummary> =
                messages.iter().map(MessageSummary::from).collect();
            json!(summaries)
        }
        CliCommand::Show { message_id } => {
            let message = core.message(&message_id)?;
            let labels = core.labels(&message_id)?;
            let detail = MessageDetail {
                date: format_timestamp(message.created_at),
                message: &message,
                labels,
            };
            serde_json::to_value(&detail)?
        }
        CliCommand::LabelAdd { message_id, label } => {
            let mutation = core.add_label(&message_id, &label).await?;
            mutation_result(&message_id, &label, mutation).await
        }
        CliCommand::LabelRemove { message_id, label } => {
            let mutation = core.remove_label(&message_id, &label).await?;
            mutation_result(&message_id, &label, mutation).await
        }
        CliCommand::LabelList { message_id } => {
            json!({ "message_id": message_id, "labels": core.labels(&message_id)? })
        }
        CliCommand::Delete { message_id } => {
            core.delete(&message_id).await?;
            json!({ "deleted": message_id })
        }
        CliCommand::Send { to, subject, body } => json!(core.send(&to, &subject, &body).await?),
        CliCommand::Status => json!({
            "identity": core.identity().map(|pk| pk.to_hex()),
            "data_dir": core.config().data_dir.display().to_string(),
            "relays": core.config().relays,
            "label_namespace": core.config().label_namespace,
            "messages": core.messages(None)?.len(),
            "unread": core.unread_count()?,
            "unprocessed": core.failed_count()?,
        }),
    };
    Ok(value)
}

/// A one-shot CLI process exits once the command returns, so mutations
/// wait for their broadcast to settle before reporting.
async fn mutation_result(message_id: &str, label: &str, mutation: LabelMutation) -> Value {
    match mutation {
        LabelMutation::Unchanged => json!({
            "message_id": message_id,
            "label": label,
            "changed": false,
        }),
        LabelMutation::Applied {
            label_event_id,
            delivery,
        } => {
            let outcome = delivery.outcome().await;
            json!({
                "message_id": message_id,
                "label": label,
                "changed": true,
                "label_event_id": label_event_id,
                "delivered": outcome == DeliveryOutcome::Confirmed,
                "delivery": outcome,
            })
        }
    }
}

/// Print every change as a JSON line until Ctrl-C.
pub async fn run_watch(core: &MailroomCore, skip_sync: bool, pretty: bool) -> Result<()> {
    if !skip_sync {
        let report = core.sync(None, None).await?;
        info!(events = report.total_events(), "Caught up before watching");
    }

    let feed = core.watch().await?;
    let mut changes = feed.listen();
    loop {
        tokio::select! {
            change = changes.next() => match change {
                Some(change) => print_json(&change, pretty)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing subscriptions");
                break;
            }
        }
    }
    core.stop_watching().await;
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}

fn format_timestamp(secs: u64) -> Option<String> {
    chrono::DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.to_rfc3339())
}

#[derive(Debug, Serialize)]
struct MessageSummary<'a> {
    id: &'a str,
    sender: &'a str,
    recipient: &'a str,
    subject: &'a str,
    preview: &'a str,
    created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl<'a> From<&'a Message> for MessageSummary<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            id: &message.id,
            sender: &message.sender,
            recipient: &message.recipient,
            subject: &message.subject,
            preview: message.preview(),
            created_at: message.created_at,
            date: format_timestamp(message.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageDetail<'a> {
    #[serde(flatten)]
    message: &'a Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    labels: Vec<String>,
}
