#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Command-line administration of campaign mails, attachments and subscriptions

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lettre::message::Mailbox;
use mailing_core::{
    domain::{
        attachments::StaticLibrary,
        communication::email_addresses::EmailAddress,
        mailing::{MailAssembler, MailService, MailServiceImpl},
        subscriptions::{SubscriptionChange, SubscriptionService, SubscriptionServiceImpl},
    },
    infrastructure::{
        config::{AttachmentsConfig, MailingConfig},
        db::postgres::{DatabaseConnectionDetails, PostgresDatabase},
    },
};
use tracing::info;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// The database connection details
    #[clap(flatten)]
    pub db: DatabaseConnectionDetails,

    /// Attachment storage
    #[clap(flatten)]
    pub attachments: AttachmentsConfig,

    /// Mail composition settings
    #[clap(flatten)]
    pub mailing: MailingConfig,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply database migrations
    Migrate,

    /// Subscription consent
    #[command(subcommand)]
    Subscriptions(SubscriptionsCommand),

    /// Static attachment library
    #[command(subcommand)]
    Attachments(AttachmentsCommand),

    /// Mails
    #[command(subcommand)]
    Mail(MailCommand),

    /// Enable or disable campaigns
    #[command(subcommand)]
    Campaigns(CampaignsCommand),
}

/// Subscription commands
#[derive(Debug, Subcommand)]
pub enum SubscriptionsCommand {
    /// Show the consent of a recipient for every subscription type
    Show {
        /// Recipient
        email: EmailAddress,

        /// Print the choices as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set the consent of a recipient
    Set {
        /// Recipient
        email: EmailAddress,

        /// Desired consent as `TYPE_ID=true|false`, repeatable
        #[arg(value_parser = parse_choice, required = true)]
        choices: Vec<(i64, bool)>,
    },
}

/// Attachment library commands
#[derive(Debug, Subcommand)]
pub enum AttachmentsCommand {
    /// List every file in the library
    List,

    /// Check that a path names a file in the library
    Check {
        /// Path relative to the library root
        path: String,
    },
}

/// Mail commands
#[derive(Debug, Subcommand)]
pub enum MailCommand {
    /// Assemble a mail into an RFC 5322 message
    Assemble {
        /// Mail ID
        id: i64,

        /// Recipient
        #[arg(long)]
        to: String,

        /// Sender, defaults to the configured sender
        #[arg(long)]
        from: Option<String>,

        /// Write the message here instead of standard output
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete a mail and release its uploaded attachments
    Delete {
        /// Mail ID
        id: i64,
    },
}

/// Campaign commands
#[derive(Debug, Subcommand)]
pub enum CampaignsCommand {
    /// Enable campaigns
    Enable {
        /// Campaign IDs
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Disable campaigns
    Disable {
        /// Campaign IDs
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

fn parse_choice(raw: &str) -> Result<(i64, bool), String> {
    let (id, subscribed) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE_ID=true|false, got \"{raw}\""))?;

    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid subscription type ID \"{id}\""))?;
    let subscribed = subscribed
        .trim()
        .parse()
        .map_err(|_| format!("expected true or false, got \"{subscribed}\""))?;

    Ok((id, subscribed))
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let postgres = Arc::new(PostgresDatabase::new(&args.db.connection_string).await?);
    let library = Arc::new(args.attachments.static_library());
    let uploads = Arc::new(args.attachments.upload_store()?);

    match args.command {
        Command::Migrate => {
            postgres.migrate().await?;

            info!("migrations applied");
        }

        Command::Subscriptions(command) => {
            let subscriptions = SubscriptionServiceImpl::new(postgres);

            match command {
                SubscriptionsCommand::Show { email, json } => {
                    let choices = subscriptions.subscription_choices(&email).await?;

                    if json {
                        println!("{}", serde_json::to_string_pretty(&choices)?);

                        return Ok(());
                    }

                    for choice in choices {
                        println!(
                            "{}\t{}\t{}",
                            choice.subscription_type.id,
                            choice.subscription_type.name,
                            choice.subscribed
                        );
                    }
                }
                SubscriptionsCommand::Set { email, choices } => {
                    let desired: BTreeMap<i64, bool> = choices.into_iter().collect();
                    let report = subscriptions.reconcile(&email, &desired).await?;

                    for (subscription_type_id, outcome) in report.outcomes() {
                        match outcome {
                            Ok(SubscriptionChange::Unchanged) => {
                                println!("{subscription_type_id}\tunchanged")
                            }
                            Ok(SubscriptionChange::Created) => {
                                println!("{subscription_type_id}\tcreated")
                            }
                            Ok(SubscriptionChange::Updated) => {
                                println!("{subscription_type_id}\tupdated")
                            }
                            Err(e) => println!("{subscription_type_id}\tfailed: {e}"),
                        }
                    }

                    if !report.is_success() {
                        return Err(anyhow!("some subscriptions could not be updated"));
                    }
                }
            }
        }

        Command::Attachments(AttachmentsCommand::List) => {
            for path in library.list().await? {
                println!("{path}");
            }
        }

        Command::Attachments(AttachmentsCommand::Check { path }) => {
            library.validate(&path).await?;

            println!("{path}: ok");
        }

        Command::Mail(MailCommand::Assemble {
            id,
            to,
            from,
            output,
        }) => {
            let assembler = MailAssembler::new(
                postgres,
                library,
                uploads,
                args.mailing.subject_prefix.clone(),
            );
            let assembled = assembler.assemble(id).await?;

            for failed in &assembled.failed_attachments {
                eprintln!("skipped attachment {}: {}", failed.reference, failed.error);
            }

            let from: Mailbox = from
                .as_deref()
                .unwrap_or(&args.mailing.default_from)
                .parse()
                .context("invalid sender address")?;
            let to: Mailbox = to.parse().context("invalid recipient address")?;

            let message = assembled.to_message(from, to)?.formatted();

            match output {
                Some(path) => {
                    tokio::fs::write(&path, message)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;

                    info!(mail_id = id, path = %path.display(), "message written");
                }
                None => println!("{}", String::from_utf8_lossy(&message)),
            }
        }

        Command::Mail(MailCommand::Delete { id }) => {
            let mails = MailServiceImpl::new(postgres, library, uploads);
            let released = mails.delete_mail(id).await?;

            println!("mail {id} deleted, {released} attachment file(s) released");
        }

        Command::Campaigns(command) => {
            let mails = MailServiceImpl::new(postgres, library, uploads);

            let (ids, enabled) = match command {
                CampaignsCommand::Enable { ids } => (ids, true),
                CampaignsCommand::Disable { ids } => (ids, false),
            };

            let changed = mails.set_campaigns_enabled(&ids, enabled).await?;

            println!("{changed} campaign(s) updated");
        }
    }

    Ok(())
}
