//! Sendgate CLI entry point.
//!
//! Provides `check`, `confirm`, `destinations`, `lint`, and `watch`
//! subcommands. `check` and `confirm` exit with 0 for allow, 1 for block and
//! 2 for ask, so shell hooks can branch on the status alone. Any failure to
//! load rules exits non-zero as well: the send is blocked.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use sendgate::config::Config;
use sendgate::handle::RulesHandle;
use sendgate::hook::{PreSendHook, SendVerdict};
use sendgate::rules::{load_rules, Action};
use sendgate::validator::{MessageContext, ValidationResult, Validator};

/// Sendgate: decide whether an outgoing message may go to a destination.
#[derive(Parser)]
#[command(name = "sendgate", version, about)]
struct Cli {
    /// Path to `sendgate.toml` (default: `~/.sendgate/sendgate.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rules file, overriding the config and `SENDGATE_RULES`.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Validate one message and print the result as JSON.
    Check(MessageArgs),
    /// Print the confirmation prompt a withheld message would produce.
    Confirm(MessageArgs),
    /// List configured destinations by priority.
    Destinations,
    /// Load and check the rules file.
    Lint,
    /// Validate JSON message contexts read line by line from stdin.
    Watch,
}

/// One outgoing message described on the command line.
#[derive(Args)]
struct MessageArgs {
    /// Message content.
    content: String,
    /// Destination identifier.
    #[arg(long = "to")]
    destination: String,
    /// Channel tag.
    #[arg(long, default_value = "cli")]
    channel: String,
    /// Treat the message as a reply.
    #[arg(long)]
    reply: bool,
    /// Thread id.
    #[arg(long)]
    thread: Option<String>,
}

impl MessageArgs {
    fn into_context(self) -> MessageContext {
        let mut ctx = MessageContext::new(self.content, self.destination)
            .with_channel(self.channel)
            .with_reply(self.reply);
        ctx.thread_id = self.thread;
        ctx
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let rules_path = match cli.rules {
        Some(p) => p,
        None => config.rules_path()?,
    };

    match cli.command {
        Command::Watch => handle_watch(&config, &rules_path).await,
        Command::Check(args) => {
            sendgate::logging::init_cli(&config.logging.level);
            handle_check(&rules_path, args)
        }
        Command::Confirm(args) => {
            sendgate::logging::init_cli(&config.logging.level);
            handle_confirm(&rules_path, args)
        }
        Command::Destinations => {
            sendgate::logging::init_cli(&config.logging.level);
            handle_destinations(&rules_path)
        }
        Command::Lint => {
            sendgate::logging::init_cli(&config.logging.level);
            handle_lint(&rules_path)
        }
    }
}

fn load_validator(path: &Path) -> anyhow::Result<Validator> {
    let rules =
        load_rules(path).with_context(|| format!("failed to load rules {}", path.display()))?;
    Validator::new(rules).with_context(|| format!("invalid rules {}", path.display()))
}

fn exit_code(action: Action) -> ExitCode {
    match action {
        Action::Allow => ExitCode::SUCCESS,
        Action::Block => ExitCode::from(1),
        Action::Ask => ExitCode::from(2),
    }
}

/// Validate one message and print the JSON result.
fn handle_check(rules_path: &Path, args: MessageArgs) -> anyhow::Result<ExitCode> {
    let hook = PreSendHook::new(load_validator(rules_path)?);
    let result = hook.evaluate(&args.into_context());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(exit_code(result.action))
}

/// Print what the host would show or do for one message.
fn handle_confirm(rules_path: &Path, args: MessageArgs) -> anyhow::Result<ExitCode> {
    let hook = PreSendHook::new(load_validator(rules_path)?);
    match hook.check(&args.into_context()) {
        SendVerdict::Proceed => {
            println!("allowed");
            Ok(exit_code(Action::Allow))
        }
        SendVerdict::Reject { reason } => {
            println!("blocked: {reason}");
            Ok(exit_code(Action::Block))
        }
        SendVerdict::Confirm { prompt, .. } => {
            println!("{prompt}");
            Ok(exit_code(Action::Ask))
        }
    }
}

/// List destinations, highest priority first.
fn handle_destinations(rules_path: &Path) -> anyhow::Result<ExitCode> {
    let validator = load_validator(rules_path)?;
    let rules = validator.rules();
    for (key, dest) in rules.destinations_by_priority() {
        let description = dest.description.as_deref().unwrap_or("");
        println!(
            "{key:<24} {platform:<9} {priority:>4}  {name}  {description}",
            platform = dest.platform,
            priority = dest.priority,
            name = dest.name,
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Load and check the rules file, printing a summary.
fn handle_lint(rules_path: &Path) -> anyhow::Result<ExitCode> {
    let validator = load_validator(rules_path)?;
    let rules = validator.rules();
    let subtypes: usize = rules.message_types.values().map(|c| c.len()).sum();
    println!(
        "ok: version {}, {} destinations, {} categories ({} rules), {} detection rules",
        rules.version,
        rules.destinations.len(),
        rules.message_types.len(),
        subtypes,
        rules.detection_rules.len(),
    );
    Ok(ExitCode::SUCCESS)
}

/// Validate newline-delimited JSON contexts from stdin until EOF or Ctrl-C.
async fn handle_watch(config: &Config, rules_path: &Path) -> anyhow::Result<ExitCode> {
    let _logging_guard = match &config.logging.dir {
        Some(dir) => Some(sendgate::logging::init_production(dir, &config.logging.level)?),
        None => {
            sendgate::logging::init_cli(&config.logging.level);
            None
        }
    };

    let handle = if config.rules.watch {
        RulesHandle::watch(rules_path)?
    } else {
        Arc::new(
            RulesHandle::from_path(rules_path)
                .with_context(|| format!("failed to load rules {}", rules_path.display()))?,
        )
    };
    let hook = PreSendHook::new(Arc::clone(&handle));
    info!(rules = %rules_path.display(), reload = config.rules.watch, "sendgate watch started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<MessageContext>(&line) {
            Ok(ctx) => hook.evaluate(&ctx),
            Err(e) => {
                warn!(error = %e, "malformed message context, blocking");
                ValidationResult::validation_error()
            }
        };

        let mut out = serde_json::to_string(&result)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(ExitCode::SUCCESS)
}
