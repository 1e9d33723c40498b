#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::time::Instant;
use td_core::sideband::agent_errors::{AgentErrorEvent, log_agent_error};
use td_core::sideband::usage::{CommandUsageEvent, log_command_usage};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "td-db: inspect and maintain a td issue database",
    long_about = None
)]
struct Cli {
    /// Project directory containing `.todos/` (defaults to the current one).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Session id recorded in the sideband logs.
    #[arg(long, global = true, env = "TD_SESSION")]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create `.todos/issues.db` and apply every migration.
    Init,

    /// Apply pending migrations and report the schema version.
    Migrate,

    /// Dashboard statistics.
    Stats,

    /// Recent action-log rows, newest first.
    Actions {
        /// Only rows written by this session.
        #[arg(long = "for-session")]
        for_session: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Rows not yet pushed to a sync server.
    Pending {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Flag an action-log row as undone.
    UndoMark {
        /// Action id (`al-...`).
        action_id: String,
    },
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Migrate => "migrate",
            Self::Stats => "stats",
            Self::Actions { .. } => "actions",
            Self::Pending { .. } => "pending",
            Self::UndoMark { .. } => "undo-mark",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "td=debug,info"
        } else {
            "td=info,warn"
        })
    });

    let format = env::var("TD_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let base_dir = match cli.dir.clone() {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let command = cli.command.name();
    let session = cli.session.clone().unwrap_or_default();
    let args: Vec<String> = env::args().skip(1).collect();
    let started = Instant::now();

    let result = match &cli.command {
        Commands::Init => cmd::run_init(&base_dir, cli.json),
        Commands::Migrate => cmd::run_migrate(&base_dir, cli.json),
        Commands::Stats => cmd::run_stats(&base_dir, cli.json),
        Commands::Actions { for_session, limit } => {
            cmd::run_actions(&base_dir, for_session.as_deref(), *limit, cli.json)
        }
        Commands::Pending { limit } => cmd::run_pending(&base_dir, *limit, cli.json),
        Commands::UndoMark { action_id } => cmd::run_undo_mark(&base_dir, action_id, cli.json),
    };

    let mut usage = CommandUsageEvent::new(command);
    usage.args.clone_from(&args);
    usage.session_id.clone_from(&session);
    if cli.json {
        usage.flags.insert("json".to_string(), "true".to_string());
    }
    usage.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    usage.success = result.is_ok();

    if let Err(err) = &result {
        usage.error = Some(err.to_string());
        let mut event = AgentErrorEvent::new(command, format!("{err:#}"));
        event.args = args;
        event.session_id = session;
        event.error_code = err
            .downcast_ref::<td_core::Error>()
            .map(|core| core.code().code().to_string());
        log_agent_error(&base_dir, &event);
    }
    log_command_usage(&base_dir, &usage);
    debug!(command, success = usage.success, "command finished");

    result
}
