use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod settings;

use commands::indents::view_query;
use settings::Settings;

#[derive(Parser)]
#[command(name = "indent-tracker")]
#[command(about = "Pharmacy indent tracker CLI", long_about = None)]
struct Cli {
    /// SQLite database file shared by every client (overrides INDENT_TRACKER_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Store namespace (overrides INDENT_TRACKER_NAMESPACE)
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new indent
    Add {
        /// Requesting ward (stored uppercase)
        #[arg(long)]
        ward: String,

        /// Supplying unit; defaults to the first configured unit
        #[arg(long)]
        unit: Option<String>,

        /// Category of the unit; defaults to the unit's first category
        #[arg(long)]
        category: Option<String>,

        /// Requesting staff member
        #[arg(long)]
        staff: Option<String>,
    },

    /// Print the board once
    List {
        /// Only this unit
        #[arg(long)]
        unit: Option<String>,

        /// Case-insensitive match on ward or staff
        #[arg(long)]
        search: Option<String>,
    },

    /// Print the board on every change until Ctrl-C
    Watch {
        #[arg(long)]
        unit: Option<String>,

        #[arg(long)]
        search: Option<String>,
    },

    /// Mark an indent ready for pickup (PENDING -> DONE)
    Ready { id: String },

    /// Confirm pickup (DONE -> COLLECTED)
    Collect {
        id: String,

        /// Name of the person collecting
        #[arg(long)]
        by: String,
    },

    /// Attach a note to an indent
    Note { id: String, text: String },

    /// Delete one indent
    Remove { id: String },

    /// Delete every collected indent
    ClearCollected,

    /// Delete every indent. Guardrail: refuses without --yes.
    ClearAll {
        /// Acknowledge that every client loses every indent.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Supplying units and their categories
    Units {
        #[command(subcommand)]
        cmd: UnitsCmd,
    },

    /// Application display name
    AppName {
        #[command(subcommand)]
        cmd: AppNameCmd,
    },

    /// Generated text via the Gemini API (needs GEMINI_API_KEY)
    Assist {
        #[command(subcommand)]
        cmd: AssistCmd,
    },
}

#[derive(Subcommand)]
enum UnitsCmd {
    List,

    /// Add a unit or replace its categories
    Add {
        name: String,

        /// Comma-separated categories, e.g. "Floor Stock, IV Drip"
        categories: String,
    },

    Remove { name: String },
}

#[derive(Subcommand)]
enum AppNameCmd {
    Show,
    Set { name: String },
}

#[derive(Subcommand)]
enum AssistCmd {
    /// Draft a message telling the ward an indent is ready
    Notify { id: String },

    /// Summarize the workload per unit
    Workload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env(cli.db, cli.namespace)?;

    let session = commands::open_session(&settings).await?;
    match cli.cmd {
        Commands::Add {
            ward,
            unit,
            category,
            staff,
        } => commands::indents::add(&session, unit, ward, staff, category).await,
        Commands::List { unit, search } => {
            commands::indents::list(&session, &view_query(unit, search))
        }
        Commands::Watch { unit, search } => {
            commands::indents::watch(&session, &view_query(unit, search)).await
        }
        Commands::Ready { id } => commands::indents::ready(&session, &id).await,
        Commands::Collect { id, by } => commands::indents::collect(&session, &id, &by).await,
        Commands::Note { id, text } => commands::indents::note(&session, &id, &text).await,
        Commands::Remove { id } => commands::indents::remove(&session, &id).await,
        Commands::ClearCollected => commands::indents::clear_collected(&session).await,
        Commands::ClearAll { yes } => commands::indents::clear_all(&session, yes).await,

        Commands::Units { cmd } => match cmd {
            UnitsCmd::List => commands::config::units_list(&session),
            UnitsCmd::Add { name, categories } => {
                commands::config::units_add(&session, &name, &categories).await
            }
            UnitsCmd::Remove { name } => commands::config::units_remove(&session, &name).await,
        },

        Commands::AppName { cmd } => match cmd {
            AppNameCmd::Show => commands::config::app_name_show(&session),
            AppNameCmd::Set { name } => commands::config::app_name_set(&session, &name).await,
        },

        Commands::Assist { cmd } => {
            let client = commands::assist::client(&settings.assist_config()?)?;
            match cmd {
                AssistCmd::Notify { id } => commands::assist::notify(&session, &client, &id).await,
                AssistCmd::Workload => commands::assist::workload(&session, &client).await,
            }
        }
    }
}

/// Logs go to stderr so command output stays parseable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
