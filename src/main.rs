use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use promptdeck::config::{ConfigField, ConfigPatch, Settings};
use promptdeck::llm::Provider;
use promptdeck::services::AppContext;
use promptdeck::storage::SafeStore;
use promptdeck::transport::cli;
use promptdeck::transport::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PROMPTDECK_GIT_HASH"),
    ", built ",
    env!("PROMPTDECK_BUILD_TIME"),
    ")"
);

#[derive(Parser)]
#[command(name = "promptdeck")]
#[command(author, version, long_version = LONG_VERSION)]
#[command(about = "Ask Gemini, Groq and Hugging Face the same question and compare the answers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding stored keys, history and usage
    #[arg(long, global = true, env = "PROMPTDECK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true, env = "PROMPTDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt to every provider with a key
    Ask {
        /// The prompt text
        prompt: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show or change provider keys and models
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Browse, export and import past replies
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show reply counts per provider
    Usage {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove all stored keys, history and usage
    Reset,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the configuration with keys masked
    Show {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Set one or more keys or models
    Set(SetArgs),

    /// Restore default models and forget every key
    Reset,
}

#[derive(Args)]
struct SetArgs {
    /// Google Gemini API key
    #[arg(long)]
    gemini_key: Option<String>,

    /// Groq API key
    #[arg(long)]
    groq_key: Option<String>,

    /// Hugging Face access token
    #[arg(long)]
    hf_key: Option<String>,

    /// Gemini model (e.g., gemini-2.5-flash)
    #[arg(long)]
    gemini_model: Option<String>,

    /// Groq model (e.g., llama-3.3-70b-versatile)
    #[arg(long)]
    groq_model: Option<String>,

    /// Hugging Face model (e.g., Qwen/Qwen2.5-72B-Instruct)
    #[arg(long)]
    hf_model: Option<String>,
}

impl SetArgs {
    fn into_patch(self) -> ConfigPatch {
        let pairs = [
            (ConfigField::GeminiKey, self.gemini_key),
            (ConfigField::GroqKey, self.groq_key),
            (ConfigField::HfKey, self.hf_key),
            (ConfigField::GeminiModel, self.gemini_model),
            (ConfigField::GroqModel, self.groq_model),
            (ConfigField::HfModel, self.hf_model),
        ];
        pairs
            .into_iter()
            .fold(ConfigPatch::default(), |patch, (field, value)| match value {
                Some(value) => patch.with(field, value),
                None => patch,
            })
    }
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recent exchanges (all providers) or one provider's archive
    List {
        /// Only this provider (gemini, groq, hf)
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Maximum rows to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one exchange in full
    Show {
        provider: Provider,
        index: usize,

        /// Also save the exchange as a text file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Send an archived prompt again to every provider
    Resend {
        provider: Provider,
        index: usize,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Write the whole history to a JSON file
    Export {
        /// Output path (default: promptdeck_history_<date>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the history with an exported JSON file
    Import { file: PathBuf },

    /// Delete every archived exchange
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "promptdeck=debug"
    } else {
        "promptdeck=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let data_dir = settings.data_dir(cli.data_dir.as_deref());
    tracing::debug!("Using data directory {}", data_dir.display());

    let app = AppContext::open(SafeStore::file(data_dir), &settings.endpoints);

    match cli.command {
        Commands::Ask { prompt, format } => {
            cli::run_ask(&app, &prompt, format).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => cli::run_config_show(&app, format)?,
            ConfigAction::Set(args) => cli::run_config_set(&app, &args.into_patch())?,
            ConfigAction::Reset => cli::run_config_reset(&app)?,
        },
        Commands::History { action } => match action {
            HistoryAction::List { provider, limit } => {
                cli::run_history_list(&app, provider, limit)?;
            }
            HistoryAction::Show {
                provider,
                index,
                save,
            } => {
                cli::run_history_show(&app, provider, index, save.as_deref())?;
            }
            HistoryAction::Resend {
                provider,
                index,
                format,
            } => {
                cli::run_history_resend(&app, provider, index, format).await?;
            }
            HistoryAction::Export { output } => {
                cli::run_history_export(&app, output)?;
            }
            HistoryAction::Import { file } => cli::run_history_import(&app, &file)?,
            HistoryAction::Clear => cli::run_history_clear(&app)?,
        },
        Commands::Usage { format } => {
            cli::run_usage(&app, format)?;
        }
        Commands::Reset => {
            cli::run_reset(&app)?;
        }
    }

    Ok(())
}
