//! CLI command handlers for direct terminal interaction

use super::presenter::{self, TerminalPresenter};
use crate::config::{mask_secret, ConfigField, ConfigPatch};
use crate::llm::Provider;
use crate::services::{AppContext, DispatchObserver, DispatchReport, NoopObserver};
use crate::storage::history::MAX_ENTRIES_PER_PROVIDER;
use crate::storage::{FlattenedEntry, HistoryStore};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::watch;

/// Unified history listing shows this many of the newest entries
pub const RECENT_HISTORY_LIMIT: usize = 20;

/// Output format shared by `ask`, `usage` and `config show`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => bail!("Unknown format '{}'. Use 'table' or 'json'", other),
        }
    }
}

/// Reject a send the way the composer does: blank prompts and an empty
/// configuration never reach the dispatcher
fn precheck_send(app: &AppContext, prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("Please enter a prompt");
    }
    if !app.config.has_any_key() {
        bail!(
            "No API keys configured. Add at least one with `promptdeck config set --gemini-key|--groq-key|--hf-key <KEY>`"
        );
    }
    Ok(())
}

async fn send(app: &AppContext, prompt: &str, format: OutputFormat) -> Result<DispatchReport> {
    precheck_send(app, prompt)?;

    let report = match format {
        OutputFormat::Json => {
            let report = app.dispatcher.dispatch(prompt, &NoopObserver).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report
        }
        OutputFormat::Table => {
            let mut revision = app.history.subscribe();
            let presenter = TerminalPresenter::stdout();
            let observer: &dyn DispatchObserver = &presenter;
            let report = app.dispatcher.dispatch(prompt, observer).await;

            println!("\n{}", "=== COMPARISON ===".bold().cyan());
            println!("{}", presenter::comparison_table(&report));
            if let Some(summary) = history_summary(app, &mut revision) {
                println!("\n{}", summary.dimmed());
            }
            report
        }
    };

    tracing::info!(
        succeeded = report.success_count(),
        providers = report.outcomes.len(),
        "Dispatch settled"
    );
    Ok(report)
}

/// Footer line refreshed only when the history changed since `revision` was
/// last seen
fn history_summary(app: &AppContext, revision: &mut watch::Receiver<u64>) -> Option<String> {
    if !revision.has_changed().unwrap_or(false) {
        return None;
    }
    revision.borrow_and_update();
    Some(format!(
        "📚 History now holds {} entries (promptdeck history list)",
        app.history.len()
    ))
}

/// Send a prompt to every configured provider
pub async fn run_ask(app: &AppContext, prompt: &str, format: OutputFormat) -> Result<()> {
    send(app, prompt, format).await?;
    Ok(())
}

/// Show the provider configuration with keys masked
pub fn run_config_show(app: &AppContext, format: OutputFormat) -> Result<()> {
    let config = app.config.snapshot();

    match format {
        OutputFormat::Json => {
            let masked: serde_json::Map<String, serde_json::Value> = ConfigField::ALL
                .iter()
                .map(|&field| {
                    let value = if field.is_secret() {
                        mask_secret(config.field(field))
                    } else {
                        config.get(field).to_string()
                    };
                    (field.as_str().to_string(), serde_json::Value::String(value))
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct ProviderRow {
                #[tabled(rename = "Provider")]
                provider: String,
                #[tabled(rename = "API Key")]
                key: String,
                #[tabled(rename = "Model")]
                model: String,
            }

            let rows: Vec<ProviderRow> = Provider::ALL
                .iter()
                .map(|&p| ProviderRow {
                    provider: format!("{} {}", p.icon(), p.display_name()),
                    key: mask_secret(config.field(p.key_field())),
                    model: config.get(p.model_field()).to_string(),
                })
                .collect();

            println!("\n{}", "=== PROVIDERS ===".bold().cyan());
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);

            if !config.has_any_key() {
                println!(
                    "\n{} Add a key with: promptdeck config set --groq-key <KEY>",
                    "Tip:".yellow()
                );
            }
        }
    }
    Ok(())
}

/// Merge the given fields into the stored configuration
pub fn run_config_set(app: &AppContext, patch: &ConfigPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("Nothing to set. Pass at least one of --gemini-key, --groq-key, --hf-key or a --*-model flag");
    }

    let config = app.config.save(patch);
    for field in ConfigField::ALL {
        if patch.get(field).is_some() {
            let shown = if field.is_secret() {
                mask_secret(config.field(field))
            } else {
                config.get(field).to_string()
            };
            println!("{} {} = {}", "✓".green(), field, shown);
        }
    }

    if !config.has_any_key() {
        println!(
            "{}",
            "Warning: no API key is set; prompts cannot be sent yet".yellow()
        );
    }
    Ok(())
}

pub fn run_config_reset(app: &AppContext) -> Result<()> {
    app.config.reset();
    println!("{} Provider configuration reset to defaults", "✓".green());
    Ok(())
}

/// List archived exchanges: the newest across all providers, or one provider's
/// bucket in stored order
pub fn run_history_list(
    app: &AppContext,
    provider: Option<Provider>,
    limit: Option<usize>,
) -> Result<()> {
    let entries: Vec<FlattenedEntry> = match provider {
        Some(p) => app
            .history
            .snapshot()
            .bucket(p)
            .iter()
            .take(limit.unwrap_or(MAX_ENTRIES_PER_PROVIDER))
            .enumerate()
            .map(|(idx, entry)| FlattenedEntry {
                provider: p,
                original_index: idx,
                entry: entry.clone(),
            })
            .collect(),
        None => app
            .history
            .get_all_flattened()
            .into_iter()
            .take(limit.unwrap_or(RECENT_HISTORY_LIMIT))
            .collect(),
    };

    if entries.is_empty() {
        println!("{}", "No history yet".dimmed());
        return Ok(());
    }

    let title = match provider {
        Some(p) => format!("=== {} {} HISTORY ===", p.icon(), p.display_name().to_uppercase()),
        None => "=== RECENT HISTORY ===".to_string(),
    };
    println!("\n{}", title.bold().cyan());
    println!("{}", presenter::history_table(&entries));
    println!(
        "\n{} Open one with: promptdeck history show <provider> <index>",
        "Tip:".yellow()
    );
    Ok(())
}

/// Show one archived exchange, optionally saving it as a text file
pub fn run_history_show(
    app: &AppContext,
    provider: Provider,
    index: usize,
    save: Option<&Path>,
) -> Result<()> {
    let entry = app
        .history
        .get(provider, index)
        .with_context(|| format!("No {} history entry at index {}", provider.display_name(), index))?;

    println!("{}", presenter::render_entry(provider, index, &entry));

    if let Some(path) = save {
        std::fs::write(path, presenter::entry_as_text(provider, &entry))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Saved to {}", "✓".green(), path.display());
    }
    Ok(())
}

/// Send an archived prompt again to every configured provider
pub async fn run_history_resend(
    app: &AppContext,
    provider: Provider,
    index: usize,
    format: OutputFormat,
) -> Result<()> {
    let entry = app
        .history
        .get(provider, index)
        .with_context(|| format!("No {} history entry at index {}", provider.display_name(), index))?;

    if format == OutputFormat::Table {
        println!("{} {}\n", "Resending:".bold(), presenter::preview(&entry.prompt, 80));
    }
    send(app, &entry.prompt, format).await?;
    Ok(())
}

/// Write the whole history as pretty JSON; returns the written path
pub fn run_history_export(app: &AppContext, output: Option<PathBuf>) -> Result<PathBuf> {
    let path = output.unwrap_or_else(|| {
        PathBuf::from(HistoryStore::export_file_name(
            chrono::Local::now().date_naive(),
        ))
    });

    let json = app.history.export_history()?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "{} Exported {} entries to {}",
        "✓".green(),
        app.history.len(),
        path.display()
    );
    Ok(path)
}

/// Replace the history with a previously exported file
pub fn run_history_import(app: &AppContext, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let usage = app.import_history(&json)?;

    println!(
        "{} Imported {} entries from {}",
        "✓".green(),
        usage.total,
        path.display()
    );
    Ok(())
}

pub fn run_history_clear(app: &AppContext) -> Result<()> {
    let removed = app.history.len();
    app.clear_history();
    println!("{} Cleared {} history entries", "✓".green(), removed);
    Ok(())
}

/// Show per-provider response counts
pub fn run_usage(app: &AppContext, format: OutputFormat) -> Result<()> {
    let usage = app.usage.snapshot();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
        OutputFormat::Table => {
            println!("\n{}", "=== PROMPTDECK USAGE ===".bold().cyan());
            println!("{}", presenter::usage_table(&usage));
            if usage.total == 0 {
                println!(
                    "\n{} Counts grow with every successful reply from `promptdeck ask`",
                    "Tip:".yellow()
                );
            }
        }
    }
    Ok(())
}

/// Remove every stored record (configuration, history, usage)
pub fn run_reset(app: &AppContext) -> Result<()> {
    if !app.reset_all() {
        bail!("Storage is unavailable; some records may not have been removed");
    }
    println!("{} All promptdeck data removed", "✓".green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completer, LlmError};
    use crate::storage::SafeStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl Completer for Echo {
        async fn complete(&self, _provider: Provider, prompt: &str) -> Result<String, LlmError> {
            Ok(prompt.to_uppercase())
        }
    }

    fn app() -> AppContext {
        AppContext::with_completer(SafeStore::in_memory(), Arc::new(Echo))
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected() {
        let app = app();
        app.config
            .save(&ConfigPatch::default().with(ConfigField::GroqKey, "k"));

        let err = run_ask(&app, "   \n", OutputFormat::Json).await.unwrap_err();
        assert!(err.to_string().contains("enter a prompt"));
        assert!(app.history.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_keys_is_rejected() {
        let app = app();
        let err = run_ask(&app, "hello", OutputFormat::Json).await.unwrap_err();
        assert!(err.to_string().contains("No API keys configured"));
        assert!(app.history.is_empty());
    }

    #[tokio::test]
    async fn test_resend_reuses_archived_prompt() {
        let app = app();
        app.config
            .save(&ConfigPatch::default().with(ConfigField::GeminiKey, "k"));
        app.history.add(Provider::Gemini, "old question", "old answer", "m");

        run_history_resend(&app, Provider::Gemini, 0, OutputFormat::Json)
            .await
            .unwrap();

        let newest = app.history.get(Provider::Gemini, 0).unwrap();
        assert_eq!(newest.prompt, "old question");
        assert_eq!(newest.response, "OLD QUESTION");
        assert_eq!(app.usage.snapshot().gemini, 1);
    }

    #[tokio::test]
    async fn test_history_summary_follows_revisions() {
        let app = app();
        let mut revision = app.history.subscribe();
        assert!(history_summary(&app, &mut revision).is_none());

        app.config
            .save(&ConfigPatch::default().with(ConfigField::GroqKey, "k"));
        app.dispatcher.dispatch("hello", &NoopObserver).await;

        let summary = history_summary(&app, &mut revision).unwrap();
        assert!(summary.contains("1 entries"));
        // Seen once, quiet until the next mutation
        assert!(history_summary(&app, &mut revision).is_none());
    }

    #[test]
    fn test_show_missing_index_errors() {
        let app = app();
        let err = run_history_show(&app, Provider::Groq, 3, None).unwrap_err();
        assert!(err.to_string().contains("No Groq history entry at index 3"));
    }

    #[test]
    fn test_show_saves_text_file() {
        let temp = TempDir::new().unwrap();
        let app = app();
        app.history.add(Provider::Groq, "q", "a", "llama");

        let path = temp.path().join("answer.txt");
        run_history_show(&app, Provider::Groq, 0, Some(&path)).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("## Question\n\nq"));
        assert!(saved.contains("## Answer\n\na"));
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let temp = TempDir::new().unwrap();
        let source = app();
        source.history.add(Provider::HuggingFace, "p1", "r1", "qwen");
        source.history.add(Provider::Groq, "p2", "r2", "llama");

        let path = run_history_export(&source, Some(temp.path().join("h.json"))).unwrap();

        let target = app();
        run_history_import(&target, &path).unwrap();
        assert_eq!(target.history.snapshot(), source.history.snapshot());
        assert_eq!(target.usage.snapshot().total, 2);
        assert_eq!(target.usage.snapshot().hf, 1);
    }

    #[test]
    fn test_config_set_requires_a_field() {
        let app = app();
        assert!(run_config_set(&app, &ConfigPatch::default()).is_err());
        run_config_set(
            &app,
            &ConfigPatch::default().with(ConfigField::HfModel, "meta-llama/Llama-3.1-8B"),
        )
        .unwrap();
        assert_eq!(app.config.model_for(Provider::HuggingFace), "meta-llama/Llama-3.1-8B");
    }

    #[test]
    fn test_clear_and_reset() {
        let app = app();
        app.history.add(Provider::Groq, "q", "a", "m");
        app.usage.sync_with_history(&app.history.snapshot());

        run_history_clear(&app).unwrap();
        assert!(app.history.is_empty());
        assert_eq!(app.usage.snapshot().total, 0);

        app.config
            .save(&ConfigPatch::default().with(ConfigField::GroqKey, "k"));
        run_reset(&app).unwrap();
        assert!(!app.config.has_any_key());
    }
}
