//! Terminal rendering of dispatch progress, result cards and history

use crate::llm::Provider;
use crate::services::{DispatchObserver, DispatchReport, Outcome};
use crate::storage::{FlattenedEntry, HistoryEntry, UsageCounters};
use chrono::Local;
use colored::Colorize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tabled::{settings::Style, Table, Tabled};

/// Prompt previews in listings are cut at this many characters
const PROMPT_PREVIEW_CHARS: usize = 50;

/// Reply previews in the comparison table are cut at this many characters
const REPLY_PREVIEW_CHARS: usize = 60;

/// Streams result cards to a writer as providers settle
pub struct TerminalPresenter<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalPresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // Output errors (closed pipe) are not worth failing a dispatch over
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }
}

impl<W: Write + Send> DispatchObserver for TerminalPresenter<W> {
    fn on_missing_key(&self, provider: Provider) {
        self.emit(
            &format!(
                "🔑 {} {}: waiting for API key (promptdeck config set --{}-key <KEY>)",
                provider.icon(),
                provider.display_name(),
                provider.id()
            )
            .yellow()
            .to_string(),
        );
    }

    fn on_dispatch_started(&self, active: &[Provider]) {
        for provider in active {
            self.emit(
                &format!("⏳ {} {} thinking...", provider.icon(), provider.display_name())
                    .dimmed()
                    .to_string(),
            );
        }
    }

    fn on_success(&self, provider: Provider, response: &str, _prompt: &str) {
        let header = format!("━━ {} {} ━━", provider.icon(), provider.display_name());
        self.emit(&format!("\n{}\n{}\n", header.bold().green(), response));
    }

    fn on_failure(&self, provider: Provider, message: &str, _prompt: &str) {
        self.emit(
            &format!(
                "\n🚫 {} {} failed: {}\n",
                provider.icon(),
                provider.display_name(),
                message
            )
            .red()
            .to_string(),
        );
    }
}

/// Cut `text` to `max` characters on one line, adding "..." when shortened
pub fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        flat.to_string()
    }
}

fn provider_label(provider: Provider) -> String {
    format!("{} {}", provider.icon(), provider.display_name())
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Unified side-by-side view of one dispatch
pub fn comparison_table(report: &DispatchReport) -> String {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Provider")]
        provider: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Model")]
        model: String,
        #[tabled(rename = "Chars")]
        chars: String,
        #[tabled(rename = "Reply")]
        reply: String,
    }

    let rows: Vec<Row> = report
        .outcomes
        .iter()
        .map(|o| match &o.outcome {
            Outcome::Success { response, model } => Row {
                provider: provider_label(o.provider),
                status: "✓ ok".to_string(),
                model: model.clone(),
                chars: format_number(response.chars().count() as u64),
                reply: preview(response, REPLY_PREVIEW_CHARS),
            },
            Outcome::Failed { message, .. } => Row {
                provider: provider_label(o.provider),
                status: "✗ error".to_string(),
                model: "-".to_string(),
                chars: "-".to_string(),
                reply: preview(message, REPLY_PREVIEW_CHARS),
            },
            Outcome::MissingKey => Row {
                provider: provider_label(o.provider),
                status: "… no key".to_string(),
                model: "-".to_string(),
                chars: "-".to_string(),
                reply: "Waiting for API key".to_string(),
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// History listing; `#` is the `provider:index` to pass to `history show`
pub fn history_table(entries: &[FlattenedEntry]) -> String {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "#")]
        id: String,
        #[tabled(rename = "Provider")]
        provider: String,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Model")]
        model: String,
        #[tabled(rename = "Prompt")]
        prompt: String,
    }

    let rows: Vec<Row> = entries
        .iter()
        .map(|f| Row {
            id: format!("{}:{}", f.provider.id(), f.original_index),
            provider: provider_label(f.provider),
            when: f
                .entry
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            model: f.entry.model.clone(),
            prompt: preview(&f.entry.prompt, PROMPT_PREVIEW_CHARS),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// Full view of one archived exchange
pub fn render_entry(provider: Provider, index: usize, entry: &HistoryEntry) -> String {
    format!(
        "{}\n{}\n\n{}\n{}\n",
        format!(
            "👤 QUESTION  ({}:{}, {})",
            provider.id(),
            index,
            entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        )
        .bold(),
        entry.prompt,
        format!(
            "📜 {} ARCHIVE  ({})",
            provider.display_name().to_uppercase(),
            entry.model
        )
        .bold()
        .cyan(),
        entry.response
    )
}

/// Plain-text form of an exchange for saving to a file
pub fn entry_as_text(provider: Provider, entry: &HistoryEntry) -> String {
    format!(
        "# {} ({})\n\n## Question\n\n{}\n\n## Answer\n\n{}\n",
        provider.display_name(),
        entry.model,
        entry.prompt,
        entry.response
    )
}

pub fn usage_table(usage: &UsageCounters) -> String {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Provider")]
        provider: String,
        #[tabled(rename = "Responses")]
        count: String,
    }

    let mut rows: Vec<Row> = Provider::ALL
        .iter()
        .map(|&p| Row {
            provider: provider_label(p),
            count: format_number(usage.for_provider(p)),
        })
        .collect();
    rows.push(Row {
        provider: "Total".to_string(),
        count: format_number(usage.total),
    });

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ProviderOutcome;

    #[test]
    fn test_preview_truncates_and_flattens() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("line one\nline two", 100), "line one line two");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
        // Multi-byte characters are not split
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_presenter_writes_cards() {
        colored::control::set_override(false);
        let presenter = TerminalPresenter::new(Vec::new());
        presenter.on_missing_key(Provider::Gemini);
        presenter.on_dispatch_started(&[Provider::Groq]);
        presenter.on_success(Provider::Groq, "**Hello** there", "hi");
        presenter.on_failure(Provider::HuggingFace, "invalid key", "hi");

        let out = String::from_utf8(presenter.into_inner()).unwrap();
        assert!(out.contains("Gemini: waiting for API key"));
        assert!(out.contains("Groq thinking"));
        assert!(out.contains("**Hello** there"));
        assert!(out.contains("Hugging Face failed: invalid key"));
    }

    #[test]
    fn test_comparison_table_covers_every_outcome() {
        let report = DispatchReport {
            prompt: "hello".to_string(),
            outcomes: vec![
                ProviderOutcome {
                    provider: Provider::Gemini,
                    outcome: Outcome::Success {
                        response: "Hi!".to_string(),
                        model: "gemini-2.5-flash".to_string(),
                    },
                },
                ProviderOutcome {
                    provider: Provider::Groq,
                    outcome: Outcome::Failed {
                        message: "invalid key".to_string(),
                        http_status: Some(401),
                    },
                },
                ProviderOutcome {
                    provider: Provider::HuggingFace,
                    outcome: Outcome::MissingKey,
                },
            ],
        };

        let table = comparison_table(&report);
        assert!(table.contains("gemini-2.5-flash"));
        assert!(table.contains("invalid key"));
        assert!(table.contains("Waiting for API key"));
    }

    #[test]
    fn test_entry_as_text() {
        let entry = HistoryEntry::now("What is Rust?", "A language.", "llama");
        let text = entry_as_text(Provider::Groq, &entry);
        assert!(text.starts_with("# Groq (llama)"));
        assert!(text.contains("## Question\n\nWhat is Rust?"));
        assert!(text.contains("## Answer\n\nA language."));
    }

    #[test]
    fn test_usage_table_has_total_row() {
        let table = usage_table(&UsageCounters {
            total: 1500,
            gemini: 1000,
            groq: 500,
            hf: 0,
        });
        assert!(table.contains("Total"));
        assert!(table.contains("1,500"));
    }
}
