//! promptdeck: send one prompt to several LLM providers and compare replies
//!
//! This library provides:
//! - Adapters for Google Gemini, Groq and the Hugging Face router
//! - A fan-out dispatcher that queries every configured provider concurrently
//! - Namespaced local persistence for provider keys, history and usage counts
//! - Terminal rendering and CLI command handlers

pub mod config;
pub mod llm;
pub mod services;
pub mod storage;
pub mod transport;

pub use config::{ConfigStore, Settings};
pub use llm::{Completer, HttpCompleter, LlmError, Provider};
pub use services::{AppContext, DispatchReport, FanOutDispatcher};
pub use storage::{HistoryStore, SafeStore, UsageTracker};
