//! Transport layer for terminal interaction

pub mod cli;
pub mod presenter;

pub use cli::OutputFormat;
pub use presenter::TerminalPresenter;
