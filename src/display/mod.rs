//! Terminal display helpers for the command-line interface.

pub mod progress;
pub mod theme;

pub use progress::StageProgress;
pub use theme::{THEME, Theme};
