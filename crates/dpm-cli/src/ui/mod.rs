//! Terminal output
//!
//! - [`theme`] - Colors, icons and size formatting
//! - [`output`] - The task list that renders publish progress

pub mod output;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
