//! UI Theme - colors and icons for the task list

use crossterm::style::Color;

#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
}

/// Color scheme for UI elements
#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Section headers
    pub header: Color,
    /// Step details and skipped steps
    pub secondary: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    /// The step currently running
    pub active: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::DarkGrey,
            secondary: Color::DarkGrey,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            active: Color::Cyan,
        }
    }
}

/// Status icons for different states
#[derive(Debug, Clone)]
pub struct Icons {
    /// Skipped step (○)
    pub skipped: &'static str,
    /// Running step (●)
    pub active: &'static str,
    /// Finished step (✓)
    pub success: &'static str,
    /// Failed step (✗)
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            skipped: "○",
            active: "●",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

/// Format bytes for human-readable display
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}
