//! Task list output for the publish pipeline.
//!
//! Each step prints one line. On a terminal the running step is drawn first
//! and then overwritten in place with its outcome; otherwise only outcomes
//! are printed.

use crossterm::{
    QueueableCommand,
    cursor::MoveToColumn,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
    tty::IsTty,
};
use dpm_core::Reporter;
use std::io::{self, Write, stdout};

use super::theme::Theme;

/// Terminal implementation of [`Reporter`].
#[derive(Debug, Clone)]
pub struct Output {
    theme: Theme,
    interactive: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            interactive: stdout().is_tty(),
        }
    }

    fn line(&self, icon: &str, color: Color, text: &str, detail: Option<&str>, newline: bool) {
        let mut out = stdout().lock();
        let _ = self.render(&mut out, icon, color, text, detail, newline);
    }

    fn render(
        &self,
        out: &mut impl Write,
        icon: &str,
        color: Color,
        text: &str,
        detail: Option<&str>,
        newline: bool,
    ) -> io::Result<()> {
        if self.interactive {
            out.queue(MoveToColumn(0))?
                .queue(Clear(ClearType::CurrentLine))?;
        }
        out.queue(SetForegroundColor(color))?
            .queue(Print(format!("  {icon} ")))?
            .queue(ResetColor)?
            .queue(Print(text))?;
        if let Some(detail) = detail {
            out.queue(SetForegroundColor(self.theme.colors.secondary))?
                .queue(Print(format!(" ({detail})")))?
                .queue(ResetColor)?;
        }
        if newline {
            out.queue(Print("\n"))?;
        }
        out.flush()
    }

    /// Print the final success line.
    pub fn success(&self, msg: &str) {
        let mut out = stdout().lock();
        let _ = out
            .queue(SetForegroundColor(self.theme.colors.success))
            .and_then(|out| out.queue(Print(format!("{msg}\n"))))
            .and_then(|out| out.queue(ResetColor))
            .and_then(Write::flush);
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        let mut out = stdout().lock();
        let _ = out
            .queue(SetForegroundColor(self.theme.colors.header))
            .and_then(|out| out.queue(Print(format!("\n{title} {}\n", "─".repeat(40)))))
            .and_then(|out| out.queue(ResetColor))
            .and_then(Write::flush);
    }

    fn task_started(&self, title: &str) {
        if self.interactive {
            self.line(self.theme.icons.active, self.theme.colors.active, title, None, false);
        }
    }

    fn task_done(&self, title: &str, detail: Option<&str>) {
        self.line(self.theme.icons.success, self.theme.colors.success, title, detail, true);
    }

    fn task_skipped(&self, title: &str, reason: &str) {
        self.line(
            self.theme.icons.skipped,
            self.theme.colors.secondary,
            title,
            Some(reason),
            true,
        );
    }

    fn task_failed(&self, title: &str, reason: &str) {
        self.line(self.theme.icons.error, self.theme.colors.error, title, Some(reason), true);
    }

    fn info(&self, msg: &str) {
        self.line(self.theme.icons.info, self.theme.colors.secondary, msg, None, true);
    }

    fn warning(&self, msg: &str) {
        self.line(self.theme.icons.warning, self.theme.colors.warning, msg, None, true);
    }
}
