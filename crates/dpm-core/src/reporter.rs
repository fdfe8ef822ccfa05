//! Reporter trait for dependency injection
//!
//! The publish pipeline reports each of its steps through this trait so that
//! it can run under a terminal task list, in tests, or silently.

pub trait Reporter: Send + Sync {
    /// A new group of steps has started (e.g. "Initializing dpm").
    fn section(&self, title: &str);

    /// A step is about to run.
    fn task_started(&self, title: &str);

    /// A step finished; `detail` is an optional short result summary.
    fn task_done(&self, title: &str, detail: Option<&str>);

    /// A step had nothing to do.
    fn task_skipped(&self, title: &str, reason: &str);

    /// A step failed and the pipeline is about to stop.
    fn task_failed(&self, title: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn task_started(&self, title: &str) {
        (**self).task_started(title);
    }
    fn task_done(&self, title: &str, detail: Option<&str>) {
        (**self).task_done(title, detail);
    }
    fn task_skipped(&self, title: &str, reason: &str) {
        (**self).task_skipped(title, reason);
    }
    fn task_failed(&self, title: &str, reason: &str) {
        (**self).task_failed(title, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn task_started(&self, _: &str) {}
    fn task_done(&self, _: &str, _: Option<&str>) {}
    fn task_skipped(&self, _: &str, _: &str) {}
    fn task_failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
