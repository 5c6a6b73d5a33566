use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::types::NotifierKind;

/// Receives shader compile and link failures during start-up.
///
/// Implementations may block; the renderer waits for `shader_failed` to return
/// before compiling the next shader.
pub trait CompileNotifier {
    fn shader_failed(&self, title: &str, log: &str);
}

/// Writes the diagnostic to the log and returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl CompileNotifier for LogNotifier {
    fn shader_failed(&self, title: &str, log: &str) {
        tracing::warn!(%title, "shader diagnostic:\n{log}");
    }
}

/// Shows a native error dialog and waits for the user to dismiss it.
#[cfg(feature = "dialogs")]
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogNotifier;

#[cfg(feature = "dialogs")]
impl CompileNotifier for DialogNotifier {
    fn shader_failed(&self, title: &str, log: &str) {
        rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Error)
            .set_title(format!("Shader error: {title}"))
            .set_description(log)
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
    }
}

/// Picks the notifier for `kind`. Dialogs degrade to logging when the crate
/// is built without the `dialogs` feature.
pub fn notifier_for(kind: NotifierKind) -> Box<dyn CompileNotifier> {
    match kind {
        #[cfg(feature = "dialogs")]
        NotifierKind::Dialog => Box::new(DialogNotifier),
        #[cfg(not(feature = "dialogs"))]
        NotifierKind::Dialog => {
            tracing::debug!("built without dialog support; shader errors go to the log");
            Box::new(LogNotifier)
        }
        NotifierKind::Log => Box::new(LogNotifier),
    }
}

/// Forwards failures to a notifier at most once per shader file, so a broken
/// source shared by several scenes raises a single dialog.
pub(crate) struct FailureReports<'a> {
    notifier: &'a dyn CompileNotifier,
    reported: HashSet<PathBuf>,
}

impl<'a> FailureReports<'a> {
    pub fn new(notifier: &'a dyn CompileNotifier) -> Self {
        Self {
            notifier,
            reported: HashSet::new(),
        }
    }

    /// Returns false when `source` was already reported.
    pub fn report(&mut self, source: &Path, title: &str, log: &str) -> bool {
        if !self.reported.insert(source.to_path_buf()) {
            tracing::debug!(path = %source.display(), %title, "failure already reported");
            return false;
        }
        self.notifier.shader_failed(title, log);
        true
    }
}
