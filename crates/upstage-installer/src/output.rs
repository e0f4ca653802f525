//! Console rendering of pipeline events.

use std::io::{self, Write};

use upstage_updater::{PipelineEvent, PipelineOutcome, UpdateState};

/// Writes one line per state change and a progress line per percentage.
pub struct ConsoleRenderer<W: Write> {
    out: W,
    quiet: bool,
}

impl ConsoleRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, quiet: false }
    }

    /// Only the final outcome is written.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &PipelineEvent) -> io::Result<()> {
        match event {
            PipelineEvent::State(state) if !self.quiet => {
                if let Some(line) = state_line(state) {
                    writeln!(self.out, "{}", line)?;
                }
            }
            PipelineEvent::Progress(progress) if !self.quiet => {
                writeln!(self.out, "  {}: {}%", progress.operation, progress.percent)?;
            }
            PipelineEvent::Finished(outcome) => {
                writeln!(self.out, "{}", outcome_line(outcome))?;
                if let PipelineOutcome::Complete { shortcuts, .. } = outcome {
                    for (title, reason) in &shortcuts.failed {
                        writeln!(self.out, "  shortcut {:?} not created: {}", title, reason)?;
                    }
                }
            }
            _ => {}
        }
        self.out.flush()
    }
}

fn state_line(state: &UpdateState) -> Option<&'static str> {
    let line = match state {
        UpdateState::Checking => "Checking for updates...",
        UpdateState::Downloading => "Downloading...",
        UpdateState::Applying => "Installing files...",
        UpdateState::SyncingShortcuts => "Creating shortcuts...",
        UpdateState::RegisteringUninstall => "Registering uninstaller...",
        _ => return None,
    };
    Some(line)
}

/// Summary line for a finished run.
pub fn outcome_line(outcome: &PipelineOutcome) -> String {
    match outcome {
        PipelineOutcome::NoUpdate => "No package available to install".to_string(),
        PipelineOutcome::Complete { info, app_dir, .. } => format!(
            "Installed {} {} to {}",
            info.package_id(),
            info.version(),
            app_dir.display()
        ),
        PipelineOutcome::Failed { step, error } => format!("Install failed during {}: {}", step, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upstage_updater::{PipelineStep, ProgressEvent};

    fn rendered(renderer: ConsoleRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_renders_states_and_progress() {
        let mut renderer = ConsoleRenderer::new(Vec::new());
        renderer.render(&PipelineEvent::State(UpdateState::Checking)).unwrap();
        renderer.render(&PipelineEvent::State(UpdateState::UpdateAvailable)).unwrap();
        renderer
            .render(&PipelineEvent::Progress(ProgressEvent::new("Downloading Ledger 1.1.0", 50)))
            .unwrap();
        renderer.render(&PipelineEvent::Finished(PipelineOutcome::NoUpdate)).unwrap();

        assert_eq!(
            rendered(renderer),
            "Checking for updates...\n  Downloading Ledger 1.1.0: 50%\nNo package available to install\n"
        );
    }

    #[test]
    fn test_quiet_renders_only_outcome() {
        let mut renderer = ConsoleRenderer::new(Vec::new()).quiet();
        renderer.render(&PipelineEvent::State(UpdateState::Checking)).unwrap();
        renderer
            .render(&PipelineEvent::Finished(PipelineOutcome::Failed {
                step: PipelineStep::Apply,
                error: "disk full".to_string(),
            }))
            .unwrap();

        assert_eq!(rendered(renderer), "Install failed during apply: disk full\n");
    }
}
