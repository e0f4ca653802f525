//! Background update pipeline.
//!
//! [`UpdatePipeline::spawn`] runs check, download, apply, shortcuts and
//! uninstall registration on a tokio task. The caller receives every state
//! change, de-duplicated download progress and the final outcome over a
//! channel, and can render them on its own thread.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::UpdateError;
use crate::manager::{UpdateManager, UpdateState};
use crate::package::UpdateInfo;
use crate::repository::ProgressEvent;
use crate::shortcuts::ShortcutReport;
use crate::uninstall::UninstallEntry;

/// What happens to the run when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The run ends as failed
    Abort,
    /// The failure is logged and the run continues
    BestEffort,
}

/// One unit of work of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Check,
    Download,
    Apply,
    SyncShortcuts,
    RegisterUninstall,
}

impl PipelineStep {
    /// Shortcuts are cosmetic; everything else must succeed.
    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            Self::SyncShortcuts => FailurePolicy::BestEffort,
            _ => FailurePolicy::Abort,
        }
    }

    /// State entered when the step starts.
    pub fn running_state(&self) -> UpdateState {
        match self {
            Self::Check => UpdateState::Checking,
            Self::Download => UpdateState::Downloading,
            Self::Apply => UpdateState::Applying,
            Self::SyncShortcuts => UpdateState::SyncingShortcuts,
            Self::RegisterUninstall => UpdateState::RegisteringUninstall,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Check => "check",
            Self::Download => "download",
            Self::Apply => "apply",
            Self::SyncShortcuts => "shortcuts",
            Self::RegisterUninstall => "uninstall registration",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// No newer version was found
    NoUpdate,
    /// A version was installed
    Complete {
        info: UpdateInfo,
        app_dir: PathBuf,
        shortcuts: ShortcutReport,
        uninstall: UninstallEntry,
    },
    /// A step failed and the run was aborted
    Failed { step: PipelineStep, error: String },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Notification sent to the caller while a run progresses.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    State(UpdateState),
    Progress(ProgressEvent),
    Finished(PipelineOutcome),
}

/// Tracks the state of one run and publishes changes.
struct RunState<'a> {
    state: UpdateState,
    events: &'a mpsc::UnboundedSender<PipelineEvent>,
}

impl<'a> RunState<'a> {
    fn enter(&mut self, next: UpdateState) -> Result<(), UpdateError> {
        self.state = self.state.advance(next)?;
        info!("Update state: {}", self.state);
        // A dropped receiver only means nobody is watching.
        let _ = self.events.send(PipelineEvent::State(self.state.clone()));
        Ok(())
    }
}

type StepFailure = (PipelineStep, UpdateError);

/// A full update run for one manager.
#[derive(Clone)]
pub struct UpdatePipeline {
    manager: Arc<UpdateManager>,
    include_prereleases: bool,
}

impl UpdatePipeline {
    pub fn new(manager: Arc<UpdateManager>) -> Self {
        Self {
            manager,
            include_prereleases: false,
        }
    }

    pub fn with_prereleases(mut self, include: bool) -> Self {
        self.include_prereleases = include;
        self
    }

    pub fn manager(&self) -> &Arc<UpdateManager> {
        &self.manager
    }

    /// Run on a background task.
    ///
    /// The handle resolves to the same outcome that is sent as the final
    /// [`PipelineEvent::Finished`].
    pub fn spawn(self) -> (JoinHandle<PipelineOutcome>, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { self.run(tx).await });
        (handle, rx)
    }

    /// Run to completion, publishing events on `events`.
    pub async fn run(&self, events: mpsc::UnboundedSender<PipelineEvent>) -> PipelineOutcome {
        let mut run = RunState {
            state: UpdateState::Idle,
            events: &events,
        };

        let outcome = match self.execute(&mut run).await {
            Ok(outcome) => outcome,
            Err((step, e)) => {
                error!("Update {} failed: {}", step, e);
                let _ = run.enter(UpdateState::Failed(e.to_string()));
                PipelineOutcome::Failed {
                    step,
                    error: e.to_string(),
                }
            }
        };

        let _ = events.send(PipelineEvent::Finished(outcome.clone()));
        outcome
    }

    async fn execute(&self, run: &mut RunState<'_>) -> Result<PipelineOutcome, StepFailure> {
        let manager = &self.manager;

        let step = PipelineStep::Check;
        run.enter(step.running_state()).map_err(|e| (step, e))?;
        let check = manager
            .check_for_updates(self.include_prereleases)
            .await
            .map_err(|e| (step, e))?;
        let Some(info) = check.latest().cloned() else {
            run.enter(UpdateState::NoUpdate).map_err(|e| (step, e))?;
            return Ok(PipelineOutcome::NoUpdate);
        };
        run.enter(UpdateState::UpdateAvailable).map_err(|e| (step, e))?;

        let step = PipelineStep::Download;
        run.enter(step.running_state()).map_err(|e| (step, e))?;
        let progress_events = run.events.clone();
        let sink = move |event: ProgressEvent| {
            let _ = progress_events.send(PipelineEvent::Progress(event));
        };
        let downloaded = manager.download(&info, Some(&sink)).await.map_err(|e| (step, e))?;
        run.enter(UpdateState::Downloaded).map_err(|e| (step, e))?;

        let step = PipelineStep::Apply;
        run.enter(step.running_state()).map_err(|e| (step, e))?;
        let applied = manager.apply(downloaded).await.map_err(|e| (step, e))?;
        run.enter(UpdateState::Applied).map_err(|e| (step, e))?;

        let step = PipelineStep::SyncShortcuts;
        run.enter(step.running_state()).map_err(|e| (step, e))?;
        let shortcuts = match manager.sync_shortcuts(&applied).await {
            Ok(report) => report,
            Err(e) => match step.failure_policy() {
                FailurePolicy::BestEffort => {
                    warn!("Continuing without shortcuts: {}", e);
                    ShortcutReport {
                        created: Vec::new(),
                        failed: vec![(String::new(), e.to_string())],
                    }
                }
                FailurePolicy::Abort => return Err((step, e)),
            },
        };

        let step = PipelineStep::RegisterUninstall;
        run.enter(step.running_state()).map_err(|e| (step, e))?;
        let uninstall = manager.register_uninstall(&applied).await.map_err(|e| (step, e))?;
        run.enter(UpdateState::Complete).map_err(|e| (step, e))?;

        Ok(PipelineOutcome::Complete {
            info: applied.info,
            app_dir: applied.app_dir,
            shortcuts,
            uninstall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policies() {
        assert_eq!(PipelineStep::SyncShortcuts.failure_policy(), FailurePolicy::BestEffort);
        for step in [
            PipelineStep::Check,
            PipelineStep::Download,
            PipelineStep::Apply,
            PipelineStep::RegisterUninstall,
        ] {
            assert_eq!(step.failure_policy(), FailurePolicy::Abort);
        }
    }

    #[test]
    fn test_running_states_follow_each_other() {
        assert!(UpdateState::Idle.can_advance_to(&PipelineStep::Check.running_state()));
        assert!(UpdateState::UpdateAvailable.can_advance_to(&PipelineStep::Download.running_state()));
        assert!(UpdateState::Downloaded.can_advance_to(&PipelineStep::Apply.running_state()));
        assert!(UpdateState::Applied.can_advance_to(&PipelineStep::SyncShortcuts.running_state()));
        assert!(UpdateState::SyncingShortcuts.can_advance_to(&PipelineStep::RegisterUninstall.running_state()));
    }
}
