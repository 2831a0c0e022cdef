use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use starwatch::AuditProgress;

/// Mutable progress state, guarded by one lock.
#[derive(Default)]
struct ProgressState {
    /// Spinner for the current listing stage.
    stage_bar: Option<ProgressBar>,
    /// Bar for stargazer collection across repositories.
    collect_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn stage_bar(&self, state: &mut ProgressState, prefix: &str) -> ProgressBar {
        if let Some(bar) = state.stage_bar.take()
            && !bar.is_finished()
        {
            bar.finish_and_clear();
        }
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(Self::spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_prefix(format!("{:12}", prefix));
        state.stage_bar = Some(bar.clone());
        bar
    }

    pub fn handle(&self, event: AuditProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            AuditProgress::RateLimitChecked {
                remaining, limit, ..
            } => {
                let _ = self
                    .multi
                    .println(format!("Rate limit: {remaining}/{limit} requests remaining"));
            }

            AuditProgress::StageStarted { stage } => {
                let bar = self.stage_bar(&mut state, &stage.to_string());
                bar.set_message("Starting...");
            }

            AuditProgress::FetchedPage {
                namespace,
                page,
                total_so_far,
                ..
            } => {
                // Per-repository pages are reflected by the collection bar.
                if state.collect_bar.is_none()
                    && let Some(ref bar) = state.stage_bar
                {
                    bar.set_message(format!("{namespace}: page {page} ({total_so_far} so far)"));
                }
            }

            AuditProgress::RepositoriesListed { count, .. } => {
                if let Some(bar) = state.stage_bar.take() {
                    bar.finish_with_message(format!("✓ {count} repositories"));
                }
            }

            AuditProgress::CollectingStargazers { repositories, .. } => {
                if let Some(bar) = state.stage_bar.take() {
                    bar.finish_and_clear();
                }
                let bar = self.multi.add(ProgressBar::new(repositories as u64));
                bar.set_style(Self::bar_style());
                bar.set_prefix(format!("{:12}", "Stargazers"));
                state.collect_bar = Some(bar);
            }

            AuditProgress::RepositoryCollected {
                repository,
                stargazers,
            } => {
                if let Some(ref bar) = state.collect_bar {
                    bar.inc(1);
                    bar.set_message(format!("{repository} ({stargazers})"));
                }
            }

            AuditProgress::RepositoryFailed { repository, error } => {
                if let Some(ref bar) = state.collect_bar {
                    bar.inc(1);
                    bar.println(format!("✗ {repository}: {error}"));
                }
            }

            AuditProgress::CollectionComplete { succeeded, failed } => {
                if let Some(bar) = state.collect_bar.take() {
                    let msg = if failed > 0 {
                        format!("✓ {succeeded} collected, {failed} failed")
                    } else {
                        format!("✓ {succeeded} collected")
                    };
                    bar.finish_with_message(msg);
                }
            }

            AuditProgress::RateLimitBackoff { wait, .. } => {
                let msg = format!("Rate limited, waiting {}s for reset...", wait.as_secs());
                match (&state.collect_bar, &state.stage_bar) {
                    (Some(bar), _) | (None, Some(bar)) => bar.set_message(msg),
                    (None, None) => {
                        let _ = self.multi.println(msg);
                    }
                }
            }

            AuditProgress::TransientRetry {
                label,
                delay,
                attempt,
                ..
            } => {
                if let Some(ref bar) = state.stage_bar {
                    bar.set_message(format!(
                        "{label}: retry {attempt} in {}ms",
                        delay.as_millis()
                    ));
                }
            }

            AuditProgress::FollowListFetched { count, .. } => {
                if let Some(bar) = state.stage_bar.take() {
                    bar.finish_with_message(format!("✓ {count} accounts"));
                }
            }

            AuditProgress::AuditComplete { .. } => {
                self.finish_locked(&mut state);
            }

            _ => {}
        }
    }

    fn finish_locked(&self, state: &mut ProgressState) {
        for bar in [state.stage_bar.take(), state.collect_bar.take()]
            .into_iter()
            .flatten()
        {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }

    /// Stop any bars still running, e.g. after a failed run.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.finish_locked(&mut state);
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
