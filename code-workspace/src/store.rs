use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

use crate::{
    action::Action,
    error::Result,
    reducer::reduce,
    state::{ExecutionResult, WorkspaceState},
};

/// How the store treats overlapping runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrdering {
    /// Whichever run resolves last overwrites the result, even if it was issued first
    #[default]
    LastResolvedWins,
    /// Only the most recently issued run may publish its outcome
    LatestIssuedWins,
}

/// Handle for one dispatched run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    sequence: u64,
}

impl RunTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

struct Inner {
    state: WorkspaceState,
    latest_run: u64,
    log: Option<Vec<Action>>,
}

impl Inner {
    fn apply(&mut self, action: Action) {
        debug!(action = action.kind(), "applying action");
        self.state = reduce(&self.state, &action);
        if let Some(log) = self.log.as_mut() {
            log.push(action);
        }
    }
}

/// The single mutable resource of a workspace.
///
/// All mutation goes through [`Action`]s; observers get every new state via
/// [`WorkspaceStore::subscribe`]. The lock is never held across an await.
pub struct WorkspaceStore {
    inner: Mutex<Inner>,
    notifier: watch::Sender<WorkspaceState>,
    ordering: RunOrdering,
}

impl WorkspaceStore {
    pub fn new(initial: WorkspaceState) -> Self {
        let (notifier, _) = watch::channel(initial.clone());
        Self {
            inner: Mutex::new(Inner {
                state: initial,
                latest_run: 0,
                log: None,
            }),
            notifier,
            ordering: RunOrdering::default(),
        }
    }

    pub fn with_run_ordering(mut self, ordering: RunOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Record every applied action so the session can be replayed later.
    pub fn with_action_log(mut self) -> Self {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .log = Some(Vec::new());
        self
    }

    pub fn run_ordering(&self) -> RunOrdering {
        self.ordering
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.lock().state.clone()
    }

    /// Read from the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&WorkspaceState) -> R) -> R {
        f(&self.lock().state)
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkspaceState> {
        self.notifier.subscribe()
    }

    pub fn action_log(&self) -> Vec<Action> {
        self.lock().log.clone().unwrap_or_default()
    }

    pub fn dispatch(&self, action: Action) -> WorkspaceState {
        self.dispatch_all([action])
    }

    /// Apply several actions under one lock and notify observers once.
    pub fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) -> WorkspaceState {
        let mut inner = self.lock();
        for action in actions {
            inner.apply(action);
        }
        self.publish(&inner)
    }

    /// Derive actions from the current state and apply them under one lock.
    ///
    /// `f` may perform a synchronous side effect, such as a storage write, that
    /// has to stay in step with the published state. When it fails nothing is
    /// applied. `f` must not call back into the store.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&WorkspaceState) -> Result<(Vec<Action>, T)>,
    ) -> Result<T> {
        let mut inner = self.lock();
        let (actions, value) = f(&inner.state)?;
        if !actions.is_empty() {
            for action in actions {
                inner.apply(action);
            }
            self.publish(&inner);
        }
        Ok(value)
    }

    /// Enter Loading with an empty result and issue a ticket for the run.
    pub fn begin_run(&self) -> RunTicket {
        let mut inner = self.lock();
        Self::issue_run(&mut inner);
        self.publish(&inner);

        RunTicket {
            sequence: inner.latest_run,
        }
    }

    /// [`begin_run`](Self::begin_run) only if `admit` accepts the current state.
    ///
    /// The check and the Loading transition share one lock, so two callers
    /// admitted by the same state cannot both start.
    pub fn begin_run_if<T>(
        &self,
        admit: impl FnOnce(&WorkspaceState) -> Result<T>,
    ) -> Result<(RunTicket, T)> {
        let mut inner = self.lock();
        let admitted = admit(&inner.state)?;
        Self::issue_run(&mut inner);
        self.publish(&inner);

        Ok((
            RunTicket {
                sequence: inner.latest_run,
            },
            admitted,
        ))
    }

    fn issue_run(inner: &mut Inner) {
        inner.latest_run += 1;
        inner.apply(Action::SetLoading(true));
        inner.apply(Action::SetResult(ExecutionResult::default()));
    }

    /// Publish a run outcome and leave Loading.
    ///
    /// Returns `false` when the outcome was discarded because a newer run was
    /// issued under [`RunOrdering::LatestIssuedWins`]. `None` clears Loading
    /// without touching the result.
    pub fn complete_run(&self, ticket: RunTicket, result: Option<ExecutionResult>) -> bool {
        let mut inner = self.lock();
        if self.ordering == RunOrdering::LatestIssuedWins && ticket.sequence != inner.latest_run {
            debug!(
                run = ticket.sequence,
                latest = inner.latest_run,
                "discarding outcome of superseded run"
            );
            return false;
        }

        if let Some(result) = result {
            inner.apply(Action::SetResult(result));
        }
        inner.apply(Action::SetLoading(false));
        self.publish(&inner);
        true
    }

    fn publish(&self, inner: &Inner) -> WorkspaceState {
        self.notifier.send_replace(inner.state.clone());
        inner.state.clone()
    }

    // A panic elsewhere must not stop Loading from being cleared.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WorkspaceStore {
    fn default() -> Self {
        Self::new(WorkspaceState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkspaceError;
    use crate::reducer::replay;

    fn result(output: &str) -> ExecutionResult {
        ExecutionResult {
            output: output.to_string(),
            status_message: "OK".to_string(),
            success: true,
            execution_time: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_every_dispatch() {
        let store = WorkspaceStore::default();
        let mut rx = store.subscribe();

        store.dispatch(Action::SetCode("print(1)".to_string()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().code, "print(1)");

        store.dispatch(Action::SetLanguage("python".to_string()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().language, "python");
    }

    #[test]
    fn test_begin_run_enters_loading_with_empty_result() {
        let store = WorkspaceStore::default();
        store.dispatch(Action::SetResult(result("stale")));

        let ticket = store.begin_run();
        let state = store.snapshot();
        assert!(state.loading);
        assert!(state.result.is_empty());
        assert_eq!(ticket.sequence(), 1);

        assert!(store.complete_run(ticket, Some(result("1"))));
        let state = store.snapshot();
        assert!(!state.loading);
        assert_eq!(state.result.output, "1");
    }

    #[test]
    fn test_default_ordering_is_last_resolved() {
        assert_eq!(RunOrdering::default(), RunOrdering::LastResolvedWins);
        assert_eq!(
            WorkspaceStore::default().run_ordering(),
            RunOrdering::LastResolvedWins
        );
    }

    #[test]
    fn test_latest_issued_wins_discards_stale_outcome() {
        let store = WorkspaceStore::default().with_run_ordering(RunOrdering::LatestIssuedWins);
        let first = store.begin_run();
        let second = store.begin_run();

        assert!(store.complete_run(second, Some(result("second"))));
        assert!(!store.complete_run(first, Some(result("first"))));

        let state = store.snapshot();
        assert_eq!(state.result.output, "second");
        assert!(!state.loading);
    }

    #[test]
    fn test_stale_outcome_does_not_clear_loading_of_newer_run() {
        let store = WorkspaceStore::default().with_run_ordering(RunOrdering::LatestIssuedWins);
        let first = store.begin_run();
        let second = store.begin_run();

        assert!(!store.complete_run(first, Some(result("first"))));
        assert!(store.snapshot().loading);

        store.complete_run(second, Some(result("second")));
        assert!(!store.snapshot().loading);
    }

    #[test]
    fn test_last_resolved_wins_lets_old_run_overwrite() {
        let store = WorkspaceStore::default().with_run_ordering(RunOrdering::LastResolvedWins);
        let first = store.begin_run();
        let second = store.begin_run();

        assert!(store.complete_run(second, Some(result("second"))));
        assert!(store.complete_run(first, Some(result("first"))));

        assert_eq!(store.snapshot().result.output, "first");
    }

    #[test]
    fn test_begin_run_if_refuses_without_touching_state() {
        let store = WorkspaceStore::default();
        let ticket = store.begin_run();

        let refused = store.begin_run_if(|state| {
            if state.loading {
                Err(WorkspaceError::RunInProgress)
            } else {
                Ok(())
            }
        });
        assert!(matches!(refused, Err(WorkspaceError::RunInProgress)));

        store.complete_run(ticket, Some(result("done")));
        let (second, ()) = store.begin_run_if(|_| Ok(())).unwrap();
        assert_eq!(second.sequence(), 2);
        assert!(store.snapshot().loading);
    }

    #[test]
    fn test_update_applies_nothing_on_error() {
        let store = WorkspaceStore::default().with_action_log();

        let failed: Result<()> =
            store.update(|_| Err(WorkspaceError::Storage("disk full".to_string())));
        assert!(failed.is_err());
        assert!(store.action_log().is_empty());

        let code = store
            .update(|state| {
                let code = format!("{}!", state.code);
                Ok((vec![Action::SetCode(code.clone())], code))
            })
            .unwrap();
        assert_eq!(code, "!");
        assert_eq!(store.snapshot().code, "!");
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = WorkspaceStore::default();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        store
                            .update(|state| {
                                Ok((vec![Action::SetCode(format!("{}x", state.code))], ()))
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.snapshot().code.len(), 800);
    }

    #[test]
    fn test_action_log_replays_to_same_state() {
        let initial = WorkspaceState::new("python", Vec::new());
        let store = WorkspaceStore::new(initial.clone()).with_action_log();

        store.dispatch(Action::SetCode("x = 1".to_string()));
        let ticket = store.begin_run();
        store.complete_run(ticket, Some(result("done")));

        let log = store.action_log();
        assert_eq!(log.len(), 5);
        assert_eq!(log.last(), Some(&Action::SetLoading(false)));
        assert_eq!(replay(&initial, &log), store.snapshot());
    }
}
