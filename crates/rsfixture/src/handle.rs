//! The test handle passed to fixtures, hooks and test bodies.

use std::any::Any;
use std::fmt;
use std::panic::resume_unwind;
use std::sync::{Arc, Mutex};

use crate::container::{lock, FixtureTable, Scope};
use crate::engine::{self, Interrupt};
use crate::error::{Error, HookStage};
use crate::labels::LabelSet;
use crate::provider::{function_name, Callable, Injectable, Outcome};
use crate::runner::TestReport;

/// Where a test is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    ResolvingFixtures,
    RunningBeforeHooks,
    RunningBody,
    RunningAfterHooks,
    Done,
}

/// Panic payload used by [`Handle::skip`].
pub(crate) struct SkipSignal(pub(crate) String);

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Before and after hooks attached to a test.
#[derive(Clone, Default)]
pub(crate) struct HookSet {
    pub(crate) before: Vec<Arc<Callable>>,
    pub(crate) after: Vec<Arc<Callable>>,
}

struct HandleState {
    phase: Phase,
    before: Vec<Arc<Callable>>,
    after: Vec<Arc<Callable>>,
    failure: Option<Error>,
    children: Vec<TestReport>,
}

struct HandleInner {
    name: String,
    path: String,
    labels: LabelSet,
    scope: Scope,
    inherited: HookSet,
    state: Mutex<HandleState>,
}

/// Handle to the running test.
///
/// Request it by declaring a `Handle` parameter on any fixture, hook or test.
/// It is cheap to clone; every clone refers to the same test.
///
/// ```rust,no_run
/// use rsfixture::{Engine, Handle};
///
/// #[derive(Clone)]
/// struct TempDir(std::path::PathBuf);
///
/// fn temp_dir(t: Handle) -> TempDir {
///     let dir = std::env::temp_dir().join(t.name());
///     let cleanup = dir.clone();
///     t.after_test(move || {
///         let _ = std::fs::remove_dir_all(&cleanup);
///     });
///     TempDir(dir)
/// }
///
/// let mut engine = Engine::new();
/// engine.register_fixture(temp_dir).unwrap();
/// ```
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    pub(crate) fn new(
        name: &str,
        path: &str,
        labels: LabelSet,
        fixtures: Arc<FixtureTable>,
        hooks: HookSet,
    ) -> Self {
        let state = HandleState {
            phase: Phase::Pending,
            before: hooks.before.clone(),
            after: hooks.after.clone(),
            failure: None,
            children: Vec::new(),
        };
        Handle {
            inner: Arc::new(HandleInner {
                name: name.to_string(),
                path: path.to_string(),
                labels,
                scope: Scope::new(fixtures),
                inherited: hooks,
                state: Mutex::new(state),
            }),
        }
    }

    /// Name of this test or sub-test.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Full name including enclosing tests, separated by `/`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn labels(&self) -> &LabelSet {
        &self.inner.labels
    }

    pub fn phase(&self) -> Phase {
        lock(&self.inner.state).phase
    }

    /// Add a hook that runs before this test's body.
    ///
    /// Added while fixtures are still being resolved, it joins the queue of
    /// before-hooks. Once the before stage has begun it runs immediately.
    pub fn before_test<F, Args, Out>(&self, hook: F)
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        let hook = Arc::new(Callable::new(function_name::<F>(), hook));
        self.add_hook(hook, HookStage::Before);
    }

    /// Add a hook that runs after this test's body. After-hooks run in
    /// reverse order of registration.
    ///
    /// One added while the body is still running is queued for teardown
    /// rather than run on the spot; only a hook added during teardown itself
    /// runs immediately. Hooks a fixture adds here still run when a later
    /// fixture of the same test fails.
    pub fn after_test<F, Args, Out>(&self, hook: F)
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        let hook = Arc::new(Callable::new(function_name::<F>(), hook));
        self.add_hook(hook, HookStage::After);
    }

    /// Run `body` as a sub-test with its own resolution scope.
    ///
    /// The sub-test inherits this test's labels and the hooks this test was
    /// started with. Returns `false` if the sub-test failed, which also fails
    /// this test.
    pub fn run<F, Args, Out>(&self, name: &str, body: F) -> bool
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        let body = Callable::new(name, body);
        let path = format!("{}/{}", self.inner.path, name);
        let report = engine::execute(
            self.inner.scope.fixtures(),
            name,
            &path,
            self.inner.labels.clone(),
            self.inner.inherited.clone(),
            &body,
        );
        let passed = !report.status.is_failed();
        lock(&self.inner.state).children.push(report);
        passed
    }

    /// Mark the test failed and keep going.
    pub fn fail(&self, message: impl Into<String>) {
        self.record_failure(Error::TestFailure {
            message: message.into(),
        });
    }

    /// Stop the test here and report it as skipped. After-hooks still run.
    pub fn skip(&self, reason: impl Into<String>) -> ! {
        resume_unwind(Box::new(SkipSignal(reason.into())))
    }

    fn add_hook(&self, hook: Arc<Callable>, stage: HookStage) {
        {
            let mut state = lock(&self.inner.state);
            let deferred = match stage {
                HookStage::Before => {
                    matches!(state.phase, Phase::Pending | Phase::ResolvingFixtures)
                }
                HookStage::After => {
                    !matches!(state.phase, Phase::RunningAfterHooks | Phase::Done)
                }
            };
            if deferred {
                match stage {
                    HookStage::Before => state.before.push(hook),
                    HookStage::After => state.after.push(hook),
                }
                return;
            }
        }

        tracing::debug!(hook = hook.name(), %stage, test = self.path(), "running hook immediately");
        match engine::run_hook(self, &hook, stage) {
            Ok(()) => {}
            Err(Interrupt::Failed(err)) => self.record_failure(err),
            Err(Interrupt::Skipped(reason)) => self.skip(reason),
        }
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        lock(&self.inner.state).phase = phase;
    }

    pub(crate) fn before_hooks(&self) -> Vec<Arc<Callable>> {
        lock(&self.inner.state).before.clone()
    }

    pub(crate) fn pop_after_hook(&self) -> Option<Arc<Callable>> {
        lock(&self.inner.state).after.pop()
    }

    /// Drop the after-hooks this test was started with, keeping the ones
    /// registered since. Used when the test never reached its before stage.
    pub(crate) fn discard_inherited_after_hooks(&self) {
        let inherited = self.inner.inherited.after.len();
        let mut state = lock(&self.inner.state);
        let keep = inherited.min(state.after.len());
        state.after.drain(..keep);
    }

    pub(crate) fn record_failure(&self, err: Error) {
        lock(&self.inner.state).failure.get_or_insert(err);
    }

    pub(crate) fn take_failure(&self) -> Option<Error> {
        lock(&self.inner.state).failure.take()
    }

    pub(crate) fn take_children(&self) -> Vec<TestReport> {
        std::mem::take(&mut lock(&self.inner.state).children)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("path", &self.inner.path)
            .field("labels", &self.inner.labels)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn detached(name: &str, labels: LabelSet, fixtures: Arc<FixtureTable>) -> Handle {
    Handle::new(name, name, labels, fixtures, HookSet::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn hooks_are_queued_before_the_test_starts() {
        static RAN: AtomicU32 = AtomicU32::new(0);
        let handle = detached("queued", LabelSet::new(), Arc::new(FixtureTable::new()));
        handle.before_test(|| {
            RAN.fetch_add(1, Ordering::SeqCst);
        });
        handle.after_test(|| {
            RAN.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(RAN.load(Ordering::SeqCst), 0);
        assert_eq!(handle.before_hooks().len(), 1);
        assert!(handle.pop_after_hook().is_some());
    }

    #[test]
    fn before_hook_runs_immediately_once_running() {
        static RAN: AtomicU32 = AtomicU32::new(0);
        let handle = detached("immediate", LabelSet::new(), Arc::new(FixtureTable::new()));
        handle.set_phase(Phase::RunningBody);
        handle.before_test(|t: Handle| {
            assert_eq!(t.name(), "immediate");
            RAN.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(RAN.load(Ordering::SeqCst), 1);
        assert!(handle.before_hooks().is_empty());
    }

    #[test]
    fn after_hook_added_during_body_is_deferred() {
        let handle = detached("deferred", LabelSet::new(), Arc::new(FixtureTable::new()));
        handle.set_phase(Phase::RunningBody);
        handle.after_test(|| {});
        assert!(handle.pop_after_hook().is_some());
    }

    #[test]
    fn failing_immediate_hook_is_recorded() {
        let handle = detached("recorded", LabelSet::new(), Arc::new(FixtureTable::new()));
        handle.set_phase(Phase::RunningAfterHooks);
        handle.after_test(|| -> Result<(), String> { Err("disk full".into()) });
        match handle.take_failure() {
            Some(Error::HookFailure { stage, message, .. }) => {
                assert_eq!(stage, HookStage::After);
                assert_eq!(message, "disk full");
            }
            other => panic!("expected hook failure, got {other:?}"),
        }
    }

    #[test]
    fn first_failure_wins() {
        let handle = detached("first", LabelSet::new(), Arc::new(FixtureTable::new()));
        handle.fail("one");
        handle.fail("two");
        assert_eq!(
            handle.take_failure(),
            Some(Error::TestFailure { message: "one".into() })
        );
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
