//! Execution engine: registration tables and the per-test pipeline.
//!
//! Every test runs through the same stages:
//!
//! ```text
//! resolve fixtures -> before hooks (registration order) -> body -> after hooks (reverse order)
//! ```
//!
//! A failure while resolving fixtures or running before-hooks aborts the
//! test. Once the before stage has been entered the after-hooks always run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::container::FixtureTable;
use crate::error::{Error, HookStage, Result};
use crate::handle::{panic_message, Handle, HookSet, Phase, SkipSignal};
use crate::labels::{LabelRegistry, LabelSet, DEFAULT_LABEL};
use crate::provider::{
    function_name, Callable, FnProvider, Injectable, OnceProvider, Outcome, Param, Provider,
};
use crate::runner::{self, RunConfig, RunSummary, Status, TestReport};

// ============================================================================
// Registered items
// ============================================================================

/// A before/after hook registered on the engine.
#[derive(Clone)]
pub struct RegisteredHook {
    callable: Arc<Callable>,
    labels: LabelSet,
}

impl RegisteredHook {
    pub fn name(&self) -> &str {
        self.callable.name()
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Hooks without labels apply to every test; labelled hooks apply to
    /// tests sharing at least one label.
    pub fn applies_to(&self, test_labels: &LabelSet) -> bool {
        self.labels.is_empty() || !self.labels.is_disjoint(test_labels)
    }
}

/// A test registered on the engine.
#[derive(Clone)]
pub struct RegisteredTest {
    name: String,
    body: Arc<Callable>,
    labels: LabelSet,
}

impl RegisteredTest {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Holds the registered fixtures, hooks, tests and labels for a run.
///
/// Register everything first, then call [`run`](Self::run) or
/// [`run_test`](Self::run_test). `run_test` takes `&self` and may be called
/// from several threads at once for different tests.
///
/// ```rust,no_run
/// use rsfixture::{Engine, Handle, RunConfig};
///
/// #[derive(Clone)]
/// struct Widget(u32);
///
/// fn build_widget() -> Widget {
///     Widget(3)
/// }
///
/// fn widget_has_parts(_t: Handle, w: Widget) {
///     assert_eq!(w.0, 3);
/// }
///
/// let mut engine = Engine::new();
/// engine.declare_label("unit");
/// engine.register_fixture(build_widget).unwrap();
/// engine.register_test("widget_has_parts", widget_has_parts, &["unit"]).unwrap();
/// let summary = engine.run(&RunConfig::default());
/// std::process::exit(summary.exit_code());
/// ```
#[derive(Default)]
pub struct Engine {
    fixtures: Arc<FixtureTable>,
    before_hooks: Vec<RegisteredHook>,
    after_hooks: Vec<RegisteredHook>,
    tests: Vec<RegisteredTest>,
    labels: LabelSet,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    // ---- Fixtures ------------------------------------------------------------

    /// Register a fixture. Its result type becomes injectable; a later
    /// fixture producing the same type takes precedence.
    pub fn register_fixture<F, Args, Out>(&mut self, fixture: F) -> Result<()>
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Param,
    {
        self.register_named_fixture(&function_name::<F>(), fixture)
    }

    pub fn register_named_fixture<F, Args, Out>(&mut self, name: &str, fixture: F) -> Result<()>
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Param,
    {
        self.register_provider(Arc::new(FnProvider::new(name, fixture)))
    }

    /// Register a fixture whose body runs at most once for the whole run.
    pub fn register_once_fixture<F, Args, Out>(&mut self, fixture: F) -> Result<()>
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Param,
    {
        self.register_named_once_fixture(&function_name::<F>(), fixture)
    }

    pub fn register_named_once_fixture<F, Args, Out>(&mut self, name: &str, fixture: F) -> Result<()>
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Param,
    {
        self.register_provider(Arc::new(OnceProvider::new(FnProvider::new(name, fixture))))
    }

    /// Register any [`Provider`].
    pub fn register_provider(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        tracing::debug!(
            fixture = provider.name(),
            result = provider.result_type().name(),
            "registering fixture"
        );
        Arc::make_mut(&mut self.fixtures).insert(provider)
    }

    // ---- Hooks ---------------------------------------------------------------

    /// Register a hook run before every matching test. An empty `labels`
    /// slice matches every test.
    pub fn register_before_hook<F, Args, Out>(&mut self, hook: F, labels: &[&str])
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        let hook = RegisteredHook {
            callable: Arc::new(Callable::new(function_name::<F>(), hook)),
            labels: LabelSet::from(labels),
        };
        tracing::debug!(hook = hook.name(), "registering before hook");
        self.before_hooks.push(hook);
    }

    /// Register a hook run after every matching test. After-hooks run in
    /// reverse registration order.
    pub fn register_after_hook<F, Args, Out>(&mut self, hook: F, labels: &[&str])
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        let hook = RegisteredHook {
            callable: Arc::new(Callable::new(function_name::<F>(), hook)),
            labels: LabelSet::from(labels),
        };
        tracing::debug!(hook = hook.name(), "registering after hook");
        self.after_hooks.push(hook);
    }

    // ---- Tests ---------------------------------------------------------------

    /// Register a test. Without labels it carries [`DEFAULT_LABEL`].
    pub fn register_test<F, Args, Out>(&mut self, name: &str, body: F, labels: &[&str]) -> Result<()>
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        if name.is_empty() {
            return Err(Error::Registration {
                name: function_name::<F>(),
                message: "test name is empty".to_string(),
            });
        }
        if self.tests.iter().any(|t| t.name == name) {
            return Err(Error::Registration {
                name: name.to_string(),
                message: "a test with this name is already registered".to_string(),
            });
        }

        let labels = if labels.is_empty() {
            LabelSet::from(&[DEFAULT_LABEL][..])
        } else {
            LabelSet::from(labels)
        };
        tracing::debug!(test = name, labels = %labels, "registering test");
        self.tests.push(RegisteredTest {
            name: name.to_string(),
            body: Arc::new(Callable::new(name, body)),
            labels,
        });
        Ok(())
    }

    // ---- Labels --------------------------------------------------------------

    pub fn declare_label(&mut self, name: &str) {
        self.labels.insert(name);
    }

    /// Declare every label known to `registry`.
    pub fn declare_labels(&mut self, registry: &LabelRegistry) {
        for label in registry.names().iter() {
            self.labels.insert(label);
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    // ---- Accessors -----------------------------------------------------------

    pub fn tests(&self) -> &[RegisteredTest] {
        &self.tests
    }

    pub fn fixtures(&self) -> &FixtureTable {
        &self.fixtures
    }

    pub fn before_hooks(&self) -> &[RegisteredHook] {
        &self.before_hooks
    }

    pub fn after_hooks(&self) -> &[RegisteredHook] {
        &self.after_hooks
    }

    // ---- Selection -----------------------------------------------------------

    /// Tests whose labels intersect both the declared and the requested labels.
    pub fn selected(&self, requested: &LabelSet) -> Vec<&RegisteredTest> {
        let active = self.labels.intersect(requested);
        self.tests
            .iter()
            .filter(|t| !t.labels.is_disjoint(&active))
            .collect()
    }

    /// A warning when `requested` selects no tests at all.
    pub fn label_warning(&self, requested: &LabelSet) -> Option<String> {
        if requested.is_disjoint(&self.labels) {
            return Some(format!(
                "labels `{requested}` did not match any declared label, no tests will run. Available labels: {}",
                self.labels
            ));
        }
        if self.selected(requested).is_empty() {
            return Some(format!("labels `{requested}` did not select any tests"));
        }
        None
    }

    // ---- Execution -----------------------------------------------------------

    /// Run one registered test through the full pipeline.
    pub fn run_test(&self, test: &RegisteredTest) -> TestReport {
        let hooks = HookSet {
            before: self
                .before_hooks
                .iter()
                .filter(|h| h.applies_to(&test.labels))
                .map(|h| h.callable.clone())
                .collect(),
            after: self
                .after_hooks
                .iter()
                .filter(|h| h.applies_to(&test.labels))
                .map(|h| h.callable.clone())
                .collect(),
        };
        execute(
            &self.fixtures,
            &test.name,
            &test.name,
            test.labels.clone(),
            hooks,
            &test.body,
        )
    }

    /// Run every selected test and print a report.
    pub fn run(&self, config: &RunConfig) -> RunSummary {
        let mut summary = RunSummary::default();
        if let Some(warning) = self.label_warning(&config.labels) {
            tracing::warn!("{warning}");
            summary.warnings.push(warning);
        }

        let selected: Vec<&RegisteredTest> = self
            .selected(&config.labels)
            .into_iter()
            .filter(|t| config.matches_name(&t.name))
            .collect();

        if config.list {
            runner::print_list(&selected);
            return summary;
        }

        runner::print_warnings(&summary.warnings);
        let start = Instant::now();
        println!();
        for test in selected {
            let report = self.run_test(test);
            runner::print_report(&report, 0);
            summary.record(report);
        }
        runner::print_summary(&summary, start.elapsed());

        summary
    }

    /// Entry point for a `harness = false` test target: parse the process
    /// arguments, run, and exit with the run's exit code.
    pub fn run_main(&self) -> ! {
        crate::logging::init();
        let config = RunConfig::from_args();
        let summary = self.run(&config);
        std::process::exit(summary.exit_code())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Why a stage stopped early.
pub(crate) enum Interrupt {
    Failed(Error),
    Skipped(String),
}

/// Run `f`, turning panics into failures and skip signals into skips.
fn guarded<T>(
    f: impl FnOnce() -> Result<T>,
    on_panic: impl FnOnce(String) -> Error,
) -> std::result::Result<T, Interrupt> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Interrupt::Failed(err)),
        Err(payload) => match payload.downcast::<SkipSignal>() {
            Ok(skip) => Err(Interrupt::Skipped(skip.0)),
            Err(payload) => Err(Interrupt::Failed(on_panic(panic_message(&*payload)))),
        },
    }
}

/// Fold a stage interruption into the test status. The first failure is kept.
fn settle(status: &mut Status, interrupt: Interrupt) {
    if status.is_failed() {
        return;
    }
    match interrupt {
        Interrupt::Failed(err) => *status = Status::Failed(err),
        Interrupt::Skipped(reason) => {
            if matches!(status, Status::Passed) {
                *status = Status::Skipped(reason);
            }
        }
    }
}

fn check_recorded(handle: &Handle) -> std::result::Result<(), Interrupt> {
    match handle.take_failure() {
        Some(err) => Err(Interrupt::Failed(err)),
        None => Ok(()),
    }
}

/// Resolve a hook's parameters in the handle's scope and call it.
pub(crate) fn run_hook(
    handle: &Handle,
    hook: &Callable,
    stage: HookStage,
) -> std::result::Result<(), Interrupt> {
    let hook_failure = |message: String| Error::HookFailure {
        stage,
        hook: hook.name().to_string(),
        message,
    };
    let outcome = guarded(
        || {
            let args = handle
                .scope()
                .resolve_all(hook.parameters(), handle, hook.name())?;
            hook.call(&args)
        },
        &hook_failure,
    )?;
    outcome.map_err(|message| Interrupt::Failed(hook_failure(message)))
}

fn run_setup_and_body(
    handle: &Handle,
    body: &Callable,
    started: &mut bool,
) -> std::result::Result<(), Interrupt> {
    handle.set_phase(Phase::ResolvingFixtures);
    let args = guarded(
        || {
            handle
                .scope()
                .resolve_all(body.parameters(), handle, body.name())
        },
        |message| Error::FixtureFailure {
            fixture: body.name().to_string(),
            message,
        },
    )?;
    check_recorded(handle)?;

    handle.set_phase(Phase::RunningBeforeHooks);
    *started = true;
    for hook in handle.before_hooks() {
        run_hook(handle, &hook, HookStage::Before)?;
        check_recorded(handle)?;
    }

    handle.set_phase(Phase::RunningBody);
    let outcome = guarded(|| body.call(&args), |message| Error::TestFailure { message })?;
    if let Err(message) = outcome {
        return Err(Interrupt::Failed(Error::TestFailure { message }));
    }
    check_recorded(handle)
}

fn run_teardown(handle: &Handle) -> std::result::Result<(), Interrupt> {
    handle.set_phase(Phase::RunningAfterHooks);
    while let Some(hook) = handle.pop_after_hook() {
        run_hook(handle, &hook, HookStage::After)?;
    }
    Ok(())
}

/// Run one test or sub-test in a fresh scope.
pub(crate) fn execute(
    fixtures: &Arc<FixtureTable>,
    name: &str,
    path: &str,
    labels: LabelSet,
    hooks: HookSet,
    body: &Callable,
) -> TestReport {
    let span = tracing::info_span!("test", path = %path);
    let _enter = span.enter();
    let start = Instant::now();

    let handle = Handle::new(name, path, labels.clone(), fixtures.clone(), hooks);
    let mut status = Status::Passed;
    let mut started = false;

    if let Err(interrupt) = run_setup_and_body(&handle, body, &mut started) {
        settle(&mut status, interrupt);
    }
    if !started {
        // Only cleanup registered by fixtures that did resolve.
        handle.discard_inherited_after_hooks();
    }
    if let Err(interrupt) = run_teardown(&handle) {
        settle(&mut status, interrupt);
    }
    handle.set_phase(Phase::Done);

    if let Some(err) = handle.take_failure() {
        settle(&mut status, Interrupt::Failed(err));
    }
    let children = handle.take_children();
    if let Some(child) = children.iter().find(|c| c.status.is_failed()) {
        settle(
            &mut status,
            Interrupt::Failed(Error::TestFailure {
                message: format!("sub-test `{}` failed", child.name),
            }),
        );
    }
    handle.scope().clear();

    match &status {
        Status::Passed => tracing::debug!("passed"),
        Status::Skipped(reason) => tracing::debug!(%reason, "skipped"),
        Status::Failed(err) => tracing::debug!(error = %err, "failed"),
    }

    TestReport {
        name: name.to_string(),
        path: path.to_string(),
        labels,
        status,
        elapsed: start.elapsed(),
        children,
    }
}
