//! Classify declared functions into fixtures, tests and hooks.
//!
//! Resolution never fails. Malformed directives become warnings and the
//! function they document drops out of the test and hook roles.

use std::collections::BTreeMap;

use rsfixture::labels::{
    matches_any, LabelRegistry, LabelSet, AFTER_TEST_PREFIXES, BEFORE_TEST_PREFIXES,
    DEFAULT_LABEL, FIXTURE_PREFIXES,
};
use serde::Serialize;

use crate::directive::{self, DirectiveKind, DirectiveParseError};
use crate::source::{DeclaredFunction, SourceUnit};

/// A test or hook together with the labels it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledFunction {
    pub function: DeclaredFunction,
    pub labels: Vec<String>,
}

/// The outcome of resolving one package, handed to the code emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub package: String,
    pub default_label: String,
    /// Label name to the name-prefixes that select it.
    pub labels: BTreeMap<String, Vec<String>>,
    pub fixtures: Vec<DeclaredFunction>,
    pub once_fixtures: Vec<DeclaredFunction>,
    pub tests: Vec<LabeledFunction>,
    pub before_hooks: Vec<LabeledFunction>,
    pub after_hooks: Vec<LabeledFunction>,
    pub warnings: Vec<String>,
}

impl ParseResult {
    pub fn label_registry(&self) -> LabelRegistry {
        let mut registry = LabelRegistry::empty();
        for (label, prefixes) in &self.labels {
            registry.add_prefixes(label, prefixes.iter().cloned());
        }
        registry
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// The role a function was given.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    Test(LabelSet),
    Fixture,
    OnceFixture,
    BeforeHook(LabelSet),
    AfterHook(LabelSet),
}

struct Resolver {
    registry: LabelRegistry,
    default_label: String,
    auto_classify: bool,
    warnings: Vec<String>,
}

/// Resolve every function in `unit`.
///
/// With `auto_classify` set, functions without a role directive are
/// classified by name prefix. A `@disableAutoLabelling` directive anywhere in
/// the unit turns that off.
pub fn resolve(unit: &SourceUnit, auto_classify: bool) -> ParseResult {
    let mut resolver = Resolver {
        registry: LabelRegistry::with_builtin(),
        default_label: DEFAULT_LABEL.to_string(),
        auto_classify,
        warnings: Vec::new(),
    };
    resolver.file_scope(&unit.comments);

    let mut result = ParseResult {
        package: unit.package.clone(),
        default_label: String::new(),
        labels: BTreeMap::new(),
        fixtures: Vec::new(),
        once_fixtures: Vec::new(),
        tests: Vec::new(),
        before_hooks: Vec::new(),
        after_hooks: Vec::new(),
        warnings: Vec::new(),
    };

    for function in &unit.functions {
        let Some(role) = resolver.classify(function) else {
            continue;
        };
        tracing::debug!(function = %function.qualified_name, ?role, "classified");
        let function = function.clone();
        match role {
            Role::Test(labels) => result.tests.push(labeled(function, labels)),
            Role::Fixture => result.fixtures.push(function),
            Role::OnceFixture => result.once_fixtures.push(function),
            Role::BeforeHook(labels) => result.before_hooks.push(labeled(function, labels)),
            Role::AfterHook(labels) => result.after_hooks.push(labeled(function, labels)),
        }
    }

    result.default_label = resolver.default_label;
    result.labels = resolver.registry.table().clone();
    result.warnings = resolver.warnings;
    result
}

fn labeled(function: DeclaredFunction, labels: LabelSet) -> LabeledFunction {
    LabeledFunction {
        function,
        labels: labels.to_vec(),
    }
}

impl Resolver {
    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Label declarations, the default label and the auto-classification switch.
    fn file_scope(&mut self, comments: &[String]) {
        for comment in comments {
            for parsed in directive::parse_comment(comment) {
                let directive = match parsed {
                    Ok(directive) => directive,
                    Err(err) if err.kind().is_role() => continue,
                    Err(err) => {
                        self.warn(format!("{err}, ignoring it"));
                        continue;
                    }
                };

                match directive.kind {
                    DirectiveKind::TestLabel => {
                        let (label, prefixes) = directive.params.split_at(1);
                        self.registry.add_prefixes(&label[0], prefixes.iter().cloned());
                    }
                    DirectiveKind::DefaultTestLabel => {
                        if directive.params.len() > 1 {
                            self.warn(format!(
                                "@defaultTestLabel takes exactly one label, got `{}`; ignoring it",
                                directive.params.join(", ")
                            ));
                        } else {
                            self.default_label = directive.params[0].clone();
                        }
                    }
                    DirectiveKind::DisableAutoLabelling => self.auto_classify = false,
                    _ => {}
                }
            }
        }
        let default_label = self.default_label.clone();
        self.registry.ensure(&default_label);
    }

    fn classify(&mut self, function: &DeclaredFunction) -> Option<Role> {
        let mut found: Vec<(DirectiveKind, directive::ParsedDirective)> = DirectiveKind::ROLES
            .iter()
            .filter_map(|kind| directive::find(&function.doc_comment, *kind).map(|p| (*kind, p)))
            .collect();

        if found.len() > 1 {
            let kinds: Vec<String> = found.iter().map(|(kind, _)| kind.to_string()).collect();
            self.warn(format!(
                "`{}` has several role directives ({}); using {}",
                function.qualified_name,
                kinds.join(", "),
                found[0].0
            ));
        }

        if !found.is_empty() {
            let (kind, parsed) = found.swap_remove(0);
            match parsed {
                Ok(directive) => return self.explicit_role(kind, directive.params),
                Err(err) => {
                    self.malformed(function, err);
                    return self.fixture_by_prefix(function);
                }
            }
        }

        if !self.auto_classify {
            return None;
        }
        self.role_by_prefix(function)
    }

    fn explicit_role(&mut self, kind: DirectiveKind, params: Vec<String>) -> Option<Role> {
        let role = match kind {
            DirectiveKind::Fixture => Role::Fixture,
            DirectiveKind::OnceFixture => Role::OnceFixture,
            DirectiveKind::Test => Role::Test(self.labels_for(params)),
            DirectiveKind::BeforeTest => Role::BeforeHook(self.labels_for(params)),
            DirectiveKind::AfterTest => Role::AfterHook(self.labels_for(params)),
            DirectiveKind::TestLabel
            | DirectiveKind::DefaultTestLabel
            | DirectiveKind::DisableAutoLabelling => return None,
        };
        Some(role)
    }

    /// Explicit labels are used verbatim and registered if unknown; no labels
    /// means the default label.
    fn labels_for(&mut self, params: Vec<String>) -> LabelSet {
        if params.is_empty() {
            return LabelSet::from(&[self.default_label.as_str()][..]);
        }
        for label in &params {
            self.registry.ensure(label);
        }
        params.into_iter().collect()
    }

    fn malformed(&mut self, function: &DeclaredFunction, err: DirectiveParseError) {
        self.warn(format!(
            "`{}`: {err}; the function is not registered as a test or hook",
            function.qualified_name
        ));
    }

    fn fixture_by_prefix(&self, function: &DeclaredFunction) -> Option<Role> {
        (self.auto_classify && matches_any(&function.name, FIXTURE_PREFIXES)).then_some(Role::Fixture)
    }

    fn role_by_prefix(&self, function: &DeclaredFunction) -> Option<Role> {
        let name = &function.name;
        if matches_any(name, FIXTURE_PREFIXES) {
            return Some(Role::Fixture);
        }
        if matches_any(name, BEFORE_TEST_PREFIXES) {
            return Some(Role::BeforeHook(LabelSet::new()));
        }
        if matches_any(name, AFTER_TEST_PREFIXES) {
            return Some(Role::AfterHook(LabelSet::new()));
        }

        let labels = self.registry.matching(name);
        (!labels.is_empty()).then_some(Role::Test(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::scan_source;

    fn resolve_src(text: &str, auto: bool) -> ParseResult {
        resolve(&scan_source("suite", text).unwrap(), auto)
    }

    fn names(functions: &[DeclaredFunction]) -> Vec<&str> {
        functions.iter().map(|f| f.name.as_str()).collect()
    }

    fn labeled_names(functions: &[LabeledFunction]) -> Vec<(&str, Vec<&str>)> {
        functions
            .iter()
            .map(|f| {
                (
                    f.function.name.as_str(),
                    f.labels.iter().map(String::as_str).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn explicit_test_labels_are_used_verbatim_and_registered() {
        let result = resolve_src(
            r#"
            /// @test(smoke, nightly)
            fn checks_everything() {}
            "#,
            true,
        );
        assert_eq!(
            labeled_names(&result.tests),
            vec![("checks_everything", vec!["nightly", "smoke"])]
        );
        assert_eq!(result.labels["smoke"], Vec::<String>::new());
        assert!(result.labels.contains_key("nightly"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn bare_test_gets_the_default_label() {
        let result = resolve_src(
            r#"
            //! @defaultTestLabel(integration)
            //! @defaultTestLabel(regression)

            /// @test
            fn plain() {}
            "#,
            true,
        );
        assert_eq!(result.default_label, "regression");
        assert_eq!(labeled_names(&result.tests), vec![("plain", vec!["regression"])]);
    }

    #[test]
    fn default_label_with_several_params_is_ignored() {
        let result = resolve_src(
            r#"
            //! @defaultTestLabel(a, b)

            /// @test
            fn plain() {}
            "#,
            true,
        );
        assert_eq!(result.default_label, DEFAULT_LABEL);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn explicit_roles_follow_the_fixed_order() {
        let result = resolve_src(
            r#"
            /// @fixture
            fn widget() -> Widget { todo!() }

            /// @onceFixture
            fn server() -> Server { todo!() }

            /// @beforeTest(integration)
            fn open_db() {}

            /// @afterTest
            fn close_db() {}

            /// @fixture
            /// @test
            fn confused() {}
            "#,
            true,
        );
        assert_eq!(names(&result.fixtures), vec!["widget"]);
        assert_eq!(names(&result.once_fixtures), vec!["server"]);
        assert_eq!(labeled_names(&result.before_hooks), vec![("open_db", vec!["integration"])]);
        assert_eq!(labeled_names(&result.after_hooks), vec![("close_db", vec!["unit"])]);
        assert_eq!(labeled_names(&result.tests), vec![("confused", vec!["unit"])]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("several role directives"));
    }

    #[test]
    fn hook_prefixes_auto_classify_only_when_enabled() {
        let source = r#"
            fn preOpen() {}
            fn post_close() {}
            fn fixtureWidget() -> Widget { todo!() }
            fn prefix_free() {}
        "#;
        let result = resolve_src(source, true);
        assert_eq!(labeled_names(&result.before_hooks), vec![("preOpen", vec![])]);
        assert_eq!(labeled_names(&result.after_hooks), vec![("post_close", vec![])]);
        assert_eq!(names(&result.fixtures), vec!["fixtureWidget"]);
        assert!(result.tests.is_empty());

        let result = resolve_src(source, false);
        assert!(result.before_hooks.is_empty());
        assert!(result.after_hooks.is_empty());
        assert!(result.fixtures.is_empty());
    }

    #[test]
    fn disable_auto_labelling_directive_turns_auto_classification_off() {
        let result = resolve_src(
            r#"
            //! @disableAutoLabelling

            fn test_something() {}
            fn fixture_widget() {}
            "#,
            true,
        );
        assert!(result.tests.is_empty());
        assert!(result.fixtures.is_empty());
    }

    #[test]
    fn label_prefixes_select_tests() {
        let result = resolve_src(
            r#"
            //! @testLabel(blackbox, black_)

            fn black_checkSomething() {}
            fn testWidget() {}
            fn integration_and_more() {}
            fn testimony() {}
            "#,
            true,
        );
        assert_eq!(
            labeled_names(&result.tests),
            vec![
                ("black_checkSomething", vec!["blackbox"]),
                ("testWidget", vec!["unit"]),
                ("integration_and_more", vec!["integration"]),
            ]
        );
        assert_eq!(result.labels["blackbox"], vec!["black_".to_string()]);
    }

    #[test]
    fn test_label_appends_prefixes() {
        let result = resolve_src(
            r#"
            //! @testLabel(unit, check)
            //! @testLabel(bare)

            fn checkWidget() {}
            "#,
            true,
        );
        assert_eq!(result.labels["unit"], vec!["test", "unit", "check"]);
        assert!(result.labels["bare"].is_empty());
        assert_eq!(labeled_names(&result.tests), vec![("checkWidget", vec!["unit"])]);
    }

    #[test]
    fn malformed_directives_warn_and_drop_the_role() {
        let result = resolve_src(
            r#"
            //! @testLabel()

            /// @test(unit,)
            fn test_broken() {}

            /// @test(
            fn fixture_half_done() -> Widget { todo!() }
            "#,
            true,
        );
        assert!(result.tests.is_empty());
        assert_eq!(names(&result.fixtures), vec!["fixture_half_done"]);
        assert_eq!(result.warnings.len(), 3);
        assert!(result.warnings[0].contains("@testLabel has an empty parameter list"));
    }

    #[test]
    fn default_label_always_exists() {
        let result = resolve(&SourceUnit::new("empty"), true);
        assert!(result.labels.contains_key(DEFAULT_LABEL));
        assert_eq!(result.label_registry().len(), 3);
    }

    #[test]
    fn resolving_twice_is_byte_identical() {
        let source = r#"
            //! @testLabel(blackbox, black_)
            /// @fixture
            fn widget() -> Widget { todo!() }
            /// @test(integration, unit)
            fn check(w: Widget) {}
            fn black_box() {}
            /// @test(
            fn broken() {}
        "#;
        let first = resolve_src(source, true);
        let second = resolve_src(source, true);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        assert_eq!(first.warnings, second.warnings);
    }
}
