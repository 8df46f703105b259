//! The annotation grammar found in doc comments.
//!
//! A directive sits alone on its line:
//!
//! ```text
//! @fixture
//! @test(integration, slow)
//! @testLabel(blackbox, black_, bb)
//! ```
//!
//! Any other `@word` in a comment is prose and is ignored.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DIRECTIVE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([A-Za-z]\w*)\s*(\(.*)?$").expect("valid directive pattern")
});

static PARAMETER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid parameter pattern"));

/// How many parameters a directive takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectiveKind {
    Test,
    Fixture,
    OnceFixture,
    BeforeTest,
    AfterTest,
    TestLabel,
    DefaultTestLabel,
    DisableAutoLabelling,
}

impl DirectiveKind {
    /// Role directives in the order they are tried when classifying a function.
    pub const ROLES: [DirectiveKind; 5] = [
        DirectiveKind::Test,
        DirectiveKind::Fixture,
        DirectiveKind::OnceFixture,
        DirectiveKind::BeforeTest,
        DirectiveKind::AfterTest,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "test" => DirectiveKind::Test,
            "fixture" => DirectiveKind::Fixture,
            "onceFixture" => DirectiveKind::OnceFixture,
            "beforeTest" => DirectiveKind::BeforeTest,
            "afterTest" => DirectiveKind::AfterTest,
            "testLabel" => DirectiveKind::TestLabel,
            "defaultTestLabel" => DirectiveKind::DefaultTestLabel,
            "disableAutoLabelling" => DirectiveKind::DisableAutoLabelling,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DirectiveKind::Test => "test",
            DirectiveKind::Fixture => "fixture",
            DirectiveKind::OnceFixture => "onceFixture",
            DirectiveKind::BeforeTest => "beforeTest",
            DirectiveKind::AfterTest => "afterTest",
            DirectiveKind::TestLabel => "testLabel",
            DirectiveKind::DefaultTestLabel => "defaultTestLabel",
            DirectiveKind::DisableAutoLabelling => "disableAutoLabelling",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            DirectiveKind::Fixture | DirectiveKind::OnceFixture | DirectiveKind::DisableAutoLabelling => {
                Arity::None
            }
            DirectiveKind::Test | DirectiveKind::BeforeTest | DirectiveKind::AfterTest => {
                Arity::Optional
            }
            DirectiveKind::TestLabel | DirectiveKind::DefaultTestLabel => Arity::Required,
        }
    }

    /// Whether the directive assigns a role to the function it documents.
    pub fn is_role(&self) -> bool {
        DirectiveKind::ROLES.contains(self)
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name())
    }
}

/// A parsed directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub params: Vec<String>,
}

/// A directive line that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveParseError {
    #[error("{kind} has an empty parameter list")]
    EmptyParameters { kind: DirectiveKind },

    #[error("{kind} requires at least one parameter")]
    MissingParameters { kind: DirectiveKind },

    #[error("{kind} does not take parameters")]
    UnexpectedParameters { kind: DirectiveKind },

    #[error("{kind} has an invalid parameter `{param}`")]
    InvalidParameter { kind: DirectiveKind, param: String },

    #[error("{kind} has an unterminated parameter list")]
    Unterminated { kind: DirectiveKind },
}

impl DirectiveParseError {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            DirectiveParseError::EmptyParameters { kind }
            | DirectiveParseError::MissingParameters { kind }
            | DirectiveParseError::UnexpectedParameters { kind }
            | DirectiveParseError::InvalidParameter { kind, .. }
            | DirectiveParseError::Unterminated { kind } => *kind,
        }
    }
}

pub type ParsedDirective = Result<Directive, DirectiveParseError>;

/// Parse a single trimmed line. `None` when the line is not a directive.
pub fn parse_line(line: &str) -> Option<ParsedDirective> {
    let caps = DIRECTIVE_LINE.captures(line.trim())?;
    let kind = DirectiveKind::from_name(&caps[1])?;
    let params = caps.get(2).map(|m| m.as_str());
    Some(parse_params(kind, params))
}

fn parse_params(kind: DirectiveKind, raw: Option<&str>) -> ParsedDirective {
    let Some(raw) = raw else {
        return match kind.arity() {
            Arity::Required => Err(DirectiveParseError::MissingParameters { kind }),
            Arity::None | Arity::Optional => Ok(Directive {
                kind,
                params: Vec::new(),
            }),
        };
    };

    let inner = raw
        .trim_end()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or(DirectiveParseError::Unterminated { kind })?;

    if kind.arity() == Arity::None {
        return Err(DirectiveParseError::UnexpectedParameters { kind });
    }
    if inner.trim().is_empty() {
        return Err(DirectiveParseError::EmptyParameters { kind });
    }

    let params = inner
        .split(',')
        .map(str::trim)
        .map(|param| {
            if PARAMETER.is_match(param) {
                Ok(param.to_string())
            } else {
                Err(DirectiveParseError::InvalidParameter {
                    kind,
                    param: param.to_string(),
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Directive { kind, params })
}

/// Every directive in a comment, in line order.
pub fn parse_comment(comment: &str) -> Vec<ParsedDirective> {
    comment.lines().filter_map(parse_line).collect()
}

/// The first occurrence of `kind` in a comment.
pub fn find(comment: &str, kind: DirectiveKind) -> Option<ParsedDirective> {
    comment.lines().filter_map(parse_line).find(|parsed| match parsed {
        Ok(directive) => directive.kind == kind,
        Err(err) => err.kind() == kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(line: &str) -> Directive {
        parse_line(line).unwrap().unwrap()
    }

    fn err(line: &str) -> DirectiveParseError {
        parse_line(line).unwrap().unwrap_err()
    }

    #[test]
    fn parses_bare_and_parameterized_directives() {
        assert_eq!(
            ok("@fixture"),
            Directive {
                kind: DirectiveKind::Fixture,
                params: vec![]
            }
        );
        assert_eq!(ok("  @test( unit ,integration )  ").params, vec!["unit", "integration"]);
        assert_eq!(ok("@testLabel(blackbox, black_)").params, vec!["blackbox", "black_"]);
        assert_eq!(ok("@beforeTest").kind, DirectiveKind::BeforeTest);
    }

    #[test]
    fn prose_and_unknown_directives_are_ignored() {
        assert!(parse_line("Builds a widget for @test use").is_none());
        assert!(parse_line("@param widget the widget").is_none());
        assert!(parse_line("email me @ home").is_none());
    }

    #[test]
    fn malformed_parameters_are_errors() {
        assert_eq!(
            err("@testLabel"),
            DirectiveParseError::MissingParameters {
                kind: DirectiveKind::TestLabel
            }
        );
        assert_eq!(
            err("@testLabel()"),
            DirectiveParseError::EmptyParameters {
                kind: DirectiveKind::TestLabel
            }
        );
        assert_eq!(
            err("@test(unit"),
            DirectiveParseError::Unterminated {
                kind: DirectiveKind::Test
            }
        );
        assert_eq!(
            err("@fixture(x)"),
            DirectiveParseError::UnexpectedParameters {
                kind: DirectiveKind::Fixture
            }
        );
        assert!(matches!(
            err("@test(unit, two words)"),
            DirectiveParseError::InvalidParameter { .. }
        ));
        assert!(matches!(err("@test(unit,)"), DirectiveParseError::InvalidParameter { .. }));
    }

    #[test]
    fn find_returns_first_occurrence_of_kind() {
        let comment = "Checks the widget.\n\n@test(integration)\n@test(unit)\n";
        let found = find(comment, DirectiveKind::Test).unwrap().unwrap();
        assert_eq!(found.params, vec!["integration"]);
        assert!(find(comment, DirectiveKind::Fixture).is_none());
        assert_eq!(parse_comment(comment).len(), 2);
    }

    #[test]
    fn error_messages_name_the_directive() {
        assert_eq!(
            err("@defaultTestLabel()").to_string(),
            "@defaultTestLabel has an empty parameter list"
        );
    }
}
