//! Tag and repository selectors.
//!
//! A configured [`Selector`] is compiled once per policy into a
//! [`CompiledSelector`]; unknown kinds, mismatched decorations, and bad
//! patterns are configuration errors surfaced at policy create/update.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use retention_core::{Candidate, Result, RetentionError, Selector};

// ── Kind and decoration ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    /// Matches a label attached to the tag. Tag selectors only.
    Label,
    /// Whole-string regular expression on the tag or repository name.
    RegularExpression,
    /// Exact string equality on the tag or repository name.
    Literal,
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorKind::Label => write!(f, "label"),
            SelectorKind::RegularExpression => write!(f, "regularExpression"),
            SelectorKind::Literal => write!(f, "literal"),
        }
    }
}

impl FromStr for SelectorKind {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "label" => Ok(SelectorKind::Label),
            "regularExpression" => Ok(SelectorKind::RegularExpression),
            "literal" => Ok(SelectorKind::Literal),
            other => Err(RetentionError::config(format!("unknown selector kind: '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoration {
    With,
    Without,
    Matches,
    Excludes,
}

impl Decoration {
    /// Whether the decoration inverts the raw match.
    fn negates(&self) -> bool {
        matches!(self, Decoration::Without | Decoration::Excludes)
    }
}

impl fmt::Display for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoration::With => write!(f, "with"),
            Decoration::Without => write!(f, "without"),
            Decoration::Matches => write!(f, "matches"),
            Decoration::Excludes => write!(f, "excludes"),
        }
    }
}

impl FromStr for Decoration {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "with" => Ok(Decoration::With),
            "without" => Ok(Decoration::Without),
            "matches" => Ok(Decoration::Matches),
            "excludes" => Ok(Decoration::Excludes),
            other => Err(RetentionError::config(format!("unknown selector decoration: '{}'", other))),
        }
    }
}

/// What a selector is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorTarget {
    Tag,
    Repository,
}

// ── Compiled selector ───────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Matcher {
    Label(String),
    Pattern(Regex),
    Literal(String),
}

#[derive(Debug, Clone)]
pub struct CompiledSelector {
    kind: SelectorKind,
    decoration: Decoration,
    matcher: Matcher,
}

impl CompiledSelector {
    pub fn compile(selector: &Selector, target: SelectorTarget) -> Result<Self> {
        let kind: SelectorKind = selector.kind.parse()?;
        let decoration: Decoration = selector.decoration.parse()?;

        let decoration_ok = match kind {
            SelectorKind::Label => matches!(decoration, Decoration::With | Decoration::Without),
            SelectorKind::RegularExpression | SelectorKind::Literal => {
                matches!(decoration, Decoration::Matches | Decoration::Excludes)
            }
        };
        if !decoration_ok {
            return Err(RetentionError::config(format!(
                "decoration '{}' is not valid for selector kind '{}'",
                decoration, kind
            )));
        }

        let matcher = match kind {
            SelectorKind::Label => {
                if target == SelectorTarget::Repository {
                    return Err(RetentionError::config(
                        "label selectors cannot be used as scope selectors",
                    ));
                }
                Matcher::Label(selector.pattern.clone())
            }
            SelectorKind::RegularExpression => {
                let anchored = format!("^(?:{})$", selector.pattern);
                let re = Regex::new(&anchored).map_err(|e| {
                    RetentionError::config(format!(
                        "invalid regular expression '{}': {}",
                        selector.pattern, e
                    ))
                })?;
                Matcher::Pattern(re)
            }
            SelectorKind::Literal => Matcher::Literal(selector.pattern.clone()),
        };

        Ok(Self { kind, decoration, matcher })
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn decoration(&self) -> Decoration {
        self.decoration
    }

    /// Apply as a tag selector.
    pub fn matches_candidate(&self, candidate: &Candidate) -> bool {
        let raw = match &self.matcher {
            Matcher::Label(label) => candidate.has_label(label),
            Matcher::Pattern(re) => re.is_match(&candidate.tag),
            Matcher::Literal(lit) => candidate.tag == *lit,
        };
        raw != self.decoration.negates()
    }

    /// Apply as a scope selector on a repository name.
    pub fn matches_repository(&self, repository: &str) -> bool {
        let raw = match &self.matcher {
            // Rejected at compile time for repository targets.
            Matcher::Label(_) => false,
            Matcher::Pattern(re) => re.is_match(repository),
            Matcher::Literal(lit) => repository == lit,
        };
        raw != self.decoration.negates()
    }
}

pub(crate) fn compile_all(
    selectors: &[Selector],
    target: SelectorTarget,
) -> Result<Vec<CompiledSelector>> {
    selectors
        .iter()
        .map(|s| CompiledSelector::compile(s, target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(tag: &str, labels: &[&str]) -> Candidate {
        Candidate {
            repository: "library/app".into(),
            tag: tag.into(),
            pushed_at: Utc::now(),
            created_at: Utc::now(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn tag_selector(kind: &str, decoration: &str, pattern: &str) -> CompiledSelector {
        CompiledSelector::compile(&Selector::new(kind, decoration, pattern), SelectorTarget::Tag)
            .unwrap()
    }

    #[test]
    fn label_with_and_without() {
        let with = tag_selector("label", "with", "latest");
        let without = tag_selector("label", "without", "latest");
        let labelled = candidate("1.0", &["latest", "prod"]);
        let plain = candidate("1.1", &[]);

        assert!(with.matches_candidate(&labelled));
        assert!(!with.matches_candidate(&plain));
        assert!(!without.matches_candidate(&labelled));
        assert!(without.matches_candidate(&plain));
    }

    #[test]
    fn regex_is_anchored_to_the_whole_tag() {
        let sel = tag_selector("regularExpression", "matches", r"release-[\d\.]+");
        assert!(sel.matches_candidate(&candidate("release-1.2.3", &[])));
        assert!(!sel.matches_candidate(&candidate("pre-release-1.2", &[])));
        assert!(!sel.matches_candidate(&candidate("release-1.2-rc", &[])));
    }

    #[test]
    fn regex_excludes_inverts() {
        let sel = tag_selector("regularExpression", "excludes", "dev-.*");
        assert!(!sel.matches_candidate(&candidate("dev-abc", &[])));
        assert!(sel.matches_candidate(&candidate("v1", &[])));
    }

    #[test]
    fn literal_matches_repository_exactly() {
        let sel = CompiledSelector::compile(
            &Selector::new("literal", "matches", "library/app"),
            SelectorTarget::Repository,
        )
        .unwrap();
        assert!(sel.matches_repository("library/app"));
        assert!(!sel.matches_repository("library/app2"));
    }

    #[test]
    fn unknown_kind_is_configuration_error() {
        let err = CompiledSelector::compile(
            &Selector::new("doublestar", "matches", "**"),
            SelectorTarget::Tag,
        )
        .unwrap_err();
        assert!(matches!(err, RetentionError::Configuration(_)));
    }

    #[test]
    fn mismatched_decoration_is_rejected() {
        let err = CompiledSelector::compile(
            &Selector::new("label", "matches", "latest"),
            SelectorTarget::Tag,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not valid"));
    }

    #[test]
    fn label_scope_selector_is_rejected() {
        let err = CompiledSelector::compile(
            &Selector::new("label", "with", "latest"),
            SelectorTarget::Repository,
        )
        .unwrap_err();
        assert!(matches!(err, RetentionError::Configuration(_)));
    }

    #[test]
    fn bad_regex_is_rejected() {
        let err = CompiledSelector::compile(
            &Selector::new("regularExpression", "matches", "v(1"),
            SelectorTarget::Tag,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid regular expression"));
    }
}
