//! The version-specifier algebra: how a manifest entry's requirement string
//! maps to a resolution strategy.

use serde::{Deserialize, Serialize};

/// A plugin's desired-version requirement, as carried by a `Managed` manifest
/// entry.
///
/// The on-wire form is a single string (see [`VersionSpecifier::parse`] /
/// [`VersionSpecifier::to_wire_string`]); this type is the parsed form used
/// everywhere else in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionSpecifier {
    /// Resolve to the newest upstream version at install time.
    Latest,
    /// Use exactly this version string.
    Fixed(String),
    /// Resolve by upstream tag name. Reserved; the resolution engine
    /// currently rejects this variant.
    Tag(String),
    /// Resolve to the newest upstream version whose raw form matches this
    /// regex.
    Pattern(String),
    /// Adopt the concrete version currently resolved for another plugin in
    /// the same manifest.
    Sync(String),
}

const LATEST: &str = "latest";
const SYNC_PREFIX: &str = "sync:";
const TAG_PREFIX: &str = "tag:";
const PATTERN_PREFIX: &str = "pattern:";

impl VersionSpecifier {
    /// Parses the on-wire form of a version specifier.
    ///
    /// Rules are tried in order, with case-insensitive prefix matching:
    /// exact `latest` → [`Latest`](Self::Latest); `sync:<target>` (target
    /// non-empty) → [`Sync`](Self::Sync); `tag:<rest>` → [`Tag`](Self::Tag);
    /// `pattern:<rest>` → [`Pattern`](Self::Pattern); anything else →
    /// [`Fixed`](Self::Fixed).
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case(LATEST) {
            return Self::Latest;
        }
        if let Some(rest) = strip_prefix_ci(s, SYNC_PREFIX) {
            if !rest.is_empty() {
                return Self::Sync(rest.to_string());
            }
        }
        if let Some(rest) = strip_prefix_ci(s, TAG_PREFIX) {
            return Self::Tag(rest.to_string());
        }
        if let Some(rest) = strip_prefix_ci(s, PATTERN_PREFIX) {
            return Self::Pattern(rest.to_string());
        }
        Self::Fixed(s.to_string())
    }

    /// Serializes back to the on-wire form. The inverse of [`Self::parse`].
    ///
    /// `Fixed("latest")` can never be constructed by [`Self::parse`] (it
    /// would have parsed to [`Latest`](Self::Latest)), so this function never
    /// needs to disambiguate that case.
    pub fn to_wire_string(&self) -> String {
        match self {
            Self::Latest => LATEST.to_string(),
            Self::Fixed(v) => v.clone(),
            Self::Tag(t) => format!("{TAG_PREFIX}{t}"),
            Self::Pattern(r) => format!("{PATTERN_PREFIX}{r}"),
            Self::Sync(target) => format!("{SYNC_PREFIX}{target}"),
        }
    }

    /// True if this specifier is a [`Sync`](Self::Sync) requirement.
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }

    /// The sync target's name, if this is a [`Sync`](Self::Sync) specifier.
    pub fn sync_target(&self) -> Option<&str> {
        match self {
            Self::Sync(target) => Some(target.as_str()),
            _ => None,
        }
    }
}

/// Case-insensitive prefix strip that returns the remainder of `s` after `prefix`.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() < prefix.len() {
        return None;
    }
    let (head, tail) = s.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(tail)
}

impl std::fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

impl TryFrom<String> for VersionSpecifier {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self::parse(&value))
    }
}

impl From<VersionSpecifier> for String {
    fn from(value: VersionSpecifier) -> Self {
        value.to_wire_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_latest_case_insensitively() {
        assert_eq!(VersionSpecifier::parse("latest"), VersionSpecifier::Latest);
        assert_eq!(VersionSpecifier::parse("LATEST"), VersionSpecifier::Latest);
        assert_eq!(VersionSpecifier::parse("LaTeSt"), VersionSpecifier::Latest);
    }

    #[test]
    fn parses_sync() {
        assert_eq!(
            VersionSpecifier::parse("sync:Core"),
            VersionSpecifier::Sync("Core".to_string())
        );
        assert_eq!(
            VersionSpecifier::parse("SYNC:Core"),
            VersionSpecifier::Sync("Core".to_string())
        );
    }

    #[test]
    fn empty_sync_target_falls_back_to_fixed() {
        assert_eq!(
            VersionSpecifier::parse("sync:"),
            VersionSpecifier::Fixed("sync:".to_string())
        );
    }

    #[test]
    fn parses_tag_and_pattern() {
        assert_eq!(
            VersionSpecifier::parse("tag:nightly"),
            VersionSpecifier::Tag("nightly".to_string())
        );
        assert_eq!(
            VersionSpecifier::parse("pattern:^5\\."),
            VersionSpecifier::Pattern("^5\\.".to_string())
        );
    }

    #[test]
    fn anything_else_is_fixed() {
        assert_eq!(
            VersionSpecifier::parse("v5.4.102"),
            VersionSpecifier::Fixed("v5.4.102".to_string())
        );
    }

    #[test]
    fn fixed_latest_is_unreachable_by_construction() {
        // parse() never returns Fixed("latest"); this is the only way such a
        // value could exist, and round-tripping it is deliberately not
        // guaranteed by the property below.
        let degenerate = VersionSpecifier::Fixed(LATEST.to_string());
        assert_eq!(VersionSpecifier::parse(&degenerate.to_wire_string()), VersionSpecifier::Latest);
    }

    #[test]
    fn round_trips_through_wire_string() {
        let cases = [
            VersionSpecifier::Latest,
            VersionSpecifier::Fixed("1.2.3".to_string()),
            VersionSpecifier::Tag("nightly".to_string()),
            VersionSpecifier::Pattern("^5\\.".to_string()),
            VersionSpecifier::Sync("Core".to_string()),
        ];
        for case in cases {
            let wire = case.to_wire_string();
            assert_eq!(VersionSpecifier::parse(&wire), case, "round trip of {wire}");
        }
    }

    #[test]
    fn is_sync_and_sync_target() {
        let s = VersionSpecifier::Sync("Core".to_string());
        assert!(s.is_sync());
        assert_eq!(s.sync_target(), Some("Core"));

        let f = VersionSpecifier::Fixed("1.0.0".to_string());
        assert!(!f.is_sync());
        assert_eq!(f.sync_target(), None);
    }
}
