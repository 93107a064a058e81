//! The path model (spec §4.1).
//!
//! Two canonical representations are preserved: *internal* (always
//! slash-joined) and *external* (OS-native, used only at the edges by
//! collaborators -- this crate never touches the filesystem itself). A
//! [`FilePath`] is an ordered sequence of [`PathComponent`]s; the empty
//! sequence denotes the root.

use std::fmt;

use crate::error::{PathReason, VertreeError};

/// A non-empty, slash-free, non-`.`, non-`..` path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathComponent(String);

impl PathComponent {
    pub fn new(s: impl Into<String>) -> Result<PathComponent, VertreeError> {
        let s = s.into();
        validate_component(&s)?;
        Ok(PathComponent(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_component(s: &str) -> Result<(), VertreeError> {
    if s.is_empty() {
        return Err(VertreeError::Path {
            path: s.to_string(),
            reason: PathReason::EmptyComponent,
        });
    }
    if s == "." {
        return Err(VertreeError::Path {
            path: s.to_string(),
            reason: PathReason::DotComponent,
        });
    }
    if s == ".." {
        return Err(VertreeError::Path {
            path: s.to_string(),
            reason: PathReason::DotDotComponent,
        });
    }
    if s.contains('\0') {
        return Err(VertreeError::Path {
            path: s.to_string(),
            reason: PathReason::EmbeddedNul,
        });
    }
    if s.contains('\\') {
        return Err(VertreeError::Path {
            path: s.to_string(),
            reason: PathReason::Backslash,
        });
    }
    if s.contains('/') {
        return Err(VertreeError::Path {
            path: s.to_string(),
            reason: PathReason::EmbeddedSlash,
        });
    }
    Ok(())
}

/// An ordered sequence of [`PathComponent`]s. The empty sequence is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePath(Vec<PathComponent>);

impl FilePath {
    pub fn root() -> FilePath {
        FilePath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.0
    }

    pub fn from_components(components: Vec<PathComponent>) -> FilePath {
        FilePath(components)
    }

    /// Splits an internal (slash-joined) path into its components.
    ///
    /// Rejects empty components, `.`, `..`, backslashes, a leading `/`, and
    /// an embedded NUL byte.
    pub fn split(internal: &str) -> Result<FilePath, VertreeError> {
        if internal.is_empty() {
            return Ok(FilePath::root());
        }
        if internal.starts_with('/') {
            return Err(VertreeError::Path {
                path: internal.to_string(),
                reason: PathReason::LeadingSlash,
            });
        }
        let mut components = Vec::new();
        for part in internal.split('/') {
            components.push(PathComponent::new(part)?);
        }
        Ok(FilePath(components))
    }

    /// Joins the components back into their internal (slash-joined) form.
    pub fn join(&self) -> String {
        self.0
            .iter()
            .map(PathComponent::as_str)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn parent(&self) -> Option<FilePath> {
        if self.0.is_empty() {
            None
        } else {
            Some(FilePath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn basename(&self) -> Option<&PathComponent> {
        self.0.last()
    }

    pub fn child(&self, name: PathComponent) -> FilePath {
        let mut v = self.0.clone();
        v.push(name);
        FilePath(v)
    }

    /// True iff `other`'s component list starts with `self`'s (`self` included).
    pub fn is_prefix_of(&self, other: &FilePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", true)]
    #[case("a", true)]
    #[case("a/b/c", true)]
    #[case("/a", false)]
    #[case("a//b", false)]
    #[case("a/./b", false)]
    #[case("a/../b", false)]
    #[case("a\\b", false)]
    fn split_validates(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(FilePath::split(input).is_ok(), ok, "input = {input:?}");
    }

    #[test]
    fn join_round_trips() {
        let p = FilePath::split("a/b/c").unwrap();
        assert_eq!(p.join(), "a/b/c");
    }

    #[test]
    fn root_is_empty() {
        let p = FilePath::root();
        assert!(p.is_root());
        assert_eq!(p.join(), "");
    }

    #[test]
    fn prefix_semantics() {
        let a = FilePath::split("a").unwrap();
        let ab = FilePath::split("a/b").unwrap();
        let b = FilePath::split("b").unwrap();
        assert!(a.is_prefix_of(&ab));
        assert!(a.is_prefix_of(&a));
        assert!(!b.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
    }

    #[test]
    fn ordering_is_componentwise_bytewise() {
        let mut paths = vec![
            FilePath::split("b").unwrap(),
            FilePath::split("a/z").unwrap(),
            FilePath::split("a").unwrap(),
            FilePath::split("a/a").unwrap(),
        ];
        paths.sort();
        let joined: Vec<_> = paths.iter().map(FilePath::join).collect();
        assert_eq!(joined, vec!["a", "a/a", "a/z", "b"]);
    }

    #[test]
    fn parent_and_basename() {
        let p = FilePath::split("a/b/c").unwrap();
        assert_eq!(p.parent().unwrap().join(), "a/b");
        assert_eq!(p.basename().unwrap().as_str(), "c");
        assert!(FilePath::root().parent().is_none());
    }
}
