//! Dotted resource identifiers and namespace allow-lists (spec §3, §11).

use std::fmt;
use std::hash::{Hash, Hasher};

/// Dotted segment identifier, e.g. `Builtin::GBuffer::Normals`.
///
/// Segments are interned as owned strings; the hash is cached so repeated
/// lookups in hot paths (dependency graph construction, registry interning)
/// don't re-hash the segment list every time.
#[derive(Debug, Clone, Eq)]
pub struct ResourceIdentifier {
    segments: Vec<String>,
    cached_hash: u64,
}

impl ResourceIdentifier {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let cached_hash = Self::compute_hash(&segments);
        Self {
            segments,
            cached_hash,
        }
    }

    /// Parse `"Builtin::GBuffer::Normals"` into its segments.
    pub fn parse(dotted: &str) -> Self {
        Self::new(dotted.split("::"))
    }

    fn compute_hash(segments: &[String]) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        segments.hash(&mut hasher);
        hasher.finish()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True iff `self` starts with every segment of `prefix`, in order.
    pub fn has_prefix(&self, prefix: &ResourceIdentifier) -> bool {
        if prefix.segments.len() > self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(prefix.segments.iter())
            .all(|(a, b)| a == b)
    }
}

impl PartialEq for ResourceIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.cached_hash == other.cached_hash && self.segments == other.segments
    }
}

impl Hash for ResourceIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cached_hash.hash(state);
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("::"))
    }
}

impl From<&str> for ResourceIdentifier {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// A named set of identifiers, used for namespace allow-lists and for
/// batch-applying internal transitions across a logical group of resources
/// (supplements spec.md — see SPEC_FULL.md §11).
#[derive(Debug, Clone, Default)]
pub struct ResourceGroup {
    members: Vec<ResourceIdentifier>,
}

impl ResourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ResourceIdentifier) -> Self {
        self.members.push(id);
        self
    }

    /// True iff `id` has any member of this group as a prefix.
    pub fn allows(&self, id: &ResourceIdentifier) -> bool {
        self.members.iter().any(|prefix| id.has_prefix(prefix))
    }

    pub fn members(&self) -> &[ResourceIdentifier] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_exact_and_nested() {
        let gbuffer_normals = ResourceIdentifier::parse("Builtin::GBuffer::Normals");
        let gbuffer = ResourceIdentifier::parse("Builtin::GBuffer");
        let unrelated = ResourceIdentifier::parse("Builtin::Shadow");
        assert!(gbuffer_normals.has_prefix(&gbuffer));
        assert!(gbuffer_normals.has_prefix(&gbuffer_normals));
        assert!(!gbuffer_normals.has_prefix(&unrelated));
        assert!(!gbuffer.has_prefix(&gbuffer_normals));
    }

    #[test]
    fn equality_ignores_nothing_but_matches_segments() {
        let a = ResourceIdentifier::parse("A::B");
        let b = ResourceIdentifier::new(["A", "B"]);
        assert_eq!(a, b);
    }

    #[test]
    fn group_allows_prefix_members() {
        let group = ResourceGroup::new().with(ResourceIdentifier::parse("Builtin::GBuffer"));
        assert!(group.allows(&ResourceIdentifier::parse("Builtin::GBuffer::Normals")));
        assert!(!group.allows(&ResourceIdentifier::parse("Builtin::Shadow::Map")));
    }
}
