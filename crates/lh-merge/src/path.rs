//! Field paths tracked while walking a document during a merge.

use std::fmt;

/// Marker used for array items in the matchable form of a path.
pub(crate) const ITEM_SEGMENT: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a value inside a configuration document.
///
/// Displays as `passes[0].gatherers`; matches policy rules in its
/// slash-separated form (`passes/#/gatherers`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The document root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push_key(&mut self, key: &str) {
        self.segments.push(Segment::Key(key.to_string()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.segments.push(Segment::Index(index));
    }

    pub fn pop(&mut self) {
        self.segments.pop();
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Slash-separated form used for glob matching. A `/` inside a key is
    /// encoded so that every key stays a single segment.
    pub fn matchable(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Key(key) => encode_key(key),
                Segment::Index(_) => ITEM_SEGMENT.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

fn encode_key(key: &str) -> String {
    key.replace('%', "%25").replace('/', "%2F")
}

/// Convert a user-facing dotted pattern (`passes.*.gatherers`) into the
/// slash-separated glob form matched against [`FieldPath::matchable`].
pub(crate) fn pattern_to_glob(pattern: &str) -> String {
    pattern
        .trim()
        .split('.')
        .map(encode_key)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_matchable() {
        let mut path = FieldPath::root();
        path.push_key("passes");
        path.push_index(2);
        path.push_key("gatherers");

        assert_eq!(path.to_string(), "passes[2].gatherers");
        assert_eq!(path.matchable(), "passes/#/gatherers");

        path.pop();
        assert_eq!(path.to_string(), "passes[2]");
    }

    #[test]
    fn test_slash_in_key_stays_one_segment() {
        let mut path = FieldPath::root();
        path.push_key("categories");
        path.push_key("plugin/perf");
        path.push_key("auditRefs");

        assert_eq!(path.to_string(), "categories.plugin/perf.auditRefs");
        assert_eq!(path.matchable(), "categories/plugin%2Fperf/auditRefs");
        assert_eq!(
            pattern_to_glob("categories.plugin/perf.auditRefs"),
            path.matchable()
        );
    }

    #[test]
    fn test_root_display() {
        assert_eq!(FieldPath::root().to_string(), "<root>");
        assert!(FieldPath::root().is_root());
    }

    #[test]
    fn test_pattern_to_glob() {
        assert_eq!(pattern_to_glob("settings.**"), "settings/**");
        assert_eq!(pattern_to_glob(" passes.*.gatherers "), "passes/*/gatherers");
    }
}
