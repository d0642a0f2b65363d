//! Topic and subscription-pattern matching
//!
//! Topics are colon-delimited address strings (`tg:12345`, `inbound:42`,
//! `system:spawn`). Subscription patterns have the same shape plus two
//! wildcard forms:
//!
//! - `*` as a full segment matches exactly one segment at that position
//!   (`inbound:*` matches `inbound:42` but not `inbound:42:extra`)
//! - a trailing `*` glued to a prefix in the last segment matches any
//!   suffix, including the empty one (`tg:4*` matches `tg:4`, `tg:42`,
//!   and `tg:42:edit`)
//!
//! An empty topic matches only the empty pattern. Matching is O(segments);
//! patterns are parsed once at subscribe time.
//!
//! # Examples
//!
//! ```rust
//! use bub_core::TopicPattern;
//!
//! let exact = TopicPattern::parse("system:spawn").unwrap();
//! assert!(exact.matches("system:spawn"));
//! assert!(!exact.matches("system:disconnect"));
//!
//! let one = TopicPattern::parse("inbound:*").unwrap();
//! assert!(one.matches("inbound:42"));
//! assert!(!one.matches("inbound:42:reply"));
//!
//! let suffix = TopicPattern::parse("tg:*").unwrap();
//! assert!(suffix.matches("tg:12345"));
//! ```

use std::fmt;

/// Error type for pattern parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Empty segment from consecutive colons (`a::b`)
    EmptySegment,
    /// `*` glued to text anywhere but the end of the last segment (`a*:b`, `*b`)
    WildcardPosition,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::EmptySegment => {
                write!(f, "pattern contains an empty segment (consecutive colons)")
            }
            PatternError::WildcardPosition => write!(
                f,
                "wildcard may only be a full segment or a trailing suffix in the last segment"
            ),
        }
    }
}

impl std::error::Error for PatternError {}

/// One parsed pattern segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal segment text
    Literal(String),
    /// Single-segment wildcard (`*` as a full segment)
    Any,
}

impl Segment {
    fn matches(&self, part: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == part,
            Segment::Any => true,
        }
    }
}

/// A parsed subscription pattern
///
/// The three forms cover every pattern the bus accepts. Keeping the parsed
/// form avoids re-splitting the pattern on every publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
    /// No wildcards; matches one topic exactly (including the empty topic)
    Exact(String),
    /// Contains `*` full-segment wildcards; segment counts must agree
    Segmented {
        /// Original pattern text
        pattern: String,
        /// Parsed segments, at least one of them `Any`
        segments: Vec<Segment>,
    },
    /// Ends in `<prefix>*`; matches any suffix after the prefix
    Suffix {
        /// Original pattern text
        pattern: String,
        /// Segments before the suffix segment
        head: Vec<Segment>,
        /// Text the suffix segment must start with (never empty)
        last_prefix: String,
    },
}

impl TopicPattern {
    /// Parse a pattern string
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bub_core::TopicPattern;
    ///
    /// assert!(TopicPattern::parse("outbound:*").is_ok());
    /// assert!(TopicPattern::parse("a::b").is_err());
    /// assert!(TopicPattern::parse("*b").is_err());
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Ok(TopicPattern::Exact(String::new()));
        }

        if !pattern.contains('*') {
            if has_empty_segment(pattern) {
                return Err(PatternError::EmptySegment);
            }
            return Ok(TopicPattern::Exact(pattern.to_string()));
        }

        let parts: Vec<&str> = pattern.split(':').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        let mut suffix_prefix: Option<String> = None;

        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(PatternError::EmptySegment);
            }

            if *part == "*" {
                segments.push(Segment::Any);
            } else if let Some(prefix) = part.strip_suffix('*') {
                // A glued wildcard is only legal as the tail of the last segment.
                if i != last || prefix.contains('*') {
                    return Err(PatternError::WildcardPosition);
                }
                suffix_prefix = Some(prefix.to_string());
            } else if part.contains('*') {
                return Err(PatternError::WildcardPosition);
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        if let Some(last_prefix) = suffix_prefix {
            Ok(TopicPattern::Suffix {
                pattern: pattern.to_string(),
                head: segments,
                last_prefix,
            })
        } else {
            Ok(TopicPattern::Segmented {
                pattern: pattern.to_string(),
                segments,
            })
        }
    }

    /// Check whether a topic matches this pattern
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Segmented { segments, .. } => {
                if topic.is_empty() {
                    return false;
                }
                let parts: Vec<&str> = topic.split(':').collect();
                parts.len() == segments.len()
                    && segments.iter().zip(parts.iter()).all(|(s, p)| s.matches(p))
            }
            TopicPattern::Suffix {
                head, last_prefix, ..
            } => {
                if topic.is_empty() {
                    return false;
                }
                let parts: Vec<&str> = topic.split(':').collect();
                if parts.len() < head.len() + 1 {
                    return false;
                }
                if !head.iter().zip(parts.iter()).all(|(s, p)| s.matches(p)) {
                    return false;
                }
                parts[head.len()].starts_with(last_prefix.as_str())
            }
        }
    }

    /// True when the pattern contains any wildcard
    pub fn is_pattern(&self) -> bool {
        !matches!(self, TopicPattern::Exact(_))
    }

    /// The original pattern text
    pub fn as_str(&self) -> &str {
        match self {
            TopicPattern::Exact(s) => s,
            TopicPattern::Segmented { pattern, .. } => pattern,
            TopicPattern::Suffix { pattern, .. } => pattern,
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn has_empty_segment(pattern: &str) -> bool {
    pattern.split(':').any(|part| part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let pattern = TopicPattern::parse("system:spawn").unwrap();
        assert!(!pattern.is_pattern());
        assert!(pattern.matches("system:spawn"));
        assert!(!pattern.matches("system:disconnect"));
        assert!(!pattern.matches("system"));
        assert!(!pattern.matches("system:spawn:x"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let pattern = TopicPattern::parse("inbound:*").unwrap();
        assert!(pattern.is_pattern());
        assert!(pattern.matches("inbound:42"));
        assert!(pattern.matches("inbound:chat"));
        assert!(!pattern.matches("inbound"));
        assert!(!pattern.matches("inbound:42:reply"));
        assert!(!pattern.matches("outbound:42"));
    }

    #[test]
    fn test_wildcard_in_middle() {
        let pattern = TopicPattern::parse("tg:*:edit").unwrap();
        assert!(pattern.matches("tg:42:edit"));
        assert!(!pattern.matches("tg:edit"));
        assert!(!pattern.matches("tg:42:1:edit"));
    }

    #[test]
    fn test_wildcard_at_start() {
        let pattern = TopicPattern::parse("*:42").unwrap();
        assert!(pattern.matches("tg:42"));
        assert!(pattern.matches("discord:42"));
        assert!(!pattern.matches("tg:43"));
        assert!(!pattern.matches("tg:42:x"));
    }

    #[test]
    fn test_bare_wildcard() {
        let pattern = TopicPattern::parse("*").unwrap();
        assert!(pattern.matches("tg"));
        assert!(pattern.matches("inbound"));
        assert!(!pattern.matches("tg:42"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_suffix_wildcard() {
        let pattern = TopicPattern::parse("tg:4*").unwrap();
        assert!(pattern.matches("tg:4"));
        assert!(pattern.matches("tg:42"));
        assert!(pattern.matches("tg:42:edit"));
        assert!(!pattern.matches("tg:52"));
        assert!(!pattern.matches("tg"));
    }

    #[test]
    fn test_suffix_wildcard_single_segment() {
        let pattern = TopicPattern::parse("system*").unwrap();
        assert!(pattern.matches("system"));
        assert!(pattern.matches("system:spawn"));
        assert!(pattern.matches("system:disconnect"));
        assert!(!pattern.matches("sys"));
    }

    #[test]
    fn test_empty_topic_matches_only_empty_pattern() {
        let empty = TopicPattern::parse("").unwrap();
        assert!(empty.matches(""));
        assert!(!empty.matches("a"));

        let wild = TopicPattern::parse("*").unwrap();
        assert!(!wild.matches(""));
        let suffix = TopicPattern::parse("a*").unwrap();
        assert!(!suffix.matches(""));
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert_eq!(
            TopicPattern::parse("a::b"),
            Err(PatternError::EmptySegment)
        );
        assert_eq!(TopicPattern::parse("a:"), Err(PatternError::EmptySegment));
        assert_eq!(
            TopicPattern::parse(":*"),
            Err(PatternError::EmptySegment)
        );
    }

    #[test]
    fn test_misplaced_wildcards_rejected() {
        assert_eq!(
            TopicPattern::parse("*b"),
            Err(PatternError::WildcardPosition)
        );
        assert_eq!(
            TopicPattern::parse("a*:b"),
            Err(PatternError::WildcardPosition)
        );
        assert_eq!(
            TopicPattern::parse("a:b*c"),
            Err(PatternError::WildcardPosition)
        );
        assert_eq!(
            TopicPattern::parse("a:b**"),
            Err(PatternError::WildcardPosition)
        );
    }

    #[test]
    fn test_multiple_full_wildcards() {
        let pattern = TopicPattern::parse("*:*").unwrap();
        assert!(pattern.matches("tg:42"));
        assert!(!pattern.matches("tg"));
        assert!(!pattern.matches("tg:42:x"));
    }

    #[test]
    fn test_display_round_trips() {
        for raw in ["tg:42", "inbound:*", "tg:4*", "*:*"] {
            let pattern = TopicPattern::parse(raw).unwrap();
            assert_eq!(format!("{}", pattern), raw);
        }
    }
}
