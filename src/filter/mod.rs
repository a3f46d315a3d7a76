mod pattern;

pub use pattern::Pattern;

use crate::error::{Error, Result, ResultExt};

/// Result of matching a path against a filter.
///
/// The variants are ordered: `Out < DirDive < In`, and composing filters
/// takes the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Match {
    /// The path is excluded.
    Out,
    /// The path is a prefix of an included path; traversals must descend.
    DirDive,
    /// The path is included.
    In,
}

impl Match {
    pub fn is_in(&self) -> bool {
        matches!(self, Match::In)
    }
}

/// An ordered list of patterns; a path is included iff any pattern
/// includes it.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    patterns: Vec<Pattern>,
}

impl FilterSet {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        FilterSet { patterns }
    }

    /// Parse each input string as one pattern and or-compose them.
    pub fn from_patterns<I, S>(inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = inputs
            .into_iter()
            .map(|s| Pattern::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(FilterSet { patterns })
    }

    /// Load from the text of a pattern file, like a `.gitignore`.
    ///
    /// Blank lines and `#` comments are skipped. `!` negations are
    /// unsupported: skipped when `ignore_unsupported` is set, rejected
    /// otherwise.
    pub fn from_file_text(text: &str, ignore_unsupported: bool) -> Result<Self> {
        let mut patterns = Vec::new();
        for (lineno, line) in pattern_lines(text, ignore_unsupported)? {
            patterns
                .push(Pattern::parse(line).with_ctx(|| format!("pattern file line {lineno}"))?);
        }
        Ok(FilterSet { patterns })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Join of all member matches: `In` beats `DirDive` beats `Out`.
    pub fn matches(&self, path: &[String], is_dir: bool) -> Match {
        let mut best = Match::Out;
        for p in &self.patterns {
            let m = p.matches(path, is_dir);
            if m > best {
                best = m;
            }
            if best == Match::In {
                break;
            }
        }
        best
    }
}

/// The surviving pattern lines of a filter file, with 1-based line numbers.
fn pattern_lines(text: &str, ignore_unsupported: bool) -> Result<Vec<(usize, &str)>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('!') {
            if ignore_unsupported {
                continue;
            }
            return Err(Error::InvalidPattern {
                pattern: line.to_string(),
                reason: format!("line {}: negation is unsupported", idx + 1),
            });
        }
        out.push((idx + 1, line));
    }
    Ok(out)
}

/// Canonical form of a filter file: the surviving pattern lines, validated,
/// sorted and deduplicated.
pub fn canonical_lines(text: &str, ignore_unsupported: bool) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for (lineno, line) in pattern_lines(text, ignore_unsupported)? {
        Pattern::parse(line).with_ctx(|| format!("pattern file line {lineno}"))?;
        lines.push(line.to_string());
    }
    lines.sort();
    lines.dedup();
    Ok(lines)
}

/// Split a slash-separated path into matcher segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
