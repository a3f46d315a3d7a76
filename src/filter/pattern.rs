use glob::MatchOptions;

use crate::error::{Error, Result};
use crate::filter::Match;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single path pattern in the restricted gitignore dialect.
///
///   - `*`, `?` and `[…]` match within one path segment.
///   - `**` spans any number of directory levels and may appear at most
///     once; a trailing `**` or `**/` is dropped at parse time.
///   - `!` negation and `\` escapes are unsupported.
///   - Patterns are root-relative: `LICENSE` matches only the `LICENSE` in
///     the repository root; use `**/LICENSE` to match at any depth.
///   - A trailing `/` restricts the pattern to directories, which for file
///     lookups means "any file directly or indirectly inside".
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    dir_only: bool,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Simple {
        segments: Vec<glob::Pattern>,
    },
    WithDoubleStar {
        before: Vec<glob::Pattern>,
        after: Vec<glob::Pattern>,
    },
}

impl Pattern {
    pub fn parse(input: &str) -> Result<Pattern> {
        let raw = input.trim().to_string();

        let mut body = raw.as_str();
        let mut dir_only = false;
        if let Some(stripped) = body.strip_suffix("**/") {
            body = stripped;
        } else if let Some(stripped) = body.strip_suffix("**") {
            body = stripped;
        } else if body.ends_with('/') {
            dir_only = true;
        }
        // Patterns are root-relative; a leading slash is noise, and so is
        // the separator left over from a stripped suffix.
        let body = body.trim_start_matches('/').trim_end_matches('/');

        tracing::debug!(input, normalized = body, "pattern");

        if body.is_empty() {
            return Err(invalid(&raw, "no path segments left after normalization"));
        }

        let segs: Vec<&str> = body.split('/').collect();
        let mut star_index = None;
        for (idx, seg) in segs.iter().enumerate() {
            if *seg == "**" {
                if star_index.is_some() {
                    return Err(invalid(&raw, "at most one ** segment may appear"));
                }
                if idx == segs.len() - 1 {
                    return Err(invalid(&raw, "** may not be the final segment"));
                }
                star_index = Some(idx);
            } else if seg.contains("**") {
                return Err(invalid(&raw, "** may not appear inside a segment"));
            }
        }

        let compile = |parts: &[&str]| -> Result<Vec<glob::Pattern>> {
            parts
                .iter()
                .map(|s| glob::Pattern::new(s).map_err(|e| invalid(&raw, e.msg)))
                .collect()
        };

        let kind = match star_index {
            None => PatternKind::Simple {
                segments: compile(&segs)?,
            },
            Some(k) => PatternKind::WithDoubleStar {
                before: compile(&segs[..k])?,
                after: compile(&segs[k + 1..])?,
            },
        };

        Ok(Pattern {
            raw,
            dir_only,
            kind,
        })
    }

    /// The input text the pattern was parsed from, whitespace-trimmed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_dir_only(&self) -> bool {
        self.dir_only
    }

    /// Decide membership of a path given as segments plus a directory flag.
    pub fn matches(&self, path: &[String], is_dir: bool) -> Match {
        match &self.kind {
            PatternKind::Simple { segments } => {
                simple_match(path, is_dir, segments, self.dir_only)
            }
            PatternKind::WithDoubleStar { before, after } => {
                double_star_match(path, is_dir, before, after, self.dir_only)
            }
        }
    }
}

fn invalid(pattern: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

fn seg_matches(seg: &glob::Pattern, name: &str) -> bool {
    seg.matches_with(name, MATCH_OPTIONS)
}

/// Match a directory path against a segment list.
///
/// `In` when every segment matches and the path is at least as long;
/// `DirDive` when the path is a matching proper prefix of the segments.
fn prefix_match(path: &[String], segs: &[glob::Pattern]) -> Match {
    if path.len() >= segs.len() {
        for (name, seg) in path.iter().zip(segs) {
            if !seg_matches(seg, name) {
                return Match::Out;
            }
        }
        Match::In
    } else {
        for (name, seg) in path.iter().zip(segs) {
            if !seg_matches(seg, name) {
                return Match::Out;
            }
        }
        Match::DirDive
    }
}

fn simple_match(path: &[String], is_dir: bool, segs: &[glob::Pattern], dir_only: bool) -> Match {
    if is_dir {
        return prefix_match(path, segs);
    }
    if dir_only {
        // A file is in iff its directory is.
        let Some((_, dir)) = path.split_last() else {
            return Match::Out;
        };
        return if prefix_match(dir, segs) == Match::In {
            Match::In
        } else {
            Match::Out
        };
    }
    if path.len() < segs.len() {
        return Match::Out;
    }
    prefix_match(path, segs)
}

fn double_star_match(
    path: &[String],
    is_dir: bool,
    before: &[glob::Pattern],
    after: &[glob::Pattern],
    dir_only: bool,
) -> Match {
    let k = before.len();
    let head = &path[..k.min(path.len())];
    match prefix_match(head, before) {
        Match::Out => Match::Out,
        Match::DirDive => {
            if is_dir && path.len() <= k {
                Match::DirDive
            } else {
                Match::Out
            }
        }
        Match::In => {
            if after.is_empty() {
                return Match::In;
            }
            // The ** consumes zero or more levels: try the tail pattern at
            // every remaining anchor.
            let rest = &path[k..];
            if rest.len() >= after.len() {
                for start in 0..=(rest.len() - after.len()) {
                    if simple_match(&rest[start..], is_dir, after, dir_only) == Match::In {
                        return Match::In;
                    }
                }
            }
            if is_dir {
                Match::DirDive
            } else {
                Match::Out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('/').map(str::to_string).collect()
    }

    fn check(pattern: &str, p: &str, is_dir: bool) -> Match {
        Pattern::parse(pattern).unwrap().matches(&path(p), is_dir)
    }

    // ── Parsing ──

    #[test]
    fn rejects_empty_and_slash_only() {
        assert!(Pattern::parse("").is_err());
        assert!(Pattern::parse("   ").is_err());
        assert!(Pattern::parse("/").is_err());
        assert!(Pattern::parse("**").is_err());
        assert!(Pattern::parse("**/").is_err());
    }

    #[test]
    fn rejects_double_star_inside_segment() {
        assert!(Pattern::parse("a/b**c/d").is_err());
        assert!(Pattern::parse("a/**x").is_err());
    }

    #[test]
    fn rejects_multiple_double_stars() {
        assert!(Pattern::parse("a/**/b/**/c").is_err());
    }

    #[test]
    fn rejects_malformed_glob_segment() {
        assert!(Pattern::parse("src/[abc").is_err());
    }

    #[test]
    fn trailing_double_star_is_dropped_without_dir_only() {
        let p = Pattern::parse("src/**").unwrap();
        assert!(!p.is_dir_only());
        assert_eq!(p.matches(&path("src/a.go"), false), Match::In);
        assert_eq!(p.matches(&path("src"), true), Match::In);
    }

    #[test]
    fn trailing_slash_sets_dir_only() {
        let p = Pattern::parse("docs/").unwrap();
        assert!(p.is_dir_only());
    }

    #[test]
    fn leading_slash_is_removed() {
        assert_eq!(check("/LICENSE", "LICENSE", false), Match::In);
    }

    // ── Simple matching ──

    #[test]
    fn root_literal_matches_only_at_root() {
        assert_eq!(check("LICENSE", "LICENSE", false), Match::In);
        assert_eq!(check("LICENSE", "sub/LICENSE", false), Match::Out);
    }

    #[test]
    fn file_under_matching_prefix_is_in() {
        assert_eq!(check("src", "src/deep/a.go", false), Match::In);
        assert_eq!(check("src", "src", true), Match::In);
    }

    #[test]
    fn shorter_dir_path_dives() {
        assert_eq!(check("a/b/c", "a", true), Match::DirDive);
        assert_eq!(check("a/b/c", "a/b", true), Match::DirDive);
        assert_eq!(check("a/b/c", "a/x", true), Match::Out);
    }

    #[test]
    fn file_shorter_than_pattern_is_out() {
        assert_eq!(check("a/b/c", "a/b", false), Match::Out);
    }

    #[test]
    fn dir_only_includes_files_inside_only() {
        assert_eq!(check("docs/", "docs/x.md", false), Match::In);
        assert_eq!(check("docs/", "docs/sub/x.md", false), Match::In);
        assert_eq!(check("docs/", "docs", false), Match::Out);
        assert_eq!(check("docs/", "docs", true), Match::In);
    }

    #[test]
    fn glob_segments_match_within_one_level() {
        assert_eq!(check("src/*.go", "src/a.go", false), Match::In);
        assert_eq!(check("src/*.go", "src/sub/a.go", false), Match::In);
        assert_eq!(check("src/*.go", "src/a.rs", false), Match::Out);
        assert_eq!(check("?.txt", "a.txt", false), Match::In);
        assert_eq!(check("[ab].txt", "c.txt", false), Match::Out);
    }

    // ── Double-star matching ──

    #[test]
    fn double_star_spans_levels() {
        let p = "plumbing/**/*.go";
        assert_eq!(check(p, "plumbing/a.go", false), Match::In);
        assert_eq!(check(p, "plumbing/x/y/a.go", false), Match::In);
        assert_eq!(check(p, "plumbing/x/y/a.rs", false), Match::Out);
        assert_eq!(check(p, "other/a.go", false), Match::Out);
    }

    #[test]
    fn double_star_dir_results() {
        let p = "plumbing/**/*.go";
        assert_eq!(check(p, "plumbing", true), Match::DirDive);
        assert_eq!(check(p, "plumbing/x/y", true), Match::DirDive);
        assert_eq!(check(p, "other", true), Match::Out);
    }

    #[test]
    fn leading_double_star_matches_any_depth() {
        assert_eq!(check("**/LICENSE", "LICENSE", false), Match::In);
        assert_eq!(check("**/LICENSE", "a/b/LICENSE", false), Match::In);
        assert_eq!(check("**/LICENSE", "a/b", true), Match::DirDive);
        assert_eq!(check("**/LICENSE", "a/LICENSE/b", false), Match::Out);
    }

    #[test]
    fn double_star_with_dir_only_tail() {
        let p = "a/**/b/";
        assert_eq!(check(p, "a/x/b/f.txt", false), Match::In);
        assert_eq!(check(p, "a/b/f.txt", false), Match::In);
        assert_eq!(check(p, "a/x/f.txt", false), Match::Out);
    }

    #[test]
    fn double_star_prefix_mismatch_is_out() {
        assert_eq!(check("a/b/**/c", "a", true), Match::DirDive);
        assert_eq!(check("a/b/**/c", "a/x", true), Match::Out);
        assert_eq!(check("a/b/**/c", "a/f", false), Match::Out);
    }

    #[test]
    fn directory_named_like_tail_includes_subtree() {
        // A directory matching the tail glob is itself in.
        assert_eq!(check("a/**/*.go", "a/x/pkg.go", true), Match::In);
    }
}
