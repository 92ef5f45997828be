//! Path parsing for mounting-tree lookups.
//!
//! Resolves `.`/`..` segments and detects "fully-qualified" requests: a
//! leading `name:/` stem naming a specific mount, a leading separator, a
//! Windows-style drive letter, or a `..` that underflows the segment
//! stack (more `..` than preceding segments to cancel).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// Resolve by walking mounts in priority order and matching hashed
    /// path-segment prefixes.
    Normal,
    /// Resolve directly against a single mount (or the default mount),
    /// bypassing priority matching entirely.
    FullyQualified {
        /// `Some(id)` when a `name:/` stem names an integer mount id;
        /// `None` for a leading separator, a non-integer stem (e.g. a
        /// Windows drive letter), or a `..` underflow.
        mount_id: Option<u64>,
        /// The text to hand to the target filesystem's `try_translate`.
        remainder: String,
    },
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Splits `request` into normalized path segments and classifies it.
#[must_use]
pub fn configure(request: &str) -> (Vec<String>, PathKind) {
    // Look for a "stem:/" prefix occurring before any path separator.
    let mut stem_end_byte = None;
    for (idx, ch) in request.char_indices() {
        if ch == ':' {
            let after = idx + ch.len_utf8();
            if let Some(next) = request[after..].chars().next() {
                if is_separator(next) {
                    stem_end_byte = Some((idx, after + next.len_utf8()));
                }
            }
            break;
        }
        if is_separator(ch) {
            break;
        }
    }

    if let Some((stem_end, body_start)) = stem_end_byte {
        let stem = &request[..stem_end];
        let mount_id = stem.parse::<u64>().ok();
        return (
            Vec::new(),
            PathKind::FullyQualified {
                mount_id,
                remainder: request[body_start..].to_string(),
            },
        );
    }

    let leading_separator = request.chars().next().is_some_and(is_separator);

    let mut segments: Vec<String> = Vec::new();
    let mut underflowed = false;
    for part in request.split(is_separator) {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            if segments.pop().is_none() {
                underflowed = true;
            }
            continue;
        }
        segments.push(part.to_string());
    }

    if leading_separator || underflowed {
        (
            segments,
            PathKind::FullyQualified {
                mount_id: None,
                remainder: request.to_string(),
            },
        )
    } else {
        (segments, PathKind::Normal)
    }
}

/// Normalizes a mount point into its path segments (no `.`/`..` handling
/// is needed here: mount points are not expected to contain them).
#[must_use]
pub fn mount_point_segments(mount_point: &str) -> Vec<String> {
    mount_point
        .split(is_separator)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_path_splits_segments() {
        let (segments, kind) = configure("one/two/three.txt");
        assert_eq!(segments, vec!["one", "two", "three.txt"]);
        assert_eq!(kind, PathKind::Normal);
    }

    #[test]
    fn dot_segments_are_dropped() {
        let (segments, kind) = configure("one/./two/three.txt");
        assert_eq!(segments, vec!["one", "two", "three.txt"]);
        assert_eq!(kind, PathKind::Normal);
    }

    #[test]
    fn dot_dot_cancels_preceding_segment() {
        let (segments, kind) = configure("one/two/../three.txt");
        assert_eq!(segments, vec!["one", "three.txt"]);
        assert_eq!(kind, PathKind::Normal);
    }

    #[test]
    fn leading_dot_dot_underflows_to_fully_qualified() {
        let (_, kind) = configure("../escape.txt");
        assert!(matches!(
            kind,
            PathKind::FullyQualified {
                mount_id: None,
                ..
            }
        ));
    }

    #[test]
    fn leading_separator_is_fully_qualified() {
        let (_, kind) = configure("/abs/path.txt");
        assert!(matches!(
            kind,
            PathKind::FullyQualified {
                mount_id: None,
                ..
            }
        ));
    }

    #[test]
    fn named_mount_stem_is_fully_qualified_with_id() {
        let (_, kind) = configure("7:/inner/path.txt");
        match kind {
            PathKind::FullyQualified {
                mount_id: Some(id),
                remainder,
            } => {
                assert_eq!(id, 7);
                assert_eq!(remainder, "inner/path.txt");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn windows_drive_is_fully_qualified_default() {
        let (_, kind) = configure("C:/Windows/file.txt");
        assert!(matches!(
            kind,
            PathKind::FullyQualified {
                mount_id: None,
                ..
            }
        ));
    }
}
