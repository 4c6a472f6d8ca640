//-
// Copyright (c) 2020, 2022, 2023, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use super::error::Error;

/// The hierarchy delimiter of mailbox names.
pub const DELIMITER: char = '/';

/// Determine whether `name` is safe as a single component of a mailbox name.
///
/// Components end up as keys in the mailbox registry and, for the file system
/// backend, inside file names, so this excludes empty names, leading dots,
/// path separators, control characters, and characters with special meaning
/// in IMAP (`*`, `%`, and a leading `#`).
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('#')
        && !name.contains(DELIMITER)
        && !name.contains('\\')
        && !name.contains(|c| c < ' ' || c == '\x7F')
        && !name.contains(|c| c == '*' || c == '%')
}

/// Split a full hierarchical mailbox name into its components, returning
/// `None` if any component is unsafe.
///
/// Leading and trailing delimiters are tolerated (`Work/` names the same
/// mailbox as `Work`), but empty components elsewhere are not.
pub fn split_mailbox_name(name: &str) -> Option<Vec<&str>> {
    let trimmed = name.trim_matches(DELIMITER);
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.split(DELIMITER).collect();
    if parts.iter().all(|p| is_safe_name(p)) {
        Some(parts)
    } else {
        None
    }
}

/// Canonicalise a full mailbox name: components are separated by single
/// delimiters and a leading `INBOX` (in any case) is spelt `INBOX`.
///
/// Fails with `UnsafeName` if `split_mailbox_name` rejects the name.
pub fn canonical_mailbox_name(name: &str) -> Result<String, Error> {
    let mut parts = split_mailbox_name(name).ok_or(Error::UnsafeName)?;
    if "inbox".eq_ignore_ascii_case(parts[0]) {
        parts[0] = "INBOX";
    }
    Ok(parts.join("/"))
}

/// Build a predicate matching canonical mailbox names against any of
/// `patterns`, with `*` and `%` interpreted as per RFC 3501.
///
/// A leading `INBOX` in a pattern matches case-insensitively, like the
/// mailbox itself.
pub fn mailbox_name_matcher<'a>(
    patterns: impl IntoIterator<Item = &'a str>,
) -> impl Fn(&str) -> bool {
    let mut rx = "^(".to_owned();
    for (pattern_ix, pattern) in patterns.into_iter().enumerate() {
        if pattern_ix > 0 {
            rx.push('|');
        }

        let parts = pattern
            .split(DELIMITER)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(ix, s)| {
                if 0 == ix && "inbox".eq_ignore_ascii_case(s) {
                    "INBOX"
                } else {
                    s
                }
            });
        for (part_ix, part) in parts.enumerate() {
            if part_ix > 0 {
                rx.push(DELIMITER);
            }

            let mut start = 0;
            for end in part
                .match_indices(|c| '%' == c || '*' == c)
                .map(|(ix, _)| ix)
                .chain(part.len()..=part.len())
            {
                rx.push_str(&regex::escape(&part[start..end]));
                start = (end + 1).min(part.len());

                match part.get(end..end + 1) {
                    Some("*") => rx.push_str(".*"),
                    Some("%") => rx.push_str("[^/]*"),
                    _ => (),
                }
            }
        }
    }
    rx.push_str(")$");

    // Every literal went through `regex::escape`, so this only fails if the
    // pattern is so large it exceeds the regex size limit; such a pattern
    // matches nothing.
    let rx = regex::Regex::new(&rx).ok();
    move |s| rx.as_ref().map_or(false, |rx| rx.is_match(s))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_safe_name() {
        assert!(is_safe_name("foo"));
        assert!(is_safe_name("Entwürfe"));
        assert!(is_safe_name("郵便"));
        assert!(is_safe_name("folder #1"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name(".hidden"));
        assert!(!is_safe_name("foo/bar"));
        assert!(!is_safe_name("foo\\bar"));
        assert!(!is_safe_name("#news"));
        assert!(!is_safe_name("foo\r"));
        assert!(!is_safe_name("fo\x7Fo"));
        assert!(!is_safe_name("foo*bar"));
        assert!(!is_safe_name("foo%bar"));
    }

    #[test]
    fn test_split_mailbox_name() {
        assert_eq!(Some(vec!["INBOX"]), split_mailbox_name("INBOX"));
        assert_eq!(
            Some(vec!["Work", "Projects"]),
            split_mailbox_name("Work/Projects")
        );
        assert_eq!(Some(vec!["Work"]), split_mailbox_name("/Work/"));
        assert_eq!(None, split_mailbox_name("Work//Projects"));
        assert_eq!(None, split_mailbox_name("Work/../etc"));
        assert_eq!(None, split_mailbox_name("/"));
        assert_eq!(None, split_mailbox_name(""));
    }

    #[test]
    fn test_canonical_mailbox_name() {
        assert_eq!("INBOX", canonical_mailbox_name("inbox").unwrap());
        assert_eq!("INBOX/Sub", canonical_mailbox_name("InBox/Sub/").unwrap());
        assert_eq!("Work/InBox", canonical_mailbox_name("Work/InBox").unwrap());
        assert_matches!(Err(Error::UnsafeName), canonical_mailbox_name("a//b"));
    }

    #[test]
    fn test_mailbox_name_matcher() {
        fn matches(pat: &str, mb: &str) -> bool {
            mailbox_name_matcher(Some(pat))(mb)
        }

        assert!(matches("*", "INBOX"));
        assert!(matches("%", "INBOX"));
        assert!(matches("inbox", "INBOX"));

        assert!(matches("INB*X", "INB/BOX"));
        assert!(!matches("INB*X", "INBOX/plugh"));
        assert!(!matches("INB%X", "INB/BOX"));

        assert!(matches("Work/*", "Work/a/b"));
        assert!(!matches("Work/*", "Work"));
        assert!(matches("Work/%", "Work/a"));
        assert!(!matches("Work/%", "Work/a/b"));
        assert!(!matches("Work", "Work/a"));
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));

        let either = mailbox_name_matcher(vec!["Sent", "Tr%"]);
        assert!(either("Sent"));
        assert!(either("Trash"));
        assert!(!either("Drafts"));
    }
}
