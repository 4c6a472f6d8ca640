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

//! Builds the content tree of a message.
//!
//! The whole message is in memory, so rather than copying anything, every
//! node of the tree refers back into the raw message by byte range.

use std::ops::Range;
use std::str;

use super::header::{self, ContentType};
use crate::support::error::Error;

const MAX_RECURSION: u32 = 20;
const MAX_PARTS: u32 = 1000;

/// One header field of a part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField {
    /// The field name, as written (minus surrounding whitespace).
    pub name: String,
    /// The whole field, including continuation lines and the final line
    /// ending.
    pub raw: Range<usize>,
    /// The raw (still folded) value after the colon, excluding the final line
    /// ending.
    pub value: Range<usize>,
}

/// The nested content of a part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartChildren {
    /// A leaf part, or a composite part that was not descended into.
    None,
    /// The parts of a `multipart/*` body.
    Multipart(Vec<MimePart>),
    /// The message encapsulated by a `message/rfc822` body.
    Message(Box<MimePart>),
}

/// A node of the content tree.
///
/// The top-level message is itself a `MimePart`, whose header block is the
/// message header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimePart {
    /// The header block, including the blank line that terminates it (if
    /// there was one).
    pub header: Range<usize>,
    pub fields: Vec<HeaderField>,
    pub content_type: ContentType,
    /// The content of this part, exclusive of its header block.
    pub body: Range<usize>,
    /// The number of lines in `body`.
    pub lines: u64,
    pub children: PartChildren,
}

impl MimePart {
    /// Find the first header field with the given name.
    pub fn field(&self, name: &str) -> Option<&HeaderField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Parse `raw` into a content tree.
///
/// The top-level header block is parsed strictly: a line in it that is
/// neither a header field nor a continuation line makes the whole message
/// malformed. Nested parts are parsed leniently since clients must be able to
/// fetch whatever made it into the mailbox.
pub fn grovel(raw: &[u8]) -> Result<MimePart, Error> {
    if raw.is_empty() {
        return Err(Error::MalformedMessage("empty message".to_owned()));
    }

    let mut groveller = Groveller { raw, part_count: 0 };
    groveller.part(0..raw.len(), &ContentType::text_plain(), 0, true)
}

struct Groveller<'a> {
    raw: &'a [u8],
    part_count: u32,
}

impl<'a> Groveller<'a> {
    fn line_end(&self, pos: usize, end: usize) -> usize {
        memchr::memchr(b'\n', &self.raw[pos..end])
            .map(|ix| pos + ix + 1)
            .unwrap_or(end)
    }

    /// Returns `end` moved back over one trailing line ending, but never
    /// before `start`.
    fn strip_line_ending(&self, start: usize, end: usize) -> usize {
        let mut end = end;
        if end > start && b'\n' == self.raw[end - 1] {
            end -= 1;
            if end > start && b'\r' == self.raw[end - 1] {
                end -= 1;
            }
        }
        end
    }

    fn part(
        &mut self,
        range: Range<usize>,
        default_content_type: &ContentType,
        depth: u32,
        strict: bool,
    ) -> Result<MimePart, Error> {
        let (fields, body_start) = self.headers(range.clone(), strict)?;

        // Extra Content-Type headers are ignored
        let content_type = fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case("Content-Type"))
            .and_then(|f| {
                header::parse_content_type(&self.raw[f.value.clone()])
            })
            .unwrap_or_else(|| default_content_type.clone());

        let body = body_start..range.end;
        let lines =
            memchr::memchr_iter(b'\n', &self.raw[body.clone()]).count() as u64;

        let descend = depth < MAX_RECURSION && self.part_count < MAX_PARTS;
        let children = if descend && content_type.is_type("multipart") {
            match content_type.parm("boundary") {
                Some(boundary) => {
                    let child_default = if content_type.is_subtype("digest") {
                        ContentType::message_rfc822()
                    } else {
                        ContentType::text_plain()
                    };
                    PartChildren::Multipart(self.multipart(
                        body.clone(),
                        boundary.as_bytes(),
                        &child_default,
                        depth,
                    )?)
                }
                None => PartChildren::None,
            }
        } else if descend
            && content_type.is_type("message")
            && content_type.is_subtype("rfc822")
        {
            self.part_count += 1;
            PartChildren::Message(Box::new(self.part(
                body.clone(),
                &ContentType::text_plain(),
                depth + 1,
                false,
            )?))
        } else {
            PartChildren::None
        };

        Ok(MimePart {
            header: range.start..body_start,
            fields,
            content_type,
            body,
            lines,
            children,
        })
    }

    /// Scan the header block at the start of `range`.
    ///
    /// Returns the fields and the offset at which the body starts.
    fn headers(
        &self,
        range: Range<usize>,
        strict: bool,
    ) -> Result<(Vec<HeaderField>, usize), Error> {
        let mut fields: Vec<HeaderField> = Vec::new();
        let mut pos = range.start;

        while pos < range.end {
            let line_end = self.line_end(pos, range.end);
            let line = &self.raw[pos..line_end];

            if b"\r\n" == line || b"\n" == line {
                return Ok((fields, line_end));
            }

            if b' ' == line[0] || b'\t' == line[0] {
                if let Some(last) = fields.last_mut() {
                    last.raw.end = line_end;
                    last.value.end = self.strip_line_ending(pos, line_end);
                } else if strict {
                    return Err(Error::MalformedMessage(
                        "continuation line before first header".to_owned(),
                    ));
                }
            } else if let Some(field) = self.field(pos, line_end) {
                fields.push(field);
            } else if strict {
                return Err(Error::MalformedMessage(format!(
                    "bad header line: {}",
                    String::from_utf8_lossy(&line[..line.len().min(40)])
                        .trim_end()
                )));
            } else {
                // Body without a separating blank line
                return Ok((fields, pos));
            }

            pos = line_end;
        }

        Ok((fields, range.end))
    }

    fn field(&self, start: usize, end: usize) -> Option<HeaderField> {
        let line = &self.raw[start..end];
        let colon = memchr::memchr(b':', line)?;
        let name = str::from_utf8(&line[..colon]).ok()?.trim_end();
        if name.is_empty() || !name.bytes().all(|b| b > b' ' && b < 127) {
            return None;
        }

        Some(HeaderField {
            name: name.to_owned(),
            raw: start..end,
            value: start + colon + 1..self.strip_line_ending(start, end),
        })
    }

    fn multipart(
        &mut self,
        body: Range<usize>,
        boundary: &[u8],
        default_content_type: &ContentType,
        depth: u32,
    ) -> Result<Vec<MimePart>, Error> {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary);

        let mut children = Vec::new();
        let mut part_start: Option<usize> = None;
        let mut pos = body.start;

        while pos < body.end {
            let line_end = self.line_end(pos, body.end);
            let line = &self.raw[pos..line_end];

            if line.starts_with(&delimiter) {
                let tail = &line[delimiter.len()..];
                let is_final = tail.starts_with(b"--");
                let tail = if is_final { &tail[2..] } else { tail };

                // Only transport padding may follow the delimiter
                if tail.iter().all(|&b| b" \t\r\n".contains(&b)) {
                    if let Some(start) = part_start.take() {
                        // The line ending before the delimiter belongs to the
                        // delimiter, not the part.
                        let end = self.strip_line_ending(start, pos);
                        if !self.child(
                            &mut children,
                            start..end,
                            default_content_type,
                            depth,
                        )? {
                            return Ok(children);
                        }
                    }

                    if is_final {
                        return Ok(children);
                    }

                    part_start = Some(line_end);
                }
            }

            pos = line_end;
        }

        // Unterminated multipart; the last part runs to the end
        if let Some(start) = part_start {
            self.child(
                &mut children,
                start..body.end,
                default_content_type,
                depth,
            )?;
        }

        Ok(children)
    }

    /// Parse one child part into `children`. Returns `false` if the part limit
    /// has been reached.
    fn child(
        &mut self,
        children: &mut Vec<MimePart>,
        range: Range<usize>,
        default_content_type: &ContentType,
        depth: u32,
    ) -> Result<bool, Error> {
        if self.part_count >= MAX_PARTS {
            return Ok(false);
        }

        self.part_count += 1;
        children.push(self.part(
            range,
            default_content_type,
            depth + 1,
            false,
        )?);
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn crlf(s: &str) -> Vec<u8> {
        s.replace('\n', "\r\n").into_bytes()
    }

    fn slice<'a>(raw: &'a [u8], range: &Range<usize>) -> &'a str {
        str::from_utf8(&raw[range.clone()]).unwrap()
    }

    #[test]
    fn simple_message() {
        let raw = crlf(
            "\
From: foo@bar.com
Subject: Hello
 world
Content-Type: text/plain; charset=utf-8

Line one
Line two
",
        );
        let root = grovel(&raw).unwrap();
        assert_eq!(3, root.fields.len());
        assert_eq!("Subject", root.fields[1].name);
        assert_eq!(" Hello\r\n world", slice(&raw, &root.fields[1].value));
        assert_eq!(
            "Subject: Hello\r\n world\r\n",
            slice(&raw, &root.fields[1].raw)
        );
        assert_eq!(Some("utf-8"), root.content_type.parm("charset"));
        assert_eq!("Line one\r\nLine two\r\n", slice(&raw, &root.body));
        assert_eq!(2, root.lines);
        assert!(slice(&raw, &root.header).ends_with("utf-8\r\n\r\n"));
        assert_eq!(PartChildren::None, root.children);
    }

    #[test]
    fn headers_only() {
        let raw = crlf("Subject: nothing else\n");
        let root = grovel(&raw).unwrap();
        assert_eq!(1, root.fields.len());
        assert!(root.body.is_empty());
        assert_eq!(ContentType::text_plain(), root.content_type);
    }

    #[test]
    fn malformed_top_level() {
        assert_matches!(Err(Error::MalformedMessage(_)), grovel(b""));
        assert_matches!(
            Err(Error::MalformedMessage(_)),
            grovel(b"this is not a header\r\n\r\nbody")
        );
        assert_matches!(
            Err(Error::MalformedMessage(_)),
            grovel(b" continuation: first\r\n\r\nbody")
        );
        assert_matches!(
            Err(Error::MalformedMessage(_)),
            grovel(b"Bad Name: x\r\n\r\nbody")
        );
    }

    #[test]
    fn multipart_message() {
        let raw = crlf(
            "\
Content-Type: multipart/mixed; boundary=bound

preamble
--bound
Content-Type: text/plain

part one
--bound

part two
--bound
Content-Type: message/rfc822

Subject: inner

inner body
--bound--
epilogue
",
        );
        let root = grovel(&raw).unwrap();
        let children = match root.children {
            PartChildren::Multipart(ref c) => c,
            ref c => panic!("unexpected children: {:?}", c),
        };
        assert_eq!(3, children.len());
        assert_eq!("part one", slice(&raw, &children[0].body));
        assert_eq!("part two", slice(&raw, &children[1].body));
        assert!(children[1].fields.is_empty());
        assert_eq!(ContentType::text_plain(), children[1].content_type);

        let inner = match children[2].children {
            PartChildren::Message(ref m) => m,
            ref c => panic!("unexpected children: {:?}", c),
        };
        assert_eq!("Subject", inner.fields[0].name);
        assert_eq!("inner body", slice(&raw, &inner.body));
    }

    #[test]
    fn digest_defaults_to_message() {
        let raw = crlf(
            "\
Content-Type: multipart/digest; boundary=d

--d

Subject: one

body
--d--
",
        );
        let root = grovel(&raw).unwrap();
        match root.children {
            PartChildren::Multipart(ref c) => {
                assert_eq!(ContentType::message_rfc822(), c[0].content_type);
                assert_matches!(PartChildren::Message(_), &c[0].children);
            }
            ref c => panic!("unexpected children: {:?}", c),
        }
    }

    #[test]
    fn unterminated_multipart() {
        let raw = crlf(
            "\
Content-Type: multipart/alternative; boundary=b

--b

one
--b

two
",
        );
        let root = grovel(&raw).unwrap();
        match root.children {
            PartChildren::Multipart(ref c) => {
                assert_eq!(2, c.len());
                assert_eq!("two\r\n", slice(&raw, &c[1].body));
            }
            ref c => panic!("unexpected children: {:?}", c),
        }
    }

    #[test]
    fn multipart_without_boundary_is_leaf() {
        let raw = crlf("Content-Type: multipart/mixed\n\n--x\n\nfoo\n");
        assert_eq!(PartChildren::None, grovel(&raw).unwrap().children);
    }

    #[test]
    fn recursion_is_limited() {
        let mut raw = String::new();
        for _ in 0..30 {
            raw.push_str("Content-Type: message/rfc822\r\n\r\n");
        }
        raw.push_str("Subject: deepest\r\n\r\nbody\r\n");

        let mut part = grovel(raw.as_bytes()).unwrap();
        let mut depth = 0;
        while let PartChildren::Message(inner) = part.children {
            part = *inner;
            depth += 1;
        }
        assert_eq!(MAX_RECURSION, depth);
    }

    proptest! {
        #[test]
        fn grovel_never_panics(s in prop::collection::vec(any::<u8>(), 0..200)) {
            let _ = grovel(&s);
        }

        #[test]
        fn nested_parts_stay_in_bounds(
            body in "[a-z\r\n-]{0,100}"
        ) {
            let raw = format!(
                "Content-Type: multipart/mixed; boundary=-\r\n\r\n{}",
                body
            );
            let root = grovel(raw.as_bytes()).unwrap();
            if let PartChildren::Multipart(children) = root.children {
                for child in children {
                    prop_assert!(child.body.start <= child.body.end);
                    prop_assert!(child.body.end <= raw.len());
                    prop_assert!(child.header.end == child.body.start);
                }
            }
        }
    }
}
