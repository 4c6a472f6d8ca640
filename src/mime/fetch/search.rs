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

//! Text search over message content, for `SEARCH TEXT` and friends.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};

use super::super::grovel::{MimePart, PartChildren};
use super::super::header;
use super::super::quoted_printable::qp_decode;
use super::super::MessageContent;

impl MessageContent {
    /// Return whether `needle` occurs, ignoring case, in any header field
    /// (including headers of nested parts) or in the decoded text of any
    /// `text/*` part.
    ///
    /// Header fields are matched in the form `Name: decoded value`.
    pub fn contains(&self, needle: &[u8]) -> bool {
        let needle = String::from_utf8_lossy(needle).to_lowercase();
        if needle.is_empty() {
            return true;
        }

        part_contains(&self.raw, &self.root, &needle)
    }
}

fn part_contains(raw: &[u8], part: &MimePart, needle: &str) -> bool {
    for field in &part.fields {
        let value = header::decode_unstructured(&raw[field.value.clone()]);
        let text = format!("{}: {}", field.name, value).to_lowercase();
        if text.contains(needle) {
            return true;
        }
    }

    match part.children {
        PartChildren::Multipart(ref children) => {
            children.iter().any(|c| part_contains(raw, c, needle))
        }
        PartChildren::Message(ref inner) => part_contains(raw, inner, needle),
        PartChildren::None if part.content_type.is_type("text") => {
            decode_text(raw, part).to_lowercase().contains(needle)
        }
        PartChildren::None => false,
    }
}

/// Undo the transfer encoding and charset of a leaf part.
fn decode_text<'a>(raw: &'a [u8], part: &MimePart) -> Cow<'a, str> {
    let body = &raw[part.body.clone()];

    let cte = part
        .field("Content-Transfer-Encoding")
        .map(|f| {
            String::from_utf8_lossy(&raw[f.value.clone()])
                .trim()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();

    let decoded: Cow<[u8]> = match &cte[..] {
        "base64" => {
            let stripped: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            match base64::decode(&stripped) {
                Ok(d) => Cow::Owned(d),
                Err(_) => Cow::Borrowed(body),
            }
        }
        "quoted-printable" => qp_decode(body),
        _ => Cow::Borrowed(body),
    };

    let encoding = part
        .content_type
        .parm("charset")
        .and_then(|cs| Encoding::for_label(cs.as_bytes()))
        .unwrap_or(UTF_8);

    match decoded {
        Cow::Borrowed(b) => encoding.decode_with_bom_removal(b).0,
        Cow::Owned(b) => {
            Cow::Owned(encoding.decode_with_bom_removal(&b).0.into_owned())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(s: &str) -> MessageContent {
        MessageContent::parse(s.replace('\n', "\r\n").into_bytes()).unwrap()
    }

    #[test]
    fn searches_headers_and_text() {
        let m = parse(
            "\
Subject: =?UTF-8?B?SGVsbG8gV29ybGQ=?=
From: someone@example.com
Content-Type: multipart/mixed; boundary=b

--b
Content-Type: text/plain; charset=iso-8859-1
Content-Transfer-Encoding: quoted-printable

Caf=E9 au lait
--b
Content-Type: text/html; charset=utf-8
Content-Transfer-Encoding: base64

PHA+U2VjcmV0IHJl
Y2lwZTwvcD4=
--b
Content-Type: application/octet-stream

binary needle
--b--
",
        );

        assert!(m.contains(b"hello world"));
        assert!(m.contains(b"subject: hello"));
        assert!(m.contains(b"SOMEONE@EXAMPLE"));
        assert!(m.contains("CAFÉ".as_bytes()));
        assert!(m.contains(b"secret recipe"));
        assert!(m.contains(b""));
        // Non-text parts are not searched
        assert!(!m.contains(b"binary needle"));
        // Encoded forms don't match
        assert!(!m.contains(b"SGVsbG8"));
        assert!(!m.contains(b"caf=e9"));
        assert!(!m.contains(b"absent"));
    }

    #[test]
    fn searches_encapsulated_messages() {
        let m = parse(
            "\
Content-Type: message/rfc822

Subject: forwarded thing

The inner text
",
        );

        assert!(m.contains(b"forwarded"));
        assert!(m.contains(b"inner TEXT"));
    }

    #[test]
    fn unknown_charset_falls_back_to_utf8() {
        let m = parse(
            "Content-Type: text/plain; charset=x-nonsense\n\nnaïve text\n",
        );
        assert!(m.contains("NAÏVE".as_bytes()));
    }
}
