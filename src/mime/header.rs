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

//! Parsers for the handful of header fields the mailbox layer needs to
//! understand.
//!
//! These are all lenient: anything that can't be parsed yields `None` or an
//! empty list rather than an error, since messages are accepted regardless of
//! how badly their headers are formed.

use std::borrow::Cow;
use std::str;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    combinator::map,
    error::ErrorKind,
    multi::many0,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use super::encoded_word::decode_words;

/// A parsed `Content-Type` header.
///
/// The type and subtype are always lower-case. Parameter names are
/// lower-case; values are as written, minus quoting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(typ: &str, subtype: &str) -> Self {
        ContentType {
            typ: typ.to_owned(),
            subtype: subtype.to_owned(),
            parms: vec![],
        }
    }

    pub fn text_plain() -> Self {
        ContentType::new("text", "plain")
    }

    pub fn message_rfc822() -> Self {
        ContentType::new("message", "rfc822")
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is_subtype(&self, subtype: &str) -> bool {
        self.subtype.eq_ignore_ascii_case(subtype)
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms
            .iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }
}

/// A parsed `Content-Disposition` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub parms: Vec<(String, String)>,
}

fn is_ws(b: u8) -> bool {
    b' ' == b || b'\t' == b || b'\r' == b || b'\n' == b
}

fn is_token_char(b: u8) -> bool {
    b > b' ' && b < 127 && !b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn ws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_ws)(i)
}

fn token(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(ws, take_while1(is_token_char), ws)(i)
}

fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (mut i, _) = preceded(ws, tag("\""))(i)?;
    let mut out = Vec::new();
    loop {
        match i.split_first() {
            None => return Err(nom::Err::Error((i, ErrorKind::Char))),
            Some((b'"', rest)) => {
                let (rest, _) = ws(rest)?;
                return Ok((rest, out));
            }
            Some((b'\\', rest)) if !rest.is_empty() => {
                out.push(rest[0]);
                i = &rest[1..];
            }
            Some((&b, rest)) => {
                out.push(b);
                i = rest;
            }
        }
    }
}

fn parm_value(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    alt((quoted_string, map(token, |t: &[u8]| t.to_vec())))(i)
}

fn parameter(i: &[u8]) -> IResult<&[u8], (&[u8], Vec<u8>)> {
    preceded(tag(";"), separated_pair(token, tag("="), parm_value))(i)
}

fn content_type(
    i: &[u8],
) -> IResult<&[u8], (&[u8], &[u8], Vec<(&[u8], Vec<u8>)>)> {
    tuple((token, preceded(tag("/"), token), many0(parameter)))(i)
}

fn content_disposition(
    i: &[u8],
) -> IResult<&[u8], (&[u8], Vec<(&[u8], Vec<u8>)>)> {
    tuple((token, many0(parameter)))(i)
}

fn lower(b: &[u8]) -> String {
    String::from_utf8_lossy(b).to_ascii_lowercase()
}

fn convert_parms(parms: Vec<(&[u8], Vec<u8>)>) -> Vec<(String, String)> {
    parms
        .into_iter()
        .map(|(name, value)| {
            (lower(name), String::from_utf8_lossy(&value).into_owned())
        })
        .collect()
}

/// Parse the value of a `Content-Type` header.
pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    let (_, (typ, subtype, parms)) = content_type(value).ok()?;
    Some(ContentType {
        typ: lower(typ),
        subtype: lower(subtype),
        parms: convert_parms(parms),
    })
}

/// Parse the value of a `Content-Disposition` header.
pub fn parse_content_disposition(value: &[u8]) -> Option<ContentDisposition> {
    let (_, (disposition, parms)) = content_disposition(value).ok()?;
    Some(ContentDisposition {
        disposition: lower(disposition),
        parms: convert_parms(parms),
    })
}

/// Remove header folding (line endings followed by whitespace).
pub fn unfold(value: &[u8]) -> Cow<[u8]> {
    if memchr::memchr(b'\n', value).is_none() {
        return Cow::Borrowed(value);
    }

    Cow::Owned(
        value
            .iter()
            .copied()
            .filter(|&b| b'\r' != b && b'\n' != b)
            .collect(),
    )
}

/// Decode an unstructured header value (such as `Subject`): unfold, decode
/// RFC 2047 encoded words, and normalise whitespace.
pub fn decode_unstructured(value: &[u8]) -> String {
    decode_words(&String::from_utf8_lossy(&unfold(value)))
}

/// Extract the first `<...>` message id from a header value, including the
/// angle brackets.
pub fn parse_message_id(value: &[u8]) -> Option<String> {
    let value = unfold(value);
    let start = memchr::memchr(b'<', &value)?;
    let len = memchr::memchr(b'>', &value[start..])?;
    let id = str::from_utf8(&value[start..=start + len]).ok()?;
    if id.contains(char::is_whitespace) {
        None
    } else {
        Some(id.to_owned())
    }
}

/// A single address from an address list.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Mailbox {
    /// The display name, decoded.
    pub name: Option<String>,
    pub local: String,
    pub domain: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Mailbox(Mailbox),
    Group(String, Vec<Mailbox>),
}

#[derive(Debug, PartialEq, Eq)]
enum AddrToken {
    Word(String),
    Quoted(String),
    Angle(String),
    Comma,
    Colon,
    Semicolon,
}

fn tokenise_addresses(value: &str) -> Vec<AddrToken> {
    let mut tokens = Vec::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ',' => tokens.push(AddrToken::Comma),
            ':' => tokens.push(AddrToken::Colon),
            ';' => tokens.push(AddrToken::Semicolon),
            '"' => {
                let mut s = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => s.extend(chars.next()),
                        c => s.push(c),
                    }
                }
                tokens.push(AddrToken::Quoted(s));
            }
            '<' => {
                let s: String = chars
                    .by_ref()
                    .take_while(|&c| '>' != c)
                    .filter(|c| !c.is_whitespace())
                    .collect();
                tokens.push(AddrToken::Angle(s));
            }
            '(' => {
                // Comments are discarded
                let mut depth = 1;
                while let Some(c) = chars.next() {
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if 0 == depth {
                                break;
                            }
                        }
                        '\\' => {
                            chars.next();
                        }
                        _ => (),
                    }
                }
            }
            c if c.is_whitespace() => (),
            c => {
                let mut s = String::new();
                s.push(c);
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "\",:;<>()".contains(c) {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                tokens.push(AddrToken::Word(s));
            }
        }
    }

    tokens
}

fn split_addr_spec(spec: &str) -> (String, String) {
    match spec.rfind('@') {
        Some(at) => (spec[..at].to_owned(), spec[at + 1..].to_owned()),
        None => (spec.to_owned(), String::new()),
    }
}

/// Parse an RFC 5322 address list, as found in `From`, `To`, etc.
///
/// Obsolete routing information and comments are discarded. Entries which
/// don't contain an address at all are skipped.
pub fn parse_address_list(value: &[u8]) -> Vec<Address> {
    let value = String::from_utf8_lossy(&unfold(value)).into_owned();

    let mut addresses = Vec::new();
    let mut group: Option<(String, Vec<Mailbox>)> = None;
    let mut phrase: Vec<String> = Vec::new();
    let mut angle: Option<String> = None;

    fn flush(
        phrase: &mut Vec<String>,
        angle: &mut Option<String>,
    ) -> Option<Mailbox> {
        let phrase = std::mem::replace(phrase, Vec::new());
        let (name, spec) = match angle.take() {
            Some(spec) => (Some(decode_words(&phrase.join(" "))), spec),
            None if 1 == phrase.len() && phrase[0].contains('@') => {
                (None, phrase.into_iter().next().unwrap_or_default())
            }
            None => return None,
        };

        let (local, domain) = split_addr_spec(&spec);
        Some(Mailbox {
            name: name.filter(|n| !n.is_empty()),
            local,
            domain,
        })
    }

    for token in tokenise_addresses(&value) {
        match token {
            AddrToken::Word(w) | AddrToken::Quoted(w) => phrase.push(w),
            AddrToken::Angle(a) => angle = Some(a),
            AddrToken::Colon if group.is_none() && angle.is_none() => {
                let name = decode_words(&phrase.join(" "));
                phrase.clear();
                group = Some((name, Vec::new()));
            }
            AddrToken::Colon => (),
            AddrToken::Comma => {
                if let Some(mbox) = flush(&mut phrase, &mut angle) {
                    match group {
                        Some((_, ref mut boxes)) => boxes.push(mbox),
                        None => addresses.push(Address::Mailbox(mbox)),
                    }
                }
            }
            AddrToken::Semicolon => {
                let mbox = flush(&mut phrase, &mut angle);
                if let Some((name, mut boxes)) = group.take() {
                    boxes.extend(mbox);
                    addresses.push(Address::Group(name, boxes));
                } else if let Some(mbox) = mbox {
                    addresses.push(Address::Mailbox(mbox));
                }
            }
        }
    }

    let mbox = flush(&mut phrase, &mut angle);
    if let Some((name, mut boxes)) = group.take() {
        boxes.extend(mbox);
        addresses.push(Address::Group(name, boxes));
    } else if let Some(mbox) = mbox {
        addresses.push(Address::Mailbox(mbox));
    }

    addresses
}
