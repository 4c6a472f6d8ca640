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

use std::borrow::Cow;
use std::str;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

use super::quoted_printable::qp_decode;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]*)\?([!->@-~]*)\?([!->@-~]*)\?=$").unwrap();
}

/// Test if `word` (in its entirety) is an RFC 2047 "encoded word".
///
/// If it is, decode it and return its decoded value.
///
/// Returns `None` if it is not an encoded word or if it could not be decoded.
/// The distinction from "unchanged" matters to callers since whitespace
/// between adjacent encoded words is deleted.
///
/// Encoded words longer than the RFC 2047 limit of 75 characters are
/// accepted, since agents do produce them.
pub fn ew_decode(word: &str) -> Option<String> {
    let captures = ENCODED_WORD.captures(word)?;

    // RFC 2231 allows a language suffix on the charset
    let charset = captures.get(1)?.as_str();
    let charset = charset.split('*').next().unwrap_or(charset);
    let transfer_encoding = captures.get(2)?.as_str();
    let content = captures.get(3)?.as_str().as_bytes();

    let content: Cow<[u8]> = match transfer_encoding {
        "q" | "Q" => {
            // _ stands for ASCII space regardless of charset
            let underscored: Vec<u8> = content
                .iter()
                .map(|&b| if b'_' == b { b' ' } else { b })
                .collect();
            Cow::Owned(qp_decode(&underscored).into_owned())
        }
        "b" | "B" => Cow::Owned(base64::decode(content).ok()?),
        _ => return None,
    };

    let encoding = Encoding::for_label_no_replacement(charset.as_bytes())?;
    Some(encoding.decode_with_bom_removal(&content).0.into_owned())
}

/// Decode a sequence of whitespace-separated words, any of which may be
/// encoded words.
///
/// Runs of whitespace are collapsed to a single space, except between two
/// encoded words, where they are removed.
pub fn decode_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_encoded = false;

    for word in text.split_whitespace() {
        match ew_decode(word) {
            Some(decoded) => {
                if !out.is_empty() && !last_was_encoded {
                    out.push(' ');
                }
                out.push_str(&decoded);
                last_was_encoded = true;
            }
            None => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(word);
                last_was_encoded = false;
            }
        }
    }

    out
}
