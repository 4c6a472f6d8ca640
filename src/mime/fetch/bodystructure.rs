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

use super::super::grovel::{MimePart, PartChildren};
use super::super::header;
use super::super::MessageContent;
use super::envelope::{envelope_of, Envelope};

/// The IMAP `BODYSTRUCTURE` of one part, sort of.
///
/// The wire form of `BODYSTRUCTURE` depends on the content type of each part
/// and on whether the client asked for `BODY` or `BODYSTRUCTURE`. This is the
/// union of every field any of those forms needs, computed for every part.
///
/// An encapsulated `message/rfc822` is treated like a multipart with exactly
/// one child, the structure of the inner message, and additionally carries
/// the inner message's envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyStructure {
    /// The content type and subtype of this part, lower-case.
    pub content_type: (String, String),
    pub content_type_parms: Vec<(String, String)>,
    /// The `Content-Disposition` of this part, if set.
    pub content_disposition: Option<String>,
    pub content_disposition_parms: Vec<(String, String)>,
    /// The language tags of the `Content-Language` header.
    pub content_language: Vec<String>,
    pub content_location: Option<String>,
    pub content_id: Option<String>,
    /// The `Content-Description` header, decoded.
    pub content_description: Option<String>,
    /// The `Content-Transfer-Encoding`, lower-case, `7bit` if unset.
    pub content_transfer_encoding: String,
    /// The size of the body of this part.
    pub size_octets: u64,
    /// The number of lines in the body of this part.
    pub size_lines: u64,
    /// The value of the `Content-MD5` header, if any.
    pub md5: Option<String>,
    /// For `message/rfc822`, the envelope of the encapsulated message.
    pub envelope: Option<Envelope>,
    pub children: Vec<BodyStructure>,
}

impl MessageContent {
    pub fn body_structure(&self) -> BodyStructure {
        structure_of(&self.raw, &self.root)
    }
}

fn structure_of(raw: &[u8], part: &MimePart) -> BodyStructure {
    let field = |name: &str| {
        part.field(name).map(|f| &raw[f.value.clone()])
    };
    let text_field = |name: &str| {
        field(name)
            .map(|v| {
                String::from_utf8_lossy(&header::unfold(v)).trim().to_owned()
            })
            .filter(|s| !s.is_empty())
    };

    let (content_disposition, content_disposition_parms) =
        match field("Content-Disposition")
            .and_then(header::parse_content_disposition)
        {
            Some(cd) => (Some(cd.disposition), cd.parms),
            None => (None, Vec::new()),
        };

    let content_language = text_field("Content-Language")
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let (envelope, children) = match part.children {
        PartChildren::None => (None, Vec::new()),
        PartChildren::Multipart(ref children) => (
            None,
            children.iter().map(|c| structure_of(raw, c)).collect(),
        ),
        PartChildren::Message(ref inner) => (
            Some(envelope_of(raw, inner)),
            vec![structure_of(raw, inner)],
        ),
    };

    BodyStructure {
        content_type: (
            part.content_type.typ.clone(),
            part.content_type.subtype.clone(),
        ),
        content_type_parms: part.content_type.parms.clone(),
        content_disposition,
        content_disposition_parms,
        content_language,
        content_location: text_field("Content-Location"),
        content_id: text_field("Content-ID"),
        content_description: field("Content-Description")
            .map(header::decode_unstructured)
            .filter(|s| !s.is_empty()),
        content_transfer_encoding: text_field("Content-Transfer-Encoding")
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| "7bit".to_owned()),
        size_octets: (part.body.end - part.body.start) as u64,
        size_lines: part.lines,
        md5: text_field("Content-MD5"),
        envelope,
        children,
    }
}
