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

//! Addressing of body sections.
//!
//! A section is a path of 1-based part numbers, as in IMAP's `BODY[2.1]`. The
//! empty path refers to the whole message. Nothing here fails: a section that
//! doesn't exist simply has no content.

use super::super::grovel::{MimePart, PartChildren};
use super::super::header;
use super::super::MessageContent;

impl MessageContent {
    /// Locate the part addressed by `section`.
    ///
    /// Following IMAP, part 1 of a non-multipart entity is its body, and the
    /// parts of an encapsulated `message/rfc822` are numbered as the parts of
    /// that message.
    pub fn find_part(&self, section: &[u32]) -> Option<&MimePart> {
        let mut part = &self.root;
        for &ix in section {
            let ix = (ix as usize).checked_sub(1)?;
            let container = match part.children {
                PartChildren::Message(ref inner) => inner,
                _ => part,
            };

            part = match container.children {
                PartChildren::Multipart(ref children) => children.get(ix)?,
                _ if 0 == ix => container,
                _ => return None,
            };
        }

        Some(part)
    }

    /// The header block whose fields `get_headers` reports for `section`: the
    /// message header for the empty section, the encapsulated message's
    /// header for a `message/rfc822` part, and the part's own MIME header
    /// otherwise.
    fn header_part(&self, section: &[u32]) -> Option<&MimePart> {
        let part = self.find_part(section)?;
        if section.is_empty() {
            return Some(part);
        }

        match part.children {
            PartChildren::Message(ref inner) => Some(inner),
            _ => Some(part),
        }
    }

    /// Return the decoded values of every top-level header field called
    /// `name`, in order.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.root
            .fields
            .iter()
            .filter(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| header::decode_unstructured(&self.raw[f.value.clone()]))
            .collect()
    }

    /// Return the raw header fields of `section`, terminated by a blank line.
    ///
    /// If `subset` is given, only fields with those names are included, or,
    /// when `inverse` is set, only fields without those names.
    pub fn headers(
        &self,
        section: &[u32],
        subset: Option<&[&str]>,
        inverse: bool,
    ) -> Vec<u8> {
        let part = match self.header_part(section) {
            Some(part) => part,
            None => return Vec::new(),
        };

        let mut out = Vec::new();
        for field in &part.fields {
            let listed = subset.map(|names| {
                names.iter().any(|n| n.eq_ignore_ascii_case(&field.name))
            });
            let include = match listed {
                None => true,
                Some(listed) => listed != inverse,
            };

            if include {
                let raw = &self.raw[field.raw.clone()];
                out.extend_from_slice(raw);
                if !raw.ends_with(b"\n") {
                    out.extend_from_slice(b"\r\n");
                }
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Return the MIME header block of the part at `section`, verbatim.
    pub fn mime(&self, section: &[u32]) -> &[u8] {
        if section.is_empty() {
            return &[];
        }

        self.find_part(section)
            .map(|part| &self.raw[part.header.clone()])
            .unwrap_or(&[])
    }

    /// Return the content of `section`.
    ///
    /// For the empty section, this is the whole message. Otherwise, it is the
    /// content of the part without its MIME header.
    pub fn body(&self, section: &[u32]) -> &[u8] {
        if section.is_empty() {
            return &self.raw;
        }

        self.find_part(section)
            .map(|part| &self.raw[part.body.clone()])
            .unwrap_or(&[])
    }

    /// Return the text (body without header) of the message at `section`.
    pub fn text(&self, section: &[u32]) -> &[u8] {
        let part = match self.find_part(section) {
            Some(part) => part,
            None => return &[],
        };

        let part = match part.children {
            PartChildren::Message(ref inner) if !section.is_empty() => inner,
            _ => part,
        };
        &self.raw[part.body.clone()]
    }

    /// Return the size in octets of `body(section)`.
    pub fn size(&self, section: &[u32]) -> u64 {
        self.body(section).len() as u64
    }
}
