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

use bitflags::bitflags;
use chrono::DateTime;

use super::super::grovel::MimePart;
use super::super::header::{self, Address};
use super::super::MessageContent;

/// The IMAP `ENVELOPE` of a message, in the order the fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// The `Date` header, normalised to RFC 2822 form if it could be parsed
    /// and verbatim otherwise.
    pub date: Option<String>,
    /// The `Subject` header, decoded.
    pub subject: Option<String>,
    /// The `From` header.
    ///
    /// Messages with no intelligible `From` header exist in the wild; for
    /// these, this is empty even though IMAP says it cannot be.
    pub from: Vec<EnvelopeAddress>,
    /// The `Sender` header. If absent, a copy of `from`.
    pub sender: Vec<EnvelopeAddress>,
    /// The `Reply-To` header. If absent, a copy of `from`.
    pub reply_to: Vec<EnvelopeAddress>,
    pub to: Vec<EnvelopeAddress>,
    pub cc: Vec<EnvelopeAddress>,
    pub bcc: Vec<EnvelopeAddress>,
    /// The `In-Reply-To` header, trimmed.
    pub in_reply_to: Option<String>,
    /// The `Message-ID` header, including angle brackets.
    pub message_id: Option<String>,
}

bitflags! {
    struct EnvelopeParts: u32 {
        const DATE = 1 << 0;
        const SUBJECT = 1 << 1;
        const FROM = 1 << 2;
        const SENDER = 1 << 3;
        const REPLY_TO = 1 << 4;
        const TO = 1 << 5;
        const CC = 1 << 6;
        const BCC = 1 << 7;
        const IN_REPLY_TO = 1 << 8;
        const MESSAGE_ID = 1 << 9;
    }
}

/// An address, or a group delimiter, within an `Envelope`.
///
/// IMAP flattens groups: a group is started by an entry with a `local` (the
/// group name) but no `domain`, and terminated by an entry with neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeAddress {
    /// The display name if present, decoded.
    pub name: Option<String>,
    pub local: Option<String>,
    pub domain: Option<String>,
}

impl EnvelopeAddress {
    pub fn is_group_start(&self) -> bool {
        self.local.is_some() && self.domain.is_none()
    }

    pub fn is_group_end(&self) -> bool {
        self.local.is_none() && self.domain.is_none()
    }
}

impl MessageContent {
    /// Build the envelope of the top-level message.
    pub fn envelope(&self) -> Envelope {
        envelope_of(&self.raw, &self.root)
    }
}

/// Build the envelope from the header of `part`, whose ranges index `raw`.
///
/// Only the first occurrence of each header is considered.
pub fn envelope_of(raw: &[u8], part: &MimePart) -> Envelope {
    use EnvelopeParts as E;

    let mut envelope = Envelope::default();
    let mut seen = EnvelopeParts::empty();

    for field in &part.fields {
        let name = field.name.to_ascii_lowercase();
        let part = match &name[..] {
            "date" => E::DATE,
            "subject" => E::SUBJECT,
            "from" => E::FROM,
            "sender" => E::SENDER,
            "reply-to" => E::REPLY_TO,
            "to" => E::TO,
            "cc" => E::CC,
            "bcc" => E::BCC,
            "in-reply-to" => E::IN_REPLY_TO,
            "message-id" => E::MESSAGE_ID,
            _ => continue,
        };

        if seen.contains(part) {
            continue;
        }
        seen |= part;

        let value = &raw[field.value.clone()];
        match &name[..] {
            "date" => envelope.date = parse_date(value),
            "subject" => {
                envelope.subject = Some(header::decode_unstructured(value))
            }
            "from" => envelope.from = addresses(value),
            "sender" => envelope.sender = addresses(value),
            "reply-to" => envelope.reply_to = addresses(value),
            "to" => envelope.to = addresses(value),
            "cc" => envelope.cc = addresses(value),
            "bcc" => envelope.bcc = addresses(value),
            "in-reply-to" => {
                envelope.in_reply_to = non_empty(&header::unfold(value))
            }
            _ => envelope.message_id = header::parse_message_id(value),
        }
    }

    if envelope.sender.is_empty() {
        envelope.sender = envelope.from.clone();
    }
    if envelope.reply_to.is_empty() {
        envelope.reply_to = envelope.from.clone();
    }

    envelope
}

fn non_empty(value: &[u8]) -> Option<String> {
    let s = String::from_utf8_lossy(value);
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

fn parse_date(value: &[u8]) -> Option<String> {
    let value = non_empty(header::unfold(value).as_ref())?;
    Some(
        DateTime::parse_from_rfc2822(&value)
            .map(|d| d.to_rfc2822())
            .unwrap_or(value),
    )
}

fn addresses(value: &[u8]) -> Vec<EnvelopeAddress> {
    let mut out = Vec::new();
    for address in header::parse_address_list(value) {
        match address {
            Address::Mailbox(mailbox) => out.push(mailbox_address(mailbox)),
            Address::Group(name, members) => {
                out.push(EnvelopeAddress {
                    name: None,
                    local: Some(name),
                    domain: None,
                });
                out.extend(members.into_iter().map(mailbox_address));
                out.push(EnvelopeAddress::default());
            }
        }
    }
    out
}

fn mailbox_address(mailbox: header::Mailbox) -> EnvelopeAddress {
    EnvelopeAddress {
        name: mailbox.name,
        local: Some(mailbox.local),
        domain: Some(mailbox.domain),
    }
}
