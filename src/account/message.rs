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

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::prelude::*;

use super::model::{Flag, Uid};
use super::session_flags::SessionFlags;
use crate::mime::fetch::{BodyStructure, Envelope};
use crate::mime::MessageContent;
use crate::storage::MessageMeta;
use crate::support::error::Error;

/// One message in a mailbox, as handed out to callers.
///
/// A `Message` is a value: changing its flags has no effect on the mailbox
/// until it is passed to `MailboxData::save_flags()`.
///
/// The content is only present if the message was parsed from raw bytes or
/// was fetched with `FetchRequirement::Content`. All the introspection
/// methods give empty results when it is absent.
#[derive(Clone, Debug)]
pub struct Message {
    uid: Uid,
    permanent_flags: BTreeSet<Flag>,
    internal_date: DateTime<FixedOffset>,
    expunged: bool,
    content: Option<Arc<MessageContent>>,
}

fn permanent_only(flags: impl IntoIterator<Item = Flag>) -> BTreeSet<Flag> {
    flags.into_iter().filter(|f| !f.is_session_only()).collect()
}

impl Message {
    /// Parse `raw` into a new message.
    ///
    /// `uid` is only meaningful until the message is added to a mailbox, which
    /// assigns the real one. `\Recent` is dropped from `flags`.
    pub fn parse(
        uid: Uid,
        raw: Vec<u8>,
        flags: impl IntoIterator<Item = Flag>,
        internal_date: DateTime<FixedOffset>,
    ) -> Result<Self, Error> {
        let content = MessageContent::parse(raw)?;
        Ok(Message {
            uid,
            permanent_flags: permanent_only(flags),
            internal_date,
            expunged: false,
            content: Some(Arc::new(content)),
        })
    }

    /// Construct a message with metadata only.
    pub(crate) fn from_meta(uid: Uid, meta: MessageMeta) -> Self {
        Message {
            uid,
            permanent_flags: meta.flags,
            internal_date: meta.internal_date,
            expunged: meta.expunged,
            content: None,
        }
    }

    pub(crate) fn to_meta(&self) -> MessageMeta {
        MessageMeta {
            flags: self.permanent_flags.clone(),
            internal_date: self.internal_date,
            expunged: self.expunged,
        }
    }

    pub(crate) fn with_content(mut self, content: Arc<MessageContent>) -> Self {
        self.content = Some(content);
        self
    }

    pub(crate) fn without_content(&self) -> Self {
        Message {
            content: None,
            ..self.clone()
        }
    }

    pub(crate) fn mark_expunged(&mut self) -> bool {
        !std::mem::replace(&mut self.expunged, true)
    }

    /// Return a copy of this message under a different UID.
    ///
    /// The copy shares content and permanent flags, and is never expunged.
    pub fn copy(&self, uid: Uid) -> Self {
        Message {
            uid,
            permanent_flags: self.permanent_flags.clone(),
            internal_date: self.internal_date,
            expunged: false,
            content: self.content.clone(),
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn internal_date(&self) -> DateTime<FixedOffset> {
        self.internal_date
    }

    pub fn is_expunged(&self) -> bool {
        self.expunged
    }

    pub fn permanent_flags(&self) -> &BTreeSet<Flag> {
        &self.permanent_flags
    }

    /// Replace the permanent flags. Session-only flags are discarded.
    pub fn set_permanent_flags(
        &mut self,
        flags: impl IntoIterator<Item = Flag>,
    ) {
        self.permanent_flags = permanent_only(flags);
    }

    pub fn content(&self) -> Option<&MessageContent> {
        self.content.as_deref()
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// The raw message, or an empty slice if content is not loaded.
    pub fn raw(&self) -> &[u8] {
        self.content.as_ref().map_or(&[][..], |c| c.raw())
    }

    /// Return the flags of this message as seen by the session owning
    /// `session_flags`.
    pub fn get_flags(&self, session_flags: &SessionFlags) -> BTreeSet<Flag> {
        let mut flags = self.permanent_flags.clone();
        if let Some(overlay) = session_flags.get(self.uid) {
            flags.extend(overlay.iter().cloned());
        }
        flags
    }

    /// Return the decoded values of every top-level header called `name`.
    pub fn get_header(&self, name: &str) -> Vec<String> {
        self.content
            .as_ref()
            .map(|c| c.header_values(name))
            .unwrap_or_default()
    }

    /// `BODY[section.HEADER]`, or with a subset, `HEADER.FIELDS` and
    /// `HEADER.FIELDS.NOT`.
    pub fn get_headers(
        &self,
        section: &[u32],
        subset: Option<&[&str]>,
        inverse: bool,
    ) -> Vec<u8> {
        self.content
            .as_ref()
            .map(|c| c.headers(section, subset, inverse))
            .unwrap_or_default()
    }

    /// `BODY[section]`
    pub fn get_body(&self, section: &[u32]) -> &[u8] {
        self.content.as_ref().map_or(&[][..], |c| c.body(section))
    }

    /// `BODY[section.TEXT]`
    pub fn get_text(&self, section: &[u32]) -> &[u8] {
        self.content.as_ref().map_or(&[][..], |c| c.text(section))
    }

    /// `BODY[section.MIME]`
    pub fn get_mime(&self, section: &[u32]) -> &[u8] {
        self.content.as_ref().map_or(&[][..], |c| c.mime(section))
    }

    pub fn get_size(&self, section: &[u32]) -> u64 {
        self.content.as_ref().map_or(0, |c| c.size(section))
    }

    pub fn get_envelope_structure(&self) -> Option<Envelope> {
        self.content.as_ref().map(|c| c.envelope())
    }

    pub fn get_body_structure(&self) -> Option<BodyStructure> {
        self.content.as_ref().map(|c| c.body_structure())
    }

    /// Case-insensitive search over headers and text parts.
    pub fn contains(&self, needle: &[u8]) -> bool {
        self.content.as_ref().map_or(false, |c| c.contains(needle))
    }
}
