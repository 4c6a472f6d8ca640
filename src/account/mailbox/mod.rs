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

//! The state of a single mailbox.
//!
//! A `MailboxData` owns the in-memory index of a mailbox's messages (UIDs,
//! flags, internal dates, expunge markers; never content), the UID counter,
//! and the set of messages nobody has claimed `\Recent` on yet. All of that
//! lives behind one `RwLock`. Every mutation writes through to the
//! `MessageStore` while holding the write lock, so a change is either fully
//! visible or not at all, and a failed write never consumes a UID.
//!
//! Lock order: the state lock of a mailbox, then the list lock of its
//! `SelectedSet`, then the lock of an individual session. A `MailboxSet`
//! takes its own lock before any of these.
//!
//! The implementation is split across several files by concern.

mod expunge;
mod flags;
mod messages;
mod poll;
mod recent;
mod select;

pub use self::messages::Cursor;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use log::{error, info};

use super::message::Message;
use super::model::*;
use super::selected::SelectedSet;
use crate::storage::MessageStore;
use crate::support::error::Error;

pub struct MailboxData {
    uid_validity: u32,
    name: RwLock<String>,
    store: Arc<dyn MessageStore>,
    state: RwLock<MailboxState>,
    selected: SelectedSet,
    deleted: AtomicBool,
}

#[derive(Debug)]
struct MailboxState {
    /// Strictly greater than every UID ever assigned, or `Uid::END` once the
    /// UID space is exhausted.
    next_uid: Uid,
    /// Active and expunged-but-not-purged messages, without content.
    messages: BTreeMap<Uid, Message>,
    /// Messages added with `recent` which no session has claimed yet.
    unclaimed_recent: BTreeSet<Uid>,
}

impl MailboxState {
    fn active(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.values().filter(|m| !m.is_expunged())
    }
}

impl fmt::Debug for MailboxData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MailboxData")
            .field("name", &*self.name.read().unwrap())
            .field("uid_validity", &self.uid_validity)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

impl MailboxData {
    /// Load the mailbox held by `store`.
    pub(crate) fn open(
        name: &str,
        store: Arc<dyn MessageStore>,
    ) -> Result<Arc<Self>, Error> {
        let stored = store.load()?;
        let messages = stored
            .messages
            .into_iter()
            .map(|(uid, meta)| (uid, Message::from_meta(uid, meta)))
            .collect::<BTreeMap<_, _>>();

        info!(
            "Opened mailbox {} (uid validity {}, {} messages, next UID {})",
            name,
            stored.uid_validity,
            messages.len(),
            stored.next_uid
        );

        Ok(Arc::new(MailboxData {
            uid_validity: stored.uid_validity,
            name: RwLock::new(name.to_owned()),
            store,
            state: RwLock::new(MailboxState {
                next_uid: stored.next_uid,
                messages,
                unclaimed_recent: BTreeSet::new(),
            }),
            selected: SelectedSet::default(),
            deleted: AtomicBool::new(false),
        }))
    }

    pub fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write().unwrap() = name.to_owned();
        self.selected.rename(name);
    }

    pub fn selected(&self) -> &SelectedSet {
        &self.selected
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Mark this mailbox deleted. Every further operation on it fails with
    /// `NxMailbox`.
    pub(crate) fn mark_deleted(&self) {
        // Taking the write lock waits out any mutation in progress
        let _state = self.state.write().unwrap();
        self.deleted.store(true, Ordering::SeqCst);
    }

    fn check_live(&self) -> Result<(), Error> {
        if self.is_deleted() {
            Err(Error::NxMailbox)
        } else {
            Ok(())
        }
    }

    /// The UID the next added message will get.
    pub fn next_uid(&self) -> Result<Uid, Error> {
        self.check_live()?;
        Ok(self.state.read().unwrap().next_uid)
    }

    fn log_full(&self) {
        error!(
            "{}: UID space exhausted; mailbox can accept no more messages",
            self.name()
        );
    }

    /// Durably write the metadata of every message in `updated`, then
    /// replace the in-memory copies with them.
    ///
    /// All or nothing: if any write fails, the writes already made are
    /// reverted from the in-memory copies and `state` is left untouched.
    fn commit_metas(
        &self,
        state: &mut MailboxState,
        updated: Vec<Message>,
    ) -> Result<(), Error> {
        for (ix, message) in updated.iter().enumerate() {
            let written =
                self.store.write_meta(message.uid(), &message.to_meta());
            if let Err(e) = written {
                for uid in updated[..ix].iter().map(Message::uid) {
                    let original = match state.messages.get(&uid) {
                        Some(m) => m.to_meta(),
                        None => continue,
                    };
                    if let Err(e2) = self.store.write_meta(uid, &original) {
                        error!(
                            "{}: Failed to revert metadata of {}: {}",
                            self.name(),
                            uid,
                            e2
                        );
                    }
                }
                return Err(e);
            }
        }

        for message in updated {
            state.messages.insert(message.uid(), message);
        }
        Ok(())
    }
}

/// Request information for `STORE` and `UID STORE`.
#[derive(Clone, Copy, Debug)]
pub struct StoreRequest<'a> {
    /// The UIDs of the messages to affect. Messages not in the session's
    /// view are ignored.
    pub ids: &'a SeqRange<Uid>,
    /// The flags to control. Session-only flags are ignored.
    pub flags: &'a [Flag],
    /// If false, add each flag in `flags` (`FLAGS` and `+FLAGS`). If true,
    /// remove each flag in `flags` (`-FLAGS`).
    pub remove_listed: bool,
    /// If true, remove every flag not in `flags` (`FLAGS`).
    pub remove_unlisted: bool,
    /// If true, every message in `ids` is reported to the session as changed
    /// even if its flags were already as requested. This is the absence of
    /// `.SILENT`.
    pub loud: bool,
}

/// Response information for `STORE` and `UID STORE`.
///
/// The messages to send `FETCH` responses for are found by a `mini_poll()`
/// after the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreResponse {
    /// False if any message in the request had been expunged. The request is
    /// still carried out on every other message.
    pub ok: bool,
    /// The UIDs whose flags actually changed.
    pub modified: Vec<Uid>,
}

/// Unsolicited responses to send after a command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollResponse {
    /// Messages to report as expunged, in *descending* order, which is the
    /// order the `EXPUNGE` responses must be sent in so that each sequence
    /// number is valid at the time it is sent.
    pub expunge: Vec<(Seqnum, Uid)>,
    /// If the mailbox size has changed, the new size.
    pub exists: Option<usize>,
    /// If there are new messages, the new recent count.
    pub recent: Option<usize>,
    /// UIDs of messages that should be sent in unsolicited `FETCH`
    /// responses, ascending.
    pub fetch: Vec<Uid>,
}

/// The result of `COPY` and `UID COPY`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyResponse {
    /// The UID validity of the destination mailbox.
    pub uid_validity: u32,
    /// The source UIDs which were copied.
    pub from_uids: Vec<Uid>,
    /// The UIDs of the copies, parallel to `from_uids`.
    pub to_uids: Vec<Uid>,
}

#[cfg(test)]
pub(crate) mod test_prelude {
    use std::sync::Arc;

    use chrono::prelude::*;

    pub use super::super::message::Message;
    pub use super::super::model::*;
    pub use super::super::selected::SelectedMailbox;
    pub use super::*;
    pub use crate::storage::memory::MemoryBackend;
    pub use crate::storage::Backend;
    pub use crate::support::error::Error;

    pub struct Setup {
        pub backend: MemoryBackend,
        pub mailbox: Arc<MailboxData>,
    }

    pub fn set_up() -> Setup {
        crate::init_test_log();

        let backend = MemoryBackend::new();
        let store = backend.create_store(1234).unwrap();
        let mailbox = MailboxData::open("INBOX", store).unwrap();
        Setup { backend, mailbox }
    }

    pub fn test_message(subject: &str) -> Message {
        Message::parse(
            Uid::MIN,
            format!(
                "From: test@example.com\r\n\
                 Subject: {}\r\n\
                 \r\n\
                 Body of {}\r\n",
                subject, subject
            )
            .into_bytes(),
            vec![],
            FixedOffset::east(0).ymd(2020, 1, 1).and_hms(0, 0, 0),
        )
        .unwrap()
    }

    pub fn simple_append(mailbox: &MailboxData) -> Uid {
        mailbox.add(test_message("simple"), false).unwrap().uid()
    }

    pub fn recent_append(mailbox: &MailboxData) -> Uid {
        mailbox.add(test_message("recent"), true).unwrap().uid()
    }
}
