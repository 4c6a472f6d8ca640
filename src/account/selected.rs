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

//! Per-session views of a mailbox.
//!
//! IMAP identifies messages by sequence number as well as by UID, but
//! sequence numbers are private to each session: a session's numbering only
//! changes when that session is told about the change. `SelectedMailbox` holds
//! that numbering, along with the session's `\Recent` overlay and the set of
//! messages whose flags changed since the session last looked.
//!
//! `SelectedSet` is the mailbox's list of every open `SelectedMailbox`, which
//! is how changes made by one session reach the others.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::info;

use super::mailbox::{
    CopyResponse, MailboxData, PollResponse, StoreRequest, StoreResponse,
};
use super::message::Message;
use super::model::*;
use super::session_flags::SessionFlags;
use super::snapshot::MailboxSnapshot;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// The mutable state of one session's view.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) flags: SessionFlags,
    /// The UIDs of the session's sequence numbers, ascending. Index 0 is
    /// sequence number 1.
    pub(crate) view: Vec<Uid>,
    /// The greatest UID the session has ever been told about.
    pub(crate) last_uid: Option<Uid>,
    /// UIDs whose flags changed since the last poll.
    pub(crate) changed: BTreeSet<Uid>,
    pub(crate) read_only: bool,
    pub(crate) log_prefix: LogPrefix,
}

impl SessionState {
    pub(crate) fn uid_to_seqnum(&self, uid: Uid) -> Option<Seqnum> {
        self.view
            .binary_search(&uid)
            .ok()
            .and_then(Seqnum::from_index)
    }

    pub(crate) fn seqnum_to_uid(&self, seqnum: Seqnum) -> Option<Uid> {
        self.view.get(seqnum.to_index()).copied()
    }
}

/// One session's handle on a selected mailbox.
///
/// Dropping it deselects the mailbox.
#[derive(Debug)]
pub struct SelectedMailbox {
    mailbox: Arc<MailboxData>,
    id: u64,
    state: Arc<Mutex<SessionState>>,
}

impl SelectedMailbox {
    /// Bind a new session to `mailbox` with the given initial view.
    ///
    /// The caller must hold the mailbox's state lock so that `view` is
    /// current until the session is registered.
    pub(crate) fn new(
        mailbox: Arc<MailboxData>,
        read_only: bool,
        view: Vec<Uid>,
    ) -> Self {
        let id = mailbox.selected().next_id();
        let log_prefix = LogPrefix::new(&mailbox.name(), id, read_only);
        let state = Arc::new(Mutex::new(SessionState {
            flags: SessionFlags::new(),
            last_uid: view.last().copied(),
            view,
            changed: BTreeSet::new(),
            read_only,
            log_prefix,
        }));

        mailbox.selected().register(id, &state);
        SelectedMailbox { mailbox, id, state }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> &Mutex<SessionState> {
        &self.state
    }

    pub fn mailbox(&self) -> &Arc<MailboxData> {
        &self.mailbox
    }

    pub fn read_only(&self) -> bool {
        self.state.lock().unwrap().read_only
    }

    pub fn log_prefix(&self) -> LogPrefix {
        self.state.lock().unwrap().log_prefix.clone()
    }

    /// The number of messages in this session's view.
    pub fn exists(&self) -> usize {
        self.state.lock().unwrap().view.len()
    }

    /// A copy of this session's flag overlay.
    pub fn session_flags(&self) -> SessionFlags {
        self.state.lock().unwrap().flags.clone()
    }

    /// Return the flags of `message` as this session sees them.
    pub fn get_flags(&self, message: &Message) -> BTreeSet<Flag> {
        message.get_flags(&self.state.lock().unwrap().flags)
    }

    pub fn uid_to_seqnum(&self, uid: Uid) -> Option<Seqnum> {
        self.state.lock().unwrap().uid_to_seqnum(uid)
    }

    pub fn seqnum_to_uid(&self, seqnum: Seqnum) -> Option<Uid> {
        self.state.lock().unwrap().seqnum_to_uid(seqnum)
    }

    /// Resolve `set` against this session's current view.
    ///
    /// For sequence numbers, `*` is the last sequence number; for UIDs, it is
    /// the greatest UID in the view. Entries that don't name a message in the
    /// view are dropped. The result is ascending.
    pub fn resolve(&self, set: &SequenceSet) -> Vec<(Seqnum, Uid)> {
        let state = self.state.lock().unwrap();
        if state.view.is_empty() {
            return Vec::new();
        }
        let last_seqnum = match Seqnum::from_index(state.view.len() - 1) {
            Some(s) => s,
            None => return Vec::new(),
        };

        if set.is_uid() {
            let last_uid = state.view[state.view.len() - 1];
            let range = set.resolve(last_uid);
            state
                .view
                .iter()
                .enumerate()
                .filter(|&(_, &uid)| range.contains(uid))
                .filter_map(|(ix, &uid)| {
                    Seqnum::from_index(ix).map(|s| (s, uid))
                })
                .collect()
        } else {
            set.resolve(last_seqnum)
                .items(last_seqnum)
                .filter_map(|s| state.seqnum_to_uid(s).map(|u| (s, u)))
                .collect()
        }
    }

    /// Resolve a UID range against the view, dropping UIDs the session does
    /// not know about.
    pub(crate) fn uids_in_view(&self, uids: &SeqRange<Uid>) -> Vec<Uid> {
        self.state
            .lock()
            .unwrap()
            .view
            .iter()
            .copied()
            .filter(|&uid| uids.contains(uid))
            .collect()
    }

    /// Do a full poll, bringing the view up to date with the mailbox.
    ///
    /// Expunged messages are removed from the view, new messages are added
    /// to it, and `\Recent` is claimed on any messages nobody has claimed
    /// yet.
    pub fn poll(&self) -> Result<PollResponse, Error> {
        self.mailbox.poll(self, false)
    }

    /// Do a "mini" poll, appropriate after `FETCH`, `STORE` or `SEARCH`,
    /// where IMAP forbids sending `EXPUNGE`.
    ///
    /// The view is not changed; only flag changes on messages already in the
    /// view are reported.
    pub fn mini_poll(&self) -> Result<PollResponse, Error> {
        self.mailbox.poll(self, true)
    }

    /// Claim `\Recent` on every message nobody has claimed yet.
    pub fn claim_recent(&self) -> Result<Vec<Uid>, Error> {
        self.mailbox.claim_recent(self)
    }

    /// Modify the flags of the messages in `request.ids`.
    pub fn store(
        &self,
        request: &StoreRequest<'_>,
    ) -> Result<StoreResponse, Error> {
        self.mailbox.store(self, request)
    }

    /// Expunge every message with `\Deleted`, or, if `uids` is given, only
    /// those also in `uids`.
    ///
    /// The expunges are not reflected in the view until the next poll.
    pub fn expunge_deleted(
        &self,
        uids: Option<&SeqRange<Uid>>,
    ) -> Result<Vec<Uid>, Error> {
        self.mailbox.expunge_deleted(self, uids)
    }

    /// Copy the messages in `uids` which are in this session's view into
    /// `dest`.
    pub fn copy_to(
        &self,
        uids: &SeqRange<Uid>,
        dest: &MailboxData,
    ) -> Result<CopyResponse, Error> {
        let uids = self.uids_in_view(uids);
        self.mailbox.copy_messages(&uids, dest)
    }

    /// A snapshot of the mailbox, with `\Recent` counted from this session's
    /// overlay.
    pub fn snapshot(&self) -> Result<MailboxSnapshot, Error> {
        self.mailbox.snapshot_for(self)
    }
}

impl Drop for SelectedMailbox {
    fn drop(&mut self) {
        self.mailbox.selected().unregister(self.id);
        info!("{} Deselected", self.state.lock().unwrap().log_prefix);
    }
}

/// The sessions which currently have one mailbox selected.
#[derive(Debug, Default)]
pub struct SelectedSet {
    sessions: Mutex<Vec<(u64, Weak<Mutex<SessionState>>)>>,
    next_id: AtomicU64,
}

impl SelectedSet {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn register(&self, id: u64, state: &Arc<Mutex<SessionState>>) {
        self.sessions
            .lock()
            .unwrap()
            .push((id, Arc::downgrade(state)));
    }

    fn unregister(&self, id: u64) {
        self.sessions
            .lock()
            .unwrap()
            .retain(|&(i, ref weak)| i != id && weak.strong_count() > 0);
    }

    /// Call `f` on the state of every live session.
    fn for_each(&self, mut f: impl FnMut(u64, &mut SessionState)) {
        let sessions: Vec<(u64, Arc<Mutex<SessionState>>)> = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter_map(|&(id, ref weak)| weak.upgrade().map(|s| (id, s)))
            .collect();

        for (id, session) in sessions {
            f(id, &mut session.lock().unwrap());
        }
    }

    /// The number of sessions with the mailbox selected.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|&&(_, ref weak)| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Record that the flags of `uids` changed.
    pub(crate) fn notify_changed(&self, uids: &[Uid]) {
        if uids.is_empty() {
            return;
        }

        self.for_each(|_, session| {
            session.changed.extend(uids.iter().copied())
        });
    }

    /// Remove `\Recent` from `uids` in every session except `except`.
    pub(crate) fn strip_recent(&self, uids: &[Uid], except: u64) {
        self.for_each(|id, session| {
            if id != except {
                for &uid in uids {
                    session.flags.remove_recent(uid);
                }
            }
        });
    }

    /// Every UID that any session still has a sequence number for.
    pub(crate) fn referenced_uids(&self) -> BTreeSet<Uid> {
        let mut uids = BTreeSet::new();
        self.for_each(|_, session| uids.extend(session.view.iter().copied()));
        uids
    }

    /// Update the log prefixes of every session after a rename.
    pub(crate) fn rename(&self, name: &str) {
        self.for_each(|_, session| session.log_prefix.set_mailbox(name));
    }
}
