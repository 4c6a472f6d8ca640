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

use log::info;

use super::*;
use crate::account::selected::SelectedMailbox;
use crate::account::snapshot::MailboxSnapshot;

impl MailboxData {
    /// Select this mailbox in a new session.
    ///
    /// The session's view starts out as every active message, and it
    /// immediately claims `\Recent` on anything unclaimed (unless
    /// `read_only`).
    pub fn select(
        self: &Arc<Self>,
        read_only: bool,
    ) -> Result<SelectedMailbox, Error> {
        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let view = state.active().map(Message::uid).collect();
        let selected = SelectedMailbox::new(Arc::clone(self), read_only, view);
        self.claim_recent_locked(&mut state, &selected);

        info!("{} Selected", selected.log_prefix());
        Ok(selected)
    }

    /// Summarise this mailbox as a whole, as for `STATUS`.
    ///
    /// `recent` counts the messages nobody has claimed yet.
    pub fn snapshot(&self) -> Result<MailboxSnapshot, Error> {
        let state = self.state.read().unwrap();
        self.check_live()?;
        Ok(self.snapshot_locked(&state, false, |uid| {
            state.unclaimed_recent.contains(&uid)
        }))
    }

    /// Summarise this mailbox from the perspective of `selected`.
    ///
    /// `recent` counts the session's own `\Recent` messages.
    pub(crate) fn snapshot_for(
        &self,
        selected: &SelectedMailbox,
    ) -> Result<MailboxSnapshot, Error> {
        let state = self.state.read().unwrap();
        self.check_live()?;
        let session = selected.state().lock().unwrap();
        Ok(self.snapshot_locked(&state, session.read_only, |uid| {
            session.flags.is_recent(uid)
        }))
    }

    /// Compute every counter in one pass over the active messages.
    fn snapshot_locked(
        &self,
        state: &MailboxState,
        read_only: bool,
        is_recent: impl Fn(Uid) -> bool,
    ) -> MailboxSnapshot {
        let mut exists = 0;
        let mut recent = 0;
        let mut unseen = 0;
        let mut first_unseen = None;
        let mut keywords = BTreeSet::new();

        for message in state.active() {
            exists += 1;
            if is_recent(message.uid()) {
                recent += 1;
            }

            let flags = message.permanent_flags();
            if !flags.contains(&Flag::Seen) {
                unseen += 1;
                if first_unseen.is_none() {
                    first_unseen = Seqnum::from_index(exists - 1);
                }
            }

            for flag in flags {
                if let Flag::Keyword(_) = *flag {
                    keywords.insert(flag.clone());
                }
            }
        }

        let mut flags = Flag::SYSTEM.to_vec();
        flags.extend(keywords);

        MailboxSnapshot {
            name: self.name(),
            read_only,
            uid_validity: self.uid_validity,
            permanent_flags: if read_only { vec![] } else { flags.clone() },
            flags,
            keywords_allowed: !read_only,
            session_flags: vec![Flag::Recent],
            exists,
            recent,
            unseen,
            first_unseen,
            next_uid: state.next_uid,
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test_prelude::*;

    #[test]
    fn snapshot_counters_agree_with_iteration() {
        let setup = set_up();
        let mb = &setup.mailbox;

        let empty = mb.snapshot().unwrap();
        assert_eq!(0, empty.exists);
        assert_eq!(None, empty.first_unseen);
        assert_eq!(Uid::u(1), empty.next_uid);
        assert_eq!(1234, empty.uid_validity);
        assert_eq!("INBOX", empty.name);

        for _ in 0..6 {
            simple_append(mb);
        }
        mb.delete(vec![Uid::u(1), Uid::u(5)]).unwrap();

        let mut seen = mb
            .get(Uid::u(2), FetchRequirement::Metadata)
            .unwrap()
            .unwrap();
        seen.set_permanent_flags(vec![
            Flag::Seen,
            Flag::Keyword("$Junk".to_owned()),
        ]);
        mb.save_flags(&[seen]).unwrap();

        let snapshot = mb.snapshot().unwrap();
        assert_eq!(mb.messages().unwrap().count(), snapshot.exists);
        assert_eq!(4, snapshot.exists);
        assert_eq!(3, snapshot.unseen);
        // UID 3 is the second active message
        assert_eq!(Some(Seqnum::u(2)), snapshot.first_unseen);
        assert_eq!(Uid::u(7), snapshot.next_uid);
        assert_eq!(6, snapshot.flags.len());
        assert!(snapshot
            .flags
            .contains(&Flag::Keyword("$junk".to_owned())));
        assert_eq!(snapshot.flags, snapshot.permanent_flags);
        assert!(snapshot.keywords_allowed);
        assert_eq!(vec![Flag::Recent], snapshot.session_flags);
    }

    #[test]
    fn read_only_snapshot() {
        let setup = set_up();
        let mb = &setup.mailbox;
        simple_append(mb);

        let session = mb.select(true).unwrap();
        let snapshot = session.snapshot().unwrap();
        assert!(snapshot.read_only);
        assert!(snapshot.permanent_flags.is_empty());
        assert!(!snapshot.keywords_allowed);
        assert_eq!(1, snapshot.exists);
        assert_eq!(Some(Seqnum::u(1)), snapshot.first_unseen);
    }

    #[test]
    fn select_builds_view() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..4 {
            simple_append(mb);
        }
        mb.delete(vec![Uid::u(2)]).unwrap();

        let session = mb.select(false).unwrap();
        assert_eq!(3, session.exists());
        assert_eq!(Some(Uid::u(3)), session.seqnum_to_uid(Seqnum::u(2)));
        assert_eq!(Some(Seqnum::u(3)), session.uid_to_seqnum(Uid::u(4)));
        assert_eq!(None, session.uid_to_seqnum(Uid::u(2)));
        assert_eq!(None, session.seqnum_to_uid(Seqnum::u(4)));
        assert_eq!(1, mb.selected().len());

        let other = mb.select(true).unwrap();
        assert_eq!(2, mb.selected().len());
        drop(session);
        assert_eq!(1, mb.selected().len());
        drop(other);
        assert!(mb.selected().is_empty());
    }

    #[test]
    fn deleted_mailbox_rejects_everything() {
        let setup = set_up();
        let mb = &setup.mailbox;
        simple_append(mb);
        let session = mb.select(false).unwrap();

        mb.mark_deleted();
        assert_matches!(Err(Error::NxMailbox), mb.snapshot());
        assert_matches!(Err(Error::NxMailbox), mb.next_uid());
        assert_matches!(Err(Error::NxMailbox), mb.select(false));
        assert_matches!(
            Err(Error::NxMailbox),
            mb.add(test_message("x"), false)
        );
        assert_matches!(
            Err(Error::NxMailbox),
            mb.get(Uid::u(1), FetchRequirement::Metadata)
        );
        assert_matches!(Err(Error::NxMailbox), mb.delete(vec![Uid::u(1)]));
        assert_matches!(Err(Error::NxMailbox), mb.cleanup());
        assert!(mb.uids().is_err());
        assert_matches!(Err(Error::NxMailbox), session.poll());
        assert_matches!(Err(Error::NxMailbox), session.snapshot());
        assert_matches!(Err(Error::NxMailbox), session.claim_recent());
    }
}
