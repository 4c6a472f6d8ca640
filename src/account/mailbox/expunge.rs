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

use log::info;

use super::*;
use crate::account::selected::SelectedMailbox;

impl MailboxData {
    /// Mark the messages with the given UIDs as expunged.
    ///
    /// UIDs which are already expunged, or which never existed, are ignored.
    /// Returns the UIDs that were newly expunged.
    ///
    /// Sessions only see the expunge on their next full poll.
    pub fn delete(
        &self,
        uids: impl IntoIterator<Item = Uid>,
    ) -> Result<Vec<Uid>, Error> {
        let mut state = self.state.write().unwrap();
        self.check_live()?;
        self.expunge_locked(&mut state, uids)
    }

    fn expunge_locked(
        &self,
        state: &mut MailboxState,
        uids: impl IntoIterator<Item = Uid>,
    ) -> Result<Vec<Uid>, Error> {
        let uids: BTreeSet<Uid> = uids.into_iter().collect();
        let mut updated = Vec::new();
        for uid in uids {
            if let Some(m) = state.messages.get(&uid) {
                if !m.is_expunged() {
                    let mut message = m.clone();
                    message.mark_expunged();
                    updated.push(message);
                }
            }
        }

        let expunged: Vec<Uid> = updated.iter().map(Message::uid).collect();
        self.commit_metas(state, updated)?;
        for uid in &expunged {
            state.unclaimed_recent.remove(uid);
        }

        if !expunged.is_empty() {
            info!("{}: Expunged {:?}", self.name(), expunged);
        }
        Ok(expunged)
    }

    /// Expunge every message with `\Deleted`, optionally restricted to
    /// `only`.
    pub(crate) fn expunge_deleted(
        &self,
        selected: &SelectedMailbox,
        only: Option<&SeqRange<Uid>>,
    ) -> Result<Vec<Uid>, Error> {
        if selected.read_only() {
            return Err(Error::MailboxReadOnly);
        }

        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let doomed: Vec<Uid> = state
            .active()
            .filter(|m| m.permanent_flags().contains(&Flag::Deleted))
            .map(|m| m.uid())
            .filter(|&uid| only.map_or(true, |only| only.contains(uid)))
            .collect();
        self.expunge_locked(&mut state, doomed)
    }

    /// Purge expunged messages which no session still has a sequence number
    /// for, removing them from storage.
    ///
    /// This scans the whole mailbox, so it is only ever run on request.
    /// Returns the purged UIDs.
    pub fn cleanup(&self) -> Result<Vec<Uid>, Error> {
        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let referenced = self.selected.referenced_uids();
        let doomed: Vec<Uid> = state
            .messages
            .values()
            .filter(|m| m.is_expunged() && !referenced.contains(&m.uid()))
            .map(|m| m.uid())
            .collect();

        for &uid in &doomed {
            self.store.remove(uid)?;
            state.messages.remove(&uid);
        }

        if !doomed.is_empty() {
            info!("{}: Purged {} messages", self.name(), doomed.len());
        }
        Ok(doomed)
    }
}

#[cfg(test)]
mod test {
    use super::super::test_prelude::*;

    #[test]
    fn delete_is_idempotent() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..3 {
            simple_append(mb);
        }

        assert_eq!(vec![Uid::u(2)], mb.delete(vec![Uid::u(2)]).unwrap());
        let after_once: Vec<Uid> = mb.uids().unwrap().collect();
        assert!(mb.delete(vec![Uid::u(2)]).unwrap().is_empty());
        assert_eq!(after_once, mb.uids().unwrap().collect::<Vec<_>>());
        assert_eq!(vec![Uid::u(1), Uid::u(3)], after_once);

        // Never-issued UIDs are ignored
        assert!(mb.delete(vec![Uid::u(17)]).unwrap().is_empty());

        let m = mb.get(Uid::u(2), FetchRequirement::Metadata).unwrap().unwrap();
        assert!(m.is_expunged());
    }

    #[test]
    fn cleanup_respects_session_views() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..3 {
            simple_append(mb);
        }

        let session = mb.select(false).unwrap();
        mb.delete(vec![Uid::u(1), Uid::u(2)]).unwrap();

        // The session still has sequence numbers for both
        assert!(mb.cleanup().unwrap().is_empty());
        assert!(mb
            .get(Uid::u(1), FetchRequirement::Metadata)
            .unwrap()
            .is_some());

        session.poll().unwrap();
        assert_eq!(vec![Uid::u(1), Uid::u(2)], mb.cleanup().unwrap());
        assert!(mb
            .get(Uid::u(1), FetchRequirement::Metadata)
            .unwrap()
            .is_none());
        assert_matches!(
            Err(Error::NxMessage),
            setup.backend.store(1234).unwrap().read(Uid::u(1))
        );

        // Purging never makes UIDs reusable
        assert_eq!(Uid::u(4), simple_append(mb));
    }

    #[test]
    fn expunge_deleted_messages() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..4 {
            simple_append(mb);
        }

        let session = mb.select(false).unwrap();
        session
            .store(&StoreRequest {
                ids: &SeqRange::parse("1:3", Uid::MAX).unwrap(),
                flags: &[Flag::Deleted],
                remove_listed: false,
                remove_unlisted: false,
                loud: false,
            })
            .unwrap();

        assert_eq!(
            vec![Uid::u(2)],
            session
                .expunge_deleted(Some(&SeqRange::just(Uid::u(2))))
                .unwrap()
        );
        assert_eq!(
            vec![Uid::u(1), Uid::u(3)],
            session.expunge_deleted(None).unwrap()
        );
        assert_eq!(vec![Uid::u(4)], mb.uids().unwrap().collect::<Vec<_>>());

        let ro = mb.select(true).unwrap();
        assert_matches!(Err(Error::MailboxReadOnly), ro.expunge_deleted(None));
    }

    #[test]
    fn failed_expunge_changes_nothing() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..3 {
            simple_append(mb);
        }

        let session = mb.select(false).unwrap();
        session
            .store(&StoreRequest {
                ids: &SeqRange::range(Uid::u(1), Uid::u(3)),
                flags: &[Flag::Deleted],
                remove_listed: false,
                remove_unlisted: false,
                loud: false,
            })
            .unwrap();

        let store = setup.backend.store(1234).unwrap();
        store.fail_write_after(2);
        assert_matches!(Err(Error::Io(_)), session.expunge_deleted(None));

        assert_eq!(
            vec![Uid::u(1), Uid::u(2), Uid::u(3)],
            mb.uids().unwrap().collect::<Vec<_>>()
        );
        assert!(store
            .load()
            .unwrap()
            .messages
            .iter()
            .all(|&(_, ref meta)| !meta.expunged));
        assert_eq!(3, mb.snapshot().unwrap().exists);

        assert_eq!(
            vec![Uid::u(1), Uid::u(2), Uid::u(3)],
            session.expunge_deleted(None).unwrap()
        );
        assert_eq!(0, mb.uids().unwrap().count());
    }
}
