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

use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use log::{info, warn};

use super::*;
use crate::account::selected::SelectedMailbox;
use crate::mime::MessageContent;

impl MailboxData {
    /// Add `message` to this mailbox, assigning it the next UID.
    ///
    /// If `recent` is set, the first session to claim `\Recent` gets it on
    /// this message.
    ///
    /// Returns the message as added, with its new UID. Nothing is changed if
    /// this fails; in particular, no UID is used up.
    pub fn add(
        &self,
        message: Message,
        recent: bool,
    ) -> Result<Message, Error> {
        if !message.has_content() {
            return Err(Error::ContentNotLoaded);
        }

        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let uid = state.next_uid;
        if uid > Uid::MAX {
            self.log_full();
            return Err(Error::MailboxFull);
        }
        let next_uid = uid.next().unwrap_or(Uid::END);

        let added = message.copy(uid);
        self.store
            .append(uid, next_uid, &added.to_meta(), added.raw())?;

        state.next_uid = next_uid;
        state.messages.insert(uid, added.without_content());
        if recent {
            state.unclaimed_recent.insert(uid);
        }

        info!("{}: Added message {}", self.name(), uid);
        Ok(added)
    }

    /// Look up the message with the given UID.
    ///
    /// Expunged messages are returned (marked as such) until they are purged
    /// by `cleanup()`. Content is loaded only if `requirement` asks for it.
    pub fn get(
        &self,
        uid: Uid,
        requirement: FetchRequirement,
    ) -> Result<Option<Message>, Error> {
        let message = {
            let state = self.state.read().unwrap();
            self.check_live()?;
            match state.messages.get(&uid) {
                Some(m) => m.clone(),
                None => return Ok(None),
            }
        };

        match requirement {
            FetchRequirement::Metadata => Ok(Some(message)),
            FetchRequirement::Content => self.load_content(message),
        }
    }

    fn load_content(
        &self,
        message: Message,
    ) -> Result<Option<Message>, Error> {
        let raw = match self.store.read(message.uid()) {
            Ok(raw) => raw,
            // Purged since we looked
            Err(Error::NxMessage) => return Ok(None),
            Err(e) => return Err(e),
        };

        let content = MessageContent::parse(raw)?;
        Ok(Some(message.with_content(Arc::new(content))))
    }

    /// Iterate the UIDs of the active messages, ascending.
    ///
    /// The traversal is lazy and holds no lock between items, so it may or
    /// may not see changes made while it runs. Each call starts afresh.
    pub fn uids(&self) -> Result<impl Iterator<Item = Uid> + '_, Error> {
        Ok(self.cursor()?.map(|m| m.uid()))
    }

    /// Like `uids()`, but yields the messages themselves, without content.
    pub fn messages(&self) -> Result<Cursor<'_>, Error> {
        self.cursor()
    }

    /// Like `messages()`, but yields `(uid, message)` pairs and loads content
    /// if `requirement` asks for it.
    ///
    /// Messages purged between being found and having their content loaded
    /// are skipped.
    pub fn items(
        &self,
        requirement: FetchRequirement,
    ) -> Result<impl Iterator<Item = Result<(Uid, Message), Error>> + '_, Error>
    {
        Ok(self.cursor()?.filter_map(move |m| {
            let m = match requirement {
                FetchRequirement::Metadata => Ok(Some(m)),
                FetchRequirement::Content => self.load_content(m),
            };

            match m {
                Ok(Some(m)) => Some(Ok((m.uid(), m))),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    fn cursor(&self) -> Result<Cursor<'_>, Error> {
        self.check_live()?;
        Ok(Cursor {
            mailbox: self,
            after: None,
        })
    }

    /// Resolve `set` against the view of `selected` and yield the matching
    /// messages with their sequence numbers, ascending.
    ///
    /// Entries that don't resolve are skipped, including sequence numbers
    /// whose message was expunged since the session last polled.
    pub fn find<'a>(
        &'a self,
        set: &SequenceSet,
        selected: &SelectedMailbox,
        requirement: FetchRequirement,
    ) -> Result<
        impl Iterator<Item = Result<(Seqnum, Message), Error>> + 'a,
        Error,
    > {
        self.check_live()?;
        let resolved = selected.resolve(set);
        Ok(resolved.into_iter().filter_map(move |(seqnum, uid)| {
            match self.get(uid, requirement) {
                Ok(Some(m)) if !m.is_expunged() => Some(Ok((seqnum, m))),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }

    /// Copy the messages with the given UIDs into `dest`, which may be this
    /// mailbox.
    ///
    /// The copies carry the content and permanent flags of the originals and
    /// are `\Recent` in `dest`. UIDs which no longer name an active message
    /// are skipped.
    pub fn copy_messages(
        &self,
        uids: &[Uid],
        dest: &MailboxData,
    ) -> Result<CopyResponse, Error> {
        dest.check_live()?;

        let mut response = CopyResponse {
            uid_validity: dest.uid_validity(),
            from_uids: Vec::new(),
            to_uids: Vec::new(),
        };

        for &uid in uids {
            let message = match self.get(uid, FetchRequirement::Content)? {
                Some(m) if !m.is_expunged() => m,
                _ => {
                    warn!(
                        "{}: Not copying expunged message {}",
                        self.name(),
                        uid
                    );
                    continue;
                }
            };

            let copy = dest.add(message, true)?;
            response.from_uids.push(uid);
            response.to_uids.push(copy.uid());
        }

        Ok(response)
    }
}

/// A lazy traversal of the active messages of a mailbox.
///
/// Each step takes the read lock, finds the first active message after the
/// last one yielded, and releases the lock.
#[derive(Debug)]
pub struct Cursor<'a> {
    mailbox: &'a MailboxData,
    after: Option<Uid>,
}

impl<'a> Iterator for Cursor<'a> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.mailbox.is_deleted() {
            return None;
        }

        let state = self.mailbox.state.read().unwrap();
        let next = match self.after {
            None => state.active().next(),
            Some(after) => state
                .messages
                .range((Excluded(after), Unbounded))
                .map(|(_, m)| m)
                .find(|m| !m.is_expunged()),
        }
        .cloned();

        if let Some(ref m) = next {
            self.after = Some(m.uid());
        }
        next
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::super::test_prelude::*;

    #[test]
    fn add_assigns_sequential_uids() {
        let setup = set_up();
        let mb = &setup.mailbox;

        assert_eq!(Uid::u(1), mb.next_uid().unwrap());
        assert_eq!(Uid::u(1), simple_append(mb));
        assert_eq!(Uid::u(2), simple_append(mb));
        assert_eq!(Uid::u(3), simple_append(mb));
        assert_eq!(Uid::u(4), mb.next_uid().unwrap());

        let added = mb.add(test_message("content"), false).unwrap();
        assert_eq!(Uid::u(4), added.uid());
        assert!(added.has_content());
        assert_eq!(vec!["content".to_owned()], added.get_header("Subject"));
    }

    #[test]
    fn add_requires_content() {
        let setup = set_up();
        let mb = &setup.mailbox;
        let uid = simple_append(mb);
        let meta_only =
            mb.get(uid, FetchRequirement::Metadata).unwrap().unwrap();
        assert!(!meta_only.has_content());
        assert_matches!(Err(Error::ContentNotLoaded), mb.add(meta_only, false));
        assert_eq!(Uid::u(2), mb.next_uid().unwrap());
    }

    #[test]
    fn failed_add_consumes_no_uid() {
        let setup = set_up();
        let mb = &setup.mailbox;
        simple_append(mb);

        let store = setup.backend.store(1234).unwrap();
        store.set_fail_writes(true);
        assert_matches!(Err(Error::Io(_)), mb.add(test_message("x"), false));
        assert_eq!(Uid::u(2), mb.next_uid().unwrap());
        assert_eq!(vec![Uid::u(1)], mb.uids().unwrap().collect::<Vec<_>>());

        store.set_fail_writes(false);
        assert_eq!(Uid::u(2), simple_append(mb));
    }

    #[test]
    fn full_mailbox_rejects_adds() {
        let setup = set_up();
        let mb = &setup.mailbox;
        mb.state.write().unwrap().next_uid = Uid::MAX;

        let added = mb.add(test_message("last"), false).unwrap();
        assert_eq!(Uid::MAX, added.uid());
        assert_eq!(Uid::END, mb.next_uid().unwrap());
        assert_matches!(
            Err(Error::MailboxFull),
            mb.add(test_message("x"), false)
        );
        assert_eq!(Uid::END, mb.next_uid().unwrap());
    }

    #[test]
    fn get_metadata_and_content() {
        let setup = set_up();
        let mb = &setup.mailbox;
        let uid = mb.add(test_message("hello"), false).unwrap().uid();

        let meta = mb.get(uid, FetchRequirement::Metadata).unwrap().unwrap();
        assert_eq!(uid, meta.uid());
        assert!(!meta.has_content());

        let full = mb.get(uid, FetchRequirement::Content).unwrap().unwrap();
        assert!(full.contains(b"body of hello"));

        assert!(mb
            .get(Uid::u(99), FetchRequirement::Content)
            .unwrap()
            .is_none());
    }

    #[test]
    fn iteration_is_lazy_and_restartable() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..5 {
            simple_append(mb);
        }
        mb.delete(vec![Uid::u(2), Uid::u(4)]).unwrap();

        let mut uids = mb.uids().unwrap();
        assert_eq!(Some(Uid::u(1)), uids.next());
        // Changes made mid-traversal don't break it
        mb.delete(vec![Uid::u(3)]).unwrap();
        simple_append(mb);
        assert_eq!(
            vec![Uid::u(5), Uid::u(6)],
            uids.collect::<Vec<_>>()
        );

        assert_eq!(
            vec![Uid::u(1), Uid::u(5), Uid::u(6)],
            mb.uids().unwrap().collect::<Vec<_>>()
        );
        assert_eq!(
            vec![Uid::u(1), Uid::u(5), Uid::u(6)],
            mb.messages().unwrap().map(|m| m.uid()).collect::<Vec<_>>()
        );

        let items = mb
            .items(FetchRequirement::Content)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(3, items.len());
        assert!(items.iter().all(|&(uid, ref m)| uid == m.uid()
            && m.has_content()));
    }

    #[test]
    fn find_resolves_against_session_view() {
        let setup = set_up();
        let mb = &setup.mailbox;
        for _ in 0..7 {
            simple_append(mb);
        }
        mb.delete(vec![Uid::u(3), Uid::u(5), Uid::u(6)]).unwrap();

        let session = mb.select(false).unwrap();
        let found = mb
            .find(
                &SequenceSet::seqnums("2:3").unwrap(),
                &session,
                FetchRequirement::Metadata,
            )
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            vec![(Seqnum::u(2), Uid::u(2)), (Seqnum::u(3), Uid::u(4))],
            found
                .iter()
                .map(|&(s, ref m)| (s, m.uid()))
                .collect::<Vec<_>>()
        );

        let found = mb
            .find(
                &SequenceSet::seqnums("3:*,9").unwrap(),
                &session,
                FetchRequirement::Metadata,
            )
            .unwrap()
            .map(|r| r.unwrap().1.uid())
            .collect::<Vec<_>>();
        assert_eq!(vec![Uid::u(4), Uid::u(7)], found);

        let found = mb
            .find(
                &SequenceSet::uids("2:5,*").unwrap(),
                &session,
                FetchRequirement::Content,
            )
            .unwrap()
            .map(|r| r.unwrap())
            .map(|(s, m)| (s, m.uid(), m.has_content()))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                (Seqnum::u(2), Uid::u(2), true),
                (Seqnum::u(3), Uid::u(4), true),
                (Seqnum::u(4), Uid::u(7), true),
            ],
            found
        );

        // Expunged but not yet polled: the slot keeps its sequence number
        // but is skipped
        mb.delete(vec![Uid::u(4)]).unwrap();
        let found = mb
            .find(
                &SequenceSet::seqnums("2:3").unwrap(),
                &session,
                FetchRequirement::Metadata,
            )
            .unwrap()
            .map(|r| r.unwrap())
            .map(|(s, m)| (s, m.uid(), m.is_expunged()))
            .collect::<Vec<_>>();
        assert_eq!(vec![(Seqnum::u(2), Uid::u(2), false)], found);
        assert_eq!(Some(Uid::u(4)), session.seqnum_to_uid(Seqnum::u(3)));
    }

    #[test]
    fn copy_between_mailboxes() {
        let setup = set_up();
        let src = &setup.mailbox;
        let dst = MailboxData::open(
            "Archive",
            setup.backend.create_store(99).unwrap(),
        )
        .unwrap();

        let mut m = test_message("copied");
        m.set_permanent_flags(vec![Flag::Flagged]);
        src.add(m, false).unwrap();
        simple_append(src);
        src.delete(vec![Uid::u(2)]).unwrap();

        let response = src
            .copy_messages(&[Uid::u(1), Uid::u(2), Uid::u(3)], &dst)
            .unwrap();
        assert_eq!(99, response.uid_validity);
        assert_eq!(vec![Uid::u(1)], response.from_uids);
        assert_eq!(vec![Uid::u(1)], response.to_uids);

        let copy = dst
            .get(Uid::u(1), FetchRequirement::Content)
            .unwrap()
            .unwrap();
        assert!(copy.contains(b"body of copied"));
        assert!(copy.permanent_flags().contains(&Flag::Flagged));
        assert_eq!(1, dst.snapshot().unwrap().recent);
    }

    proptest! {
        #[test]
        fn uids_strictly_increase(ops in prop::collection::vec(
            prop::option::of(0usize..8), 1..40,
        )) {
            let setup = set_up();
            let mb = &setup.mailbox;
            let mut issued = BTreeSet::new();
            let mut last = None;

            for op in ops {
                match op {
                    None => {
                        let uid = simple_append(mb);
                        prop_assert!(last.map_or(true, |l| uid > l));
                        prop_assert!(issued.insert(uid));
                        last = Some(uid);
                    }
                    Some(ix) => {
                        let victims: Vec<Uid> =
                            issued.iter().copied().skip(ix).take(2).collect();
                        mb.delete(victims).unwrap();
                    }
                }

                let active: Vec<Uid> = mb.uids().unwrap().collect();
                prop_assert!(active.windows(2).all(|w| w[0] < w[1]));
                if let Some(last) = last {
                    prop_assert!(mb.next_uid().unwrap() > last);
                }
            }
        }
    }
}
