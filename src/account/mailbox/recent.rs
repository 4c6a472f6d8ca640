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

//! `\Recent` is a session-only flag which, on each new message, at most one
//! session gets to see.
//!
//! A message added with `recent` set goes into the mailbox's unclaimed set.
//! The first read-write session to claim (which happens on select, on a full
//! poll, or explicitly) moves everything in the unclaimed set into its own
//! overlay. Claiming happens under the mailbox write lock, which `add` also
//! takes, so no message can be claimed twice.
//!
//! Read-only sessions never claim, and so never see `\Recent` at all.

use std::mem;

use log::info;

use super::*;
use crate::account::selected::SelectedMailbox;

impl MailboxData {
    /// Claim `\Recent` for `selected` on every message nobody has claimed
    /// yet. Returns the UIDs claimed.
    pub fn claim_recent(
        &self,
        selected: &SelectedMailbox,
    ) -> Result<Vec<Uid>, Error> {
        let mut state = self.state.write().unwrap();
        self.check_live()?;
        Ok(self.claim_recent_locked(&mut state, selected))
    }

    pub(super) fn claim_recent_locked(
        &self,
        state: &mut MailboxState,
        selected: &SelectedMailbox,
    ) -> Vec<Uid> {
        if state.unclaimed_recent.is_empty() {
            return Vec::new();
        }

        let claimed: Vec<Uid> = {
            let mut session = selected.state().lock().unwrap();
            if session.read_only {
                return Vec::new();
            }

            let unclaimed = mem::take(&mut state.unclaimed_recent);
            let claimed: Vec<Uid> = unclaimed
                .into_iter()
                .filter(|uid| {
                    state.messages.get(uid).map_or(false, |m| !m.is_expunged())
                })
                .collect();
            for &uid in &claimed {
                session.flags.add_recent(uid);
            }
            claimed
        };

        self.selected.strip_recent(&claimed, selected.id());
        if !claimed.is_empty() {
            info!(
                "{} Claimed \\Recent on {} messages",
                selected.log_prefix(),
                claimed.len()
            );
        }
        claimed
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use rayon::prelude::*;

    use super::super::test_prelude::*;

    #[test]
    fn first_session_claims() {
        let setup = set_up();
        let mb = &setup.mailbox;
        let uid = recent_append(mb);
        simple_append(mb);
        assert_eq!(1, mb.snapshot().unwrap().recent);

        let a = mb.select(false).unwrap();
        let b = mb.select(false).unwrap();
        assert!(a.session_flags().is_recent(uid));
        assert!(!b.session_flags().is_recent(uid));
        assert_eq!(1, a.snapshot().unwrap().recent);
        assert_eq!(0, b.snapshot().unwrap().recent);
        assert_eq!(0, mb.snapshot().unwrap().recent);

        let m = mb.get(uid, FetchRequirement::Metadata).unwrap().unwrap();
        assert!(a.get_flags(&m).contains(&Flag::Recent));
        assert!(!b.get_flags(&m).contains(&Flag::Recent));
        assert!(!m.permanent_flags().contains(&Flag::Recent));

        // New arrivals go to whoever claims first
        let uid2 = recent_append(mb);
        assert_eq!(vec![uid2], b.claim_recent().unwrap());
        assert!(a.claim_recent().unwrap().is_empty());
        assert!(!a.session_flags().is_recent(uid2));
    }

    #[test]
    fn read_only_sessions_never_claim() {
        let setup = set_up();
        let mb = &setup.mailbox;
        let uid = recent_append(mb);

        let ro = mb.select(true).unwrap();
        assert!(ro.claim_recent().unwrap().is_empty());
        assert_eq!(0, ro.snapshot().unwrap().recent);
        assert_eq!(1, mb.snapshot().unwrap().recent);

        let rw = mb.select(false).unwrap();
        assert!(rw.session_flags().is_recent(uid));
        assert!(!ro.session_flags().is_recent(uid));
    }

    #[test]
    fn expunged_messages_are_not_claimed() {
        let setup = set_up();
        let mb = &setup.mailbox;
        let uid = recent_append(mb);
        mb.delete(vec![uid]).unwrap();

        let session = mb.select(false).unwrap();
        assert!(session.claim_recent().unwrap().is_empty());
        assert_eq!(0, mb.snapshot().unwrap().recent);
    }

    #[test]
    fn existing_messages_are_not_recent_for_new_sessions() {
        let setup = set_up();
        let mb = &setup.mailbox;

        assert_eq!(Uid::u(1), mb.next_uid().unwrap());
        for expected in 1..=3 {
            assert_eq!(Uid::u(expected), simple_append(mb));
        }
        assert_eq!(Uid::u(4), mb.next_uid().unwrap());

        mb.delete(vec![Uid::u(2)]).unwrap();
        assert_eq!(
            vec![Uid::u(1), Uid::u(3)],
            mb.uids().unwrap().collect::<Vec<_>>()
        );
        assert_eq!(2, mb.snapshot().unwrap().exists);

        let _first = mb.select(false).unwrap();
        let second = mb.select(false).unwrap();
        assert!(second.claim_recent().unwrap().is_empty());
        assert_eq!(0, second.snapshot().unwrap().recent);
    }

    #[test]
    fn concurrent_claims_are_exclusive() {
        let setup = set_up();
        let mb = Arc::clone(&setup.mailbox);

        let sessions: Vec<SelectedMailbox> =
            (0..8).map(|_| mb.select(false).unwrap()).collect();

        (0..200usize).into_par_iter().for_each(|i| {
            recent_append(&mb);
            sessions[i % sessions.len()].claim_recent().unwrap();
        });
        for session in &sessions {
            session.poll().unwrap();
        }

        let mut seen = BTreeSet::new();
        for session in &sessions {
            for uid in session.session_flags().recent_uids() {
                assert!(seen.insert(uid), "{} claimed twice", uid);
            }
        }
        assert_eq!(200, seen.len());
        assert_eq!(
            200,
            sessions
                .iter()
                .map(|s| s.snapshot().unwrap().recent)
                .sum::<usize>()
        );
    }
}
