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

use std::mem;

use super::*;
use crate::account::selected::SelectedMailbox;

impl MailboxData {
    /// Bring the view of `selected` up to date.
    ///
    /// A mini poll only reports flag changes on messages already in the
    /// view; the view itself is left alone. Flag changes on messages not yet
    /// in the view are dropped, since the full poll that brings them into the
    /// view makes the client fetch them anyway.
    pub(crate) fn poll(
        &self,
        selected: &SelectedMailbox,
        mini: bool,
    ) -> Result<PollResponse, Error> {
        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let mut response = PollResponse::default();
        let mut new_uids = Vec::new();

        if !mini {
            let mut session = selected.state().lock().unwrap();

            for (ix, &uid) in session.view.iter().enumerate().rev() {
                let gone = state
                    .messages
                    .get(&uid)
                    .map_or(true, Message::is_expunged);
                if gone {
                    if let Some(seqnum) = Seqnum::from_index(ix) {
                        response.expunge.push((seqnum, uid));
                    }
                }
            }

            for &(_, uid) in &response.expunge {
                session.flags.forget(uid);
                session.changed.remove(&uid);
            }
            if !response.expunge.is_empty() {
                let messages = &state.messages;
                session.view.retain(|uid| {
                    messages.get(uid).map_or(false, |m| !m.is_expunged())
                });
            }

            let last_uid = session.last_uid;
            new_uids = state
                .active()
                .map(Message::uid)
                .filter(|&uid| last_uid.map_or(true, |last| uid > last))
                .collect();
            if let Some(&last) = new_uids.last() {
                session.view.extend_from_slice(&new_uids);
                session.last_uid = Some(last);
            }

            if !response.expunge.is_empty() || !new_uids.is_empty() {
                response.exists = Some(session.view.len());
            }
        }

        if !mini {
            self.claim_recent_locked(&mut state, selected);
        }

        let mut session = selected.state().lock().unwrap();
        if !new_uids.is_empty() {
            response.recent = Some(session.flags.recent_count());
        }

        let changed = mem::take(&mut session.changed);
        response.fetch = changed
            .into_iter()
            .filter(|uid| session.view.binary_search(uid).is_ok())
            .filter(|uid| new_uids.binary_search(uid).is_err())
            .collect();

        Ok(response)
    }
}
