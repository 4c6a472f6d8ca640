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

use log::info;

use super::*;
use crate::account::selected::SelectedMailbox;

impl MailboxData {
    /// Persist the permanent flags held by each of `messages`.
    ///
    /// Each message is updated atomically on its own. Messages which are
    /// expunged or no longer exist are skipped, as are messages whose flags
    /// are unchanged. Every session is notified of the changes.
    ///
    /// Returns the UIDs whose flags changed.
    pub fn save_flags(&self, messages: &[Message]) -> Result<Vec<Uid>, Error> {
        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let mut changed = Vec::new();
        let mut result = Ok(());
        for message in messages {
            if let Err(e) = self.update_flags_locked(
                &mut state,
                message.uid(),
                message.permanent_flags().clone(),
                &mut changed,
            ) {
                result = Err(e);
                break;
            }
        }

        // Whatever got written is visible, even if a later write failed
        self.selected.notify_changed(&changed);
        result.map(|()| changed)
    }

    /// Replace the flags of `uid` if it is active and they differ. Returns
    /// false if `uid` is not an active message.
    fn update_flags_locked(
        &self,
        state: &mut MailboxState,
        uid: Uid,
        flags: BTreeSet<Flag>,
        changed: &mut Vec<Uid>,
    ) -> Result<bool, Error> {
        let mut message = match state.messages.get(&uid) {
            Some(m) if !m.is_expunged() => m.clone(),
            _ => return Ok(false),
        };

        message.set_permanent_flags(flags);
        if message.permanent_flags()
            != state.messages[&uid].permanent_flags()
        {
            self.store.write_meta(uid, &message.to_meta())?;
            state.messages.insert(uid, message);
            changed.push(uid);
        }

        Ok(true)
    }

    pub(crate) fn store(
        &self,
        selected: &SelectedMailbox,
        request: &StoreRequest<'_>,
    ) -> Result<StoreResponse, Error> {
        if selected.read_only() {
            return Err(Error::MailboxReadOnly);
        }

        let listed: BTreeSet<Flag> = request
            .flags
            .iter()
            .filter(|f| !f.is_session_only())
            .cloned()
            .collect();
        let targets = selected.uids_in_view(request.ids);

        let mut state = self.state.write().unwrap();
        self.check_live()?;

        let mut ok = true;
        let mut updated = Vec::new();
        for &uid in &targets {
            let message = match state.messages.get(&uid) {
                Some(m) if !m.is_expunged() => m,
                _ => {
                    ok = false;
                    continue;
                }
            };

            let current = message.permanent_flags();
            let new_flags: BTreeSet<Flag> = if request.remove_listed {
                current.difference(&listed).cloned().collect()
            } else if request.remove_unlisted {
                listed.clone()
            } else {
                current.union(&listed).cloned().collect()
            };

            if new_flags != *current {
                let mut message = message.clone();
                message.set_permanent_flags(new_flags);
                updated.push(message);
            }
        }

        // Nothing is visible to any session unless the whole request was
        // written.
        let modified: Vec<Uid> = updated.iter().map(Message::uid).collect();
        self.commit_metas(&mut state, updated)?;

        self.selected.notify_changed(&modified);
        if request.loud {
            let mut session = selected.state().lock().unwrap();
            session.changed.extend(targets.iter().copied());
        }
        drop(state);

        if !modified.is_empty() {
            info!(
                "{} Stored flags on {} messages",
                selected.log_prefix(),
                modified.len()
            );
        }
        Ok(StoreResponse { ok, modified })
    }
}
