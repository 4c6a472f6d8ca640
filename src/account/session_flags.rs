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

use std::collections::{BTreeMap, BTreeSet};

use super::model::{Flag, Uid};

/// One session's private overlay of flags on top of the permanent flags of
/// the messages in a mailbox.
///
/// In practice the only session-only flag is `\Recent`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionFlags {
    flags: BTreeMap<Uid, BTreeSet<Flag>>,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the overlay for `uid`, if the session has any flags on it.
    pub fn get(&self, uid: Uid) -> Option<&BTreeSet<Flag>> {
        self.flags.get(&uid)
    }

    pub fn has(&self, uid: Uid, flag: &Flag) -> bool {
        self.flags.get(&uid).map_or(false, |f| f.contains(flag))
    }

    /// Add `flag` to `uid`. Returns whether it was newly added.
    pub fn add(&mut self, uid: Uid, flag: Flag) -> bool {
        self.flags.entry(uid).or_default().insert(flag)
    }

    /// Remove `flag` from `uid`. Returns whether it was present.
    pub fn remove(&mut self, uid: Uid, flag: &Flag) -> bool {
        let removed = match self.flags.get_mut(&uid) {
            Some(f) => f.remove(flag),
            None => false,
        };

        if self.flags.get(&uid).map_or(false, BTreeSet::is_empty) {
            self.flags.remove(&uid);
        }

        removed
    }

    pub fn add_recent(&mut self, uid: Uid) -> bool {
        self.add(uid, Flag::Recent)
    }

    pub fn remove_recent(&mut self, uid: Uid) -> bool {
        self.remove(uid, &Flag::Recent)
    }

    pub fn is_recent(&self, uid: Uid) -> bool {
        self.has(uid, &Flag::Recent)
    }

    /// All UIDs currently `\Recent` in this session, ascending.
    pub fn recent_uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.flags
            .iter()
            .filter(|&(_, f)| f.contains(&Flag::Recent))
            .map(|(&uid, _)| uid)
    }

    pub fn recent_count(&self) -> usize {
        self.recent_uids().count()
    }

    /// Drop every flag on `uid`, e.g. once the session has seen it expunged.
    pub fn forget(&mut self, uid: Uid) {
        self.flags.remove(&uid);
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
