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

use super::model::{Flag, Seqnum, Uid};

/// Everything a client is told about a mailbox upon selecting it, or in
/// response to `STATUS`.
///
/// All the counters are computed in one pass over the mailbox while it is
/// locked, so they are always consistent with each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSnapshot {
    pub name: String,
    pub read_only: bool,
    pub uid_validity: u32,
    /// `* FLAGS`: the system flags plus every keyword in use.
    pub flags: Vec<Flag>,
    /// `* OK [PERMANENTFLAGS]`: flags which may be stored. Empty if the
    /// mailbox is read-only.
    pub permanent_flags: Vec<Flag>,
    /// Whether clients may create new keywords (`\*` in `PERMANENTFLAGS`).
    pub keywords_allowed: bool,
    /// Flags which exist only within a session.
    pub session_flags: Vec<Flag>,
    /// `* EXISTS`
    pub exists: usize,
    /// `* RECENT`
    pub recent: usize,
    /// `STATUS (UNSEEN)`
    pub unseen: usize,
    /// `* OK [UNSEEN]`, the sequence number of the first message without
    /// `\Seen`.
    pub first_unseen: Option<Seqnum>,
    /// `* OK [UIDNEXT]`
    pub next_uid: Uid,
}
