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

//! The durable side of mailboxes.
//!
//! Everything above this module works on in-memory state and calls through
//! to a `MessageStore` (one per mailbox) or the `Backend` (one per account)
//! whenever a change must survive a restart. The layer above holds its own
//! locks while calling in, so implementations need only make each individual
//! call atomic.

pub mod fs;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::account::model::{Flag, Uid};
use crate::support::error::Error;

/// The durable metadata of one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Permanent flags only; never contains `\Recent`.
    pub flags: BTreeSet<Flag>,
    pub internal_date: DateTime<FixedOffset>,
    pub expunged: bool,
}

/// What a `MessageStore` holds, as read back by `load()`.
#[derive(Clone, Debug)]
pub struct StoredMailbox {
    pub uid_validity: u32,
    /// Strictly greater than any UID ever issued by the store.
    pub next_uid: Uid,
    /// Every resident message, ascending by UID.
    pub messages: Vec<(Uid, MessageMeta)>,
}

/// Durable storage for the messages of one mailbox.
pub trait MessageStore: fmt::Debug + Send + Sync {
    fn load(&self) -> Result<StoredMailbox, Error>;

    /// Durably store a new message under `uid` and advance the stored UID
    /// counter to `next_uid`.
    ///
    /// If this fails, the message must not be visible to a later `load()`,
    /// though the UID counter may have advanced.
    fn append(
        &self,
        uid: Uid,
        next_uid: Uid,
        meta: &MessageMeta,
        raw: &[u8],
    ) -> Result<(), Error>;

    /// Read the raw bytes of a resident message.
    ///
    /// Fails with `NxMessage` if there is no such message.
    fn read(&self, uid: Uid) -> Result<Vec<u8>, Error>;

    /// Atomically replace the metadata of a resident message.
    fn write_meta(&self, uid: Uid, meta: &MessageMeta) -> Result<(), Error>;

    /// Remove a message entirely. Removing a message that does not exist is
    /// not an error.
    fn remove(&self, uid: Uid) -> Result<(), Error>;
}

/// The account-wide index of mailboxes.
///
/// Mailboxes are stored under their UID validity, which never changes, so
/// renames only ever touch the registry. The registry is always written as a
/// whole, which makes each create, delete or rename all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Mailbox name to UID validity.
    pub mailboxes: BTreeMap<String, u32>,
    pub subscriptions: BTreeSet<String>,
    /// The greatest UID validity ever issued for this account.
    pub last_uid_validity: u32,
}

/// Durable storage for one account.
pub trait Backend: fmt::Debug + Send + Sync {
    /// Load the registry, or an empty one if it has never been saved.
    fn load_registry(&self) -> Result<Registry, Error>;
    fn save_registry(&self, registry: &Registry) -> Result<(), Error>;

    /// Create a new, empty store for a mailbox with the given UID validity.
    fn create_store(
        &self,
        uid_validity: u32,
    ) -> Result<Arc<dyn MessageStore>, Error>;
    fn open_store(
        &self,
        uid_validity: u32,
    ) -> Result<Arc<dyn MessageStore>, Error>;
    /// Destroy a store and everything in it. Destroying a store that does not
    /// exist is not an error.
    fn destroy_store(&self, uid_validity: u32) -> Result<(), Error>;
}

/// 2020-01-01T00:00:00Z
const UID_VALIDITY_EPOCH: i64 = 1577836800;

/// Choose the UID validity for a new mailbox.
///
/// This is the number of seconds since 2020-01-01, or `last + 1` if that is
/// not greater than `last`, so that a mailbox deleted and recreated within
/// the same second still gets a fresh UID validity.
pub fn new_uid_validity(last: u32) -> u32 {
    let now = Utc::now().timestamp() - UID_VALIDITY_EPOCH;
    let now = if now < 1 {
        1
    } else if now > i64::from(u32::MAX) {
        u32::MAX
    } else {
        now as u32
    };

    now.max(last.saturating_add(1))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uid_validity_is_strictly_increasing() {
        let a = new_uid_validity(0);
        assert!(a > 0);
        let b = new_uid_validity(a);
        assert!(b > a);
        assert_eq!(a + 1_000_000, new_uid_validity(a + 999_999));
    }
}
