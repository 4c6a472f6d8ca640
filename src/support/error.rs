//-
// Copyright (c) 2020, Jason Lingle
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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsafe mailbox name or keyword")]
    UnsafeName,
    #[error("No such mailbox")]
    NxMailbox,
    /// Like `NxMailbox`, but the caller indicated that creating the mailbox
    /// could make the operation succeed (IMAP `[TRYCREATE]`).
    #[error("No such mailbox (try creating it)")]
    NxMailboxTryCreate,
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("Mailbox has child mailboxes")]
    MailboxHasInferiors,
    #[error("Operation not allowed on INBOX")]
    BadOperationOnInbox,
    #[error("Mailbox cannot be renamed to itself")]
    RenameToSelf,
    #[error("Mailbox cannot be renamed into its own hierarchy")]
    RenameIntoSelf,
    #[error("No such message")]
    NxMessage,
    #[error("Message content not loaded")]
    ContentNotLoaded,
    /// The UID space of the mailbox is exhausted. The mailbox can accept no
    /// more messages.
    #[error("Mailbox full")]
    MailboxFull,
    #[error("Mailbox is read-only")]
    MailboxReadOnly,
    #[error("Unknown system flag")]
    NxFlag,
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Logging initialisation failed: {0}")]
    Logging(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}
