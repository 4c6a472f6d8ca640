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

//! Mailbox and message state for an IMAP server.
//!
//! The entry point is `MailboxSet`, which holds every mailbox of one account.
//! Sessions select a `MailboxData` to obtain a `SelectedMailbox`, which tracks
//! the session's own view of sequence numbers and `\Recent`.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod account;
pub mod mime;
pub mod storage;
pub mod support;

pub use crate::account::mailbox::{
    CopyResponse, MailboxData, PollResponse, StoreRequest, StoreResponse,
};
pub use crate::account::mailbox_set::{MailboxInfo, MailboxSet};
pub use crate::account::message::Message;
pub use crate::account::model::*;
pub use crate::account::selected::{SelectedMailbox, SelectedSet};
pub use crate::account::session_flags::SessionFlags;
pub use crate::account::snapshot::MailboxSnapshot;
pub use crate::support::error::Error;
pub use crate::support::system_config::SystemConfig;

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        // Another test binary may already own the global logger; that's fine.
        let _ = support::logging::init_console(log::LevelFilter::Debug);
    })
}
