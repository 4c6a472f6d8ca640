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

use std::fmt;
use std::sync::{Arc, Mutex};

/// Tracks text that should be included at the start of every log statement
/// concerning one session's view of a mailbox.
///
/// Clones of a `LogPrefix` share the same underlying data, so a rename of the
/// mailbox is reflected in the logs of every session that has it selected.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    mailbox: String,
    session: u64,
    read_only: bool,
}

impl LogPrefix {
    pub fn new(mailbox: &str, session: u64, read_only: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                mailbox: sanitise(mailbox),
                session,
                read_only,
            })),
        }
    }

    pub fn set_mailbox(&self, mailbox: &str) {
        self.inner.lock().unwrap().mailbox = sanitise(mailbox);
    }

    pub fn session(&self) -> u64 {
        self.inner.lock().unwrap().session
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        write!(f, "{}#{}", inner.mailbox, inner.session)?;
        if inner.read_only {
            write!(f, "[ro]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogPrefix({})", self)
    }
}

fn sanitise(s: &str) -> String {
    let mut s: String = s.chars().filter(|c| !c.is_control()).collect();
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
