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

//! The MIME side of the mailbox layer: turning raw message bytes into a
//! content tree, and answering FETCH- and SEARCH-style questions about it.

pub mod encoded_word;
pub mod fetch;
pub mod grovel;
pub mod header;
pub mod quoted_printable;

use std::fmt;

use self::grovel::MimePart;
use crate::support::error::Error;

/// The raw bytes of a message together with its parsed content tree.
///
/// Immutable once constructed.
pub struct MessageContent {
    raw: Vec<u8>,
    root: MimePart,
}

impl MessageContent {
    pub fn parse(raw: Vec<u8>) -> Result<Self, Error> {
        let root = grovel::grovel(&raw)?;
        Ok(MessageContent { raw, root })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn root(&self) -> &MimePart {
        &self.root
    }
}

impl fmt::Debug for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MessageContent")
            .field("len", &self.raw.len())
            .field("content_type", &self.root.content_type)
            .finish()
    }
}
