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

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// The configuration for a mailbox store.
///
/// This is typically stored in a file named `crymap.toml` beside the mail
/// data. Every section is optional.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Where and how mailboxes are stored.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Policy for the mailboxes every account starts with.
    #[serde(default)]
    pub mailboxes: MailboxesConfig,

    /// Where log records go.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Keep everything in process memory. Nothing survives a restart.
    Memory,
    /// Keep everything in a directory tree under `StorageConfig::root`.
    Filesystem,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Memory
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// The root directory of the file system backend. Ignored by the memory
    /// backend.
    pub root: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MailboxesConfig {
    /// Mailboxes (besides INBOX, which always exists) created when the
    /// mailbox set is first opened.
    ///
    /// Mailboxes named `Archive`, `Drafts`, `Sent`, `Spam` and `Trash` are
    /// reported with the corresponding RFC 6154 special-use attribute.
    pub provision: Vec<String>,
    /// Whether provisioned mailboxes are also subscribed.
    pub auto_subscribe: bool,
}

impl Default for MailboxesConfig {
    fn default() -> Self {
        MailboxesConfig {
            provision: ["Archive", "Drafts", "Sent", "Spam", "Trash"]
                .iter()
                .map(|&s| s.to_owned())
                .collect(),
            auto_subscribe: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// A log4rs configuration file. When set, `level` is ignored.
    pub config_file: Option<PathBuf>,
    /// The minimum level written to stderr when there is no `config_file`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            config_file: None,
            level: "info".to_owned(),
        }
    }
}

impl SystemConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = fs::read_to_string(path)?;
        data.parse()
    }
}

impl FromStr for SystemConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }
}
