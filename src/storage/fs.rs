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

//! Storage in a plain directory tree.
//!
//! ```text
//! root/
//!   registry.cbor
//!   tmp/
//!   mailboxes/<uid-validity>/
//!     mailbox.toml
//!     next-uid
//!     messages/<uid>.eml
//!     messages/<uid>.meta
//! ```
//!
//! Every file is written to `tmp/` first and then renamed into place, so a
//! crash leaves either the old or the new version of each file. A message is
//! written `.eml` first, then `.meta`, then `next-uid`; `load()` treats an
//! `.eml` without a `.meta` as never having been added, but still never
//! reissues its UID.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::*;
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};

#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
    tmp: PathBuf,
    mailboxes: PathBuf,
}

/// The content of `mailbox.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MailboxConfig {
    uid_validity: u32,
    created: DateTime<Utc>,
}

impl FsBackend {
    /// Open the tree at `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let tmp = root.join("tmp");
        let mailboxes = root.join("mailboxes");
        fs::create_dir_all(&tmp)?;
        fs::create_dir_all(&mailboxes)?;

        Ok(FsBackend {
            root,
            tmp,
            mailboxes,
        })
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join("registry.cbor")
    }

    fn store_path(&self, uid_validity: u32) -> PathBuf {
        self.mailboxes.join(uid_validity.to_string())
    }
}

impl Backend for FsBackend {
    fn load_registry(&self) -> Result<Registry, Error> {
        match file_ops::slurp_cbor(self.registry_path()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Ok(Registry::default())
            }
            r => r,
        }
    }

    fn save_registry(&self, registry: &Registry) -> Result<(), Error> {
        file_ops::spit_cbor(&self.tmp, self.registry_path(), true, registry)
    }

    fn create_store(
        &self,
        uid_validity: u32,
    ) -> Result<Arc<dyn MessageStore>, Error> {
        let path = self.store_path(uid_validity);
        fs::create_dir(&path).on_exists(Error::MailboxExists)?;
        fs::create_dir(path.join("messages"))?;

        let config = MailboxConfig {
            uid_validity,
            created: Utc::now(),
        };
        file_ops::spit(
            &self.tmp,
            path.join("mailbox.toml"),
            false,
            toml::to_string(&config)?.as_bytes(),
        )?;

        info!("Created mailbox store {}", path.display());
        Ok(Arc::new(FsStore {
            uid_validity,
            path,
            tmp: self.tmp.clone(),
        }))
    }

    fn open_store(
        &self,
        uid_validity: u32,
    ) -> Result<Arc<dyn MessageStore>, Error> {
        let path = self.store_path(uid_validity);
        let config: MailboxConfig = toml::from_str(
            &fs::read_to_string(path.join("mailbox.toml"))
                .on_not_found(Error::NxMailbox)?,
        )?;

        Ok(Arc::new(FsStore {
            uid_validity: config.uid_validity,
            path,
            tmp: self.tmp.clone(),
        }))
    }

    fn destroy_store(&self, uid_validity: u32) -> Result<(), Error> {
        let path = self.store_path(uid_validity);
        // Move the store out of the way first so that a crash part way
        // through the deletion doesn't leave a half-deleted mailbox behind.
        let doomed = tempfile::Builder::new()
            .prefix("doomed")
            .tempdir_in(&self.tmp)?;
        match fs::rename(&path, doomed.path().join("store")) {
            Ok(()) => {
                info!("Destroyed mailbox store {}", path.display());
            }
            Err(e) if io::ErrorKind::NotFound == e.kind() => (),
            Err(e) => return Err(e.into()),
        }

        doomed.close()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FsStore {
    uid_validity: u32,
    path: PathBuf,
    tmp: PathBuf,
}

impl FsStore {
    fn messages(&self) -> PathBuf {
        self.path.join("messages")
    }

    fn eml_path(&self, uid: Uid) -> PathBuf {
        self.messages().join(format!("{}.eml", uid))
    }

    fn meta_path(&self, uid: Uid) -> PathBuf {
        self.messages().join(format!("{}.meta", uid))
    }

    fn next_uid_path(&self) -> PathBuf {
        self.path.join("next-uid")
    }

    fn read_next_uid(&self) -> Result<Uid, Error> {
        let raw = match fs::read_to_string(self.next_uid_path()) {
            Ok(raw) => raw,
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                return Ok(Uid::MIN)
            }
            Err(e) => return Err(e.into()),
        };

        match raw.trim().parse::<u32>() {
            Ok(v) if u32::from(Uid::END) == v => Ok(Uid::END),
            Ok(v) => Uid::of(v).ok_or_else(|| corrupt(&raw)),
            Err(_) => Err(corrupt(&raw)),
        }
    }
}

fn corrupt(what: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("corrupt next-uid: {:?}", what),
    ))
}

/// Parse `<uid>.<ext>` into the UID and extension.
fn parse_message_file(path: &Path) -> Option<(Uid, &str)> {
    let uid = path.file_stem()?.to_str()?.parse::<u32>().ok()?;
    let ext = path.extension()?.to_str()?;
    Uid::of(uid).map(|uid| (uid, ext))
}

/// The UID after `uid`, or `Uid::END` if there is none.
fn uid_after(uid: Uid) -> Uid {
    uid.next().unwrap_or(Uid::END)
}

impl MessageStore for FsStore {
    fn load(&self) -> Result<StoredMailbox, Error> {
        let mut next_uid = self.read_next_uid()?;
        let mut emls = BTreeSet::new();
        let mut metas = BTreeSet::new();

        for entry in fs::read_dir(self.messages())? {
            let path = entry?.path();
            match parse_message_file(&path) {
                Some((uid, "eml")) => {
                    emls.insert(uid);
                }
                Some((uid, "meta")) => {
                    metas.insert(uid);
                }
                _ => (),
            }
        }

        let mut messages = Vec::new();
        for &uid in emls.union(&metas) {
            next_uid = next_uid.max(uid_after(uid));

            if !emls.contains(&uid) || !metas.contains(&uid) {
                warn!(
                    "{}: Discarding incomplete message {}",
                    self.path.display(),
                    uid
                );
                self.remove(uid)?;
                continue;
            }

            let meta: MessageMeta =
                file_ops::slurp_cbor(self.meta_path(uid))?;
            if meta.expunged {
                // Nothing can still refer to an expunged message across a
                // restart.
                self.remove(uid)?;
                continue;
            }

            messages.push((uid, meta));
        }

        Ok(StoredMailbox {
            uid_validity: self.uid_validity,
            next_uid,
            messages,
        })
    }

    fn append(
        &self,
        uid: Uid,
        next_uid: Uid,
        meta: &MessageMeta,
        raw: &[u8],
    ) -> Result<(), Error> {
        // The counter goes first so that a failure part way through never
        // lets the UID be reused. The message only becomes visible once its
        // .meta exists.
        file_ops::spit(
            &self.tmp,
            self.next_uid_path(),
            true,
            next_uid.to_string().as_bytes(),
        )?;
        file_ops::spit(&self.tmp, self.eml_path(uid), false, raw)?;
        if let Err(e) =
            file_ops::spit_cbor(&self.tmp, self.meta_path(uid), false, meta)
        {
            if let Err(e2) = fs::remove_file(self.eml_path(uid)) {
                warn!(
                    "{}: Failed to clean up {}.eml: {}",
                    self.path.display(),
                    uid,
                    e2
                );
            }
            return Err(e);
        }

        Ok(())
    }

    fn read(&self, uid: Uid) -> Result<Vec<u8>, Error> {
        fs::read(self.eml_path(uid)).on_not_found(Error::NxMessage)
    }

    fn write_meta(&self, uid: Uid, meta: &MessageMeta) -> Result<(), Error> {
        if !self.eml_path(uid).is_file() {
            return Err(Error::NxMessage);
        }

        file_ops::spit_cbor(&self.tmp, self.meta_path(uid), true, meta)
    }

    fn remove(&self, uid: Uid) -> Result<(), Error> {
        // Metadata first so that a crash in between leaves an orphaned .eml,
        // which `load()` cleans up.
        fs::remove_file(self.meta_path(uid)).ignore_not_found()?;
        fs::remove_file(self.eml_path(uid)).ignore_not_found()?;
        Ok(())
    }
}
