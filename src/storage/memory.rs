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

//! Process-memory storage, for tests and for servers that don't need their
//! mail to outlive them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::info;

use super::*;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    registry: Mutex<Registry>,
    stores: Mutex<HashMap<u32, Arc<MemoryStore>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the concrete store with the given UID validity, if it exists.
    pub fn store(&self, uid_validity: u32) -> Option<Arc<MemoryStore>> {
        self.stores.lock().unwrap().get(&uid_validity).cloned()
    }
}

impl Backend for MemoryBackend {
    fn load_registry(&self) -> Result<Registry, Error> {
        Ok(self.registry.lock().unwrap().clone())
    }

    fn save_registry(&self, registry: &Registry) -> Result<(), Error> {
        *self.registry.lock().unwrap() = registry.clone();
        Ok(())
    }

    fn create_store(
        &self,
        uid_validity: u32,
    ) -> Result<Arc<dyn MessageStore>, Error> {
        let mut stores = self.stores.lock().unwrap();
        if stores.contains_key(&uid_validity) {
            return Err(Error::MailboxExists);
        }

        let store = Arc::new(MemoryStore::new(uid_validity));
        stores.insert(uid_validity, Arc::clone(&store));
        info!("Created in-memory store {}", uid_validity);
        Ok(store)
    }

    fn open_store(
        &self,
        uid_validity: u32,
    ) -> Result<Arc<dyn MessageStore>, Error> {
        match self.store(uid_validity) {
            Some(store) => Ok(store),
            None => Err(Error::NxMailbox),
        }
    }

    fn destroy_store(&self, uid_validity: u32) -> Result<(), Error> {
        if self.stores.lock().unwrap().remove(&uid_validity).is_some() {
            info!("Destroyed in-memory store {}", uid_validity);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    uid_validity: u32,
    state: Mutex<StoreState>,
    fail_writes: AtomicBool,
    /// When set, the number of writes which succeed before exactly one
    /// fails.
    fail_write_after: Mutex<Option<usize>>,
}

#[derive(Debug)]
struct StoreState {
    next_uid: Uid,
    messages: BTreeMap<Uid, (MessageMeta, Arc<Vec<u8>>)>,
}

impl MemoryStore {
    fn new(uid_validity: u32) -> Self {
        MemoryStore {
            uid_validity,
            state: Mutex::new(StoreState {
                next_uid: Uid::MIN,
                messages: BTreeMap::new(),
            }),
            fail_writes: AtomicBool::new(false),
            fail_write_after: Mutex::new(None),
        }
    }

    /// While set, every write fails with an I/O error, the way a full disk
    /// would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let the next `n` writes succeed, then fail the one after that. Writes
    /// after the failed one succeed again.
    pub fn fail_write_after(&self, n: usize) {
        *self.fail_write_after.lock().unwrap() = Some(n);
    }

    fn check_writable(&self) -> Result<(), Error> {
        let mut countdown = self.fail_write_after.lock().unwrap();
        let fail = match *countdown {
            Some(0) => {
                *countdown = None;
                true
            }
            Some(n) => {
                *countdown = Some(n - 1);
                false
            }
            None => false,
        };

        if fail || self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )))
        } else {
            Ok(())
        }
    }
}

impl MessageStore for MemoryStore {
    fn load(&self) -> Result<StoredMailbox, Error> {
        let state = self.state.lock().unwrap();
        Ok(StoredMailbox {
            uid_validity: self.uid_validity,
            next_uid: state.next_uid,
            messages: state
                .messages
                .iter()
                .map(|(&uid, &(ref meta, _))| (uid, meta.clone()))
                .collect(),
        })
    }

    fn append(
        &self,
        uid: Uid,
        next_uid: Uid,
        meta: &MessageMeta,
        raw: &[u8],
    ) -> Result<(), Error> {
        self.check_writable()?;
        let mut state = self.state.lock().unwrap();
        if state.messages.contains_key(&uid) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("UID {} already stored", uid),
            )));
        }

        state
            .messages
            .insert(uid, (meta.clone(), Arc::new(raw.to_vec())));
        state.next_uid = state.next_uid.max(next_uid);
        Ok(())
    }

    fn read(&self, uid: Uid) -> Result<Vec<u8>, Error> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&uid)
            .map(|&(_, ref raw)| raw.to_vec())
            .ok_or(Error::NxMessage)
    }

    fn write_meta(&self, uid: Uid, meta: &MessageMeta) -> Result<(), Error> {
        self.check_writable()?;
        match self.state.lock().unwrap().messages.get_mut(&uid) {
            Some(&mut (ref mut m, _)) => {
                *m = meta.clone();
                Ok(())
            }
            None => Err(Error::NxMessage),
        }
    }

    fn remove(&self, uid: Uid) -> Result<(), Error> {
        self.check_writable()?;
        self.state.lock().unwrap().messages.remove(&uid);
        Ok(())
    }
}
