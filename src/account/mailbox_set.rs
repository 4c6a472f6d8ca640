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

//! The mailboxes of one account.
//!
//! `MailboxSet` owns the mapping from hierarchical name to `MailboxData` and
//! the subscription list. Both live in the backend's `Registry`, which is
//! rewritten as a whole for each change; the in-memory state is only updated
//! once that write has succeeded, so a failed create, delete or rename leaves
//! no trace.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use log::{error, info, warn};

use super::mailbox::MailboxData;
use super::model::MailboxAttribute;
use super::snapshot::MailboxSnapshot;
use crate::storage::fs::FsBackend;
use crate::storage::memory::MemoryBackend;
use crate::storage::{new_uid_validity, Backend, MessageStore, Registry};
use crate::support::error::Error;
use crate::support::safe_name::{
    canonical_mailbox_name, mailbox_name_matcher, DELIMITER,
};
use crate::support::system_config::{BackendKind, SystemConfig};

const INBOX: &str = "INBOX";

/// One entry of a mailbox listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxInfo {
    pub name: String,
    pub attributes: Vec<MailboxAttribute>,
}

pub struct MailboxSet {
    backend: Arc<dyn Backend>,
    state: RwLock<SetState>,
}

struct SetState {
    mailboxes: BTreeMap<String, Arc<MailboxData>>,
    registry: Registry,
}

/// A registry change which has not been saved yet, along with the stores
/// created for it.
struct Staged {
    registry: Registry,
    created: Vec<(String, u32, Arc<dyn MessageStore>)>,
}

impl MailboxSet {
    /// Load every mailbox known to `backend`.
    ///
    /// INBOX is created (and subscribed) if it does not exist yet.
    pub fn open(backend: Arc<dyn Backend>) -> Result<Self, Error> {
        let registry = backend.load_registry()?;
        let mut mailboxes = BTreeMap::new();
        for (name, &uid_validity) in &registry.mailboxes {
            let store = backend.open_store(uid_validity)?;
            mailboxes.insert(name.clone(), MailboxData::open(name, store)?);
        }

        info!("Loaded {} mailboxes", mailboxes.len());

        let set = MailboxSet {
            backend,
            state: RwLock::new(SetState {
                mailboxes,
                registry,
            }),
        };
        set.provision(Some(INBOX), true)?;
        Ok(set)
    }

    /// Open the mailbox set described by `config`, creating the configured
    /// standard mailboxes if they are missing.
    pub fn from_config(config: &SystemConfig) -> Result<Self, Error> {
        let backend: Arc<dyn Backend> = match config.storage.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::Filesystem => {
                Arc::new(FsBackend::new(config.storage.root.clone())?)
            }
        };

        let set = MailboxSet::open(backend)?;
        set.provision(
            &config.mailboxes.provision,
            config.mailboxes.auto_subscribe,
        )?;
        Ok(set)
    }

    /// Look up an existing mailbox.
    ///
    /// If it does not exist, fails with `NxMailboxTryCreate` when
    /// `try_create` is set (the caller would succeed by creating it, as for
    /// `APPEND` or `COPY`) and `NxMailbox` otherwise.
    pub fn get_mailbox(
        &self,
        name: &str,
        try_create: bool,
    ) -> Result<Arc<MailboxData>, Error> {
        let missing = || {
            if try_create {
                Error::NxMailboxTryCreate
            } else {
                Error::NxMailbox
            }
        };

        let name = canonical_mailbox_name(name).map_err(|_| missing())?;
        self.state
            .read()
            .unwrap()
            .mailboxes
            .get(&name)
            .cloned()
            .ok_or_else(missing)
    }

    /// Create a new, empty mailbox. Any missing parents are created too.
    pub fn add_mailbox(&self, name: &str) -> Result<Arc<MailboxData>, Error> {
        let name = canonical_mailbox_name(name)?;
        if is_inbox_child(&name) {
            return Err(Error::BadOperationOnInbox);
        }

        let mut state = self.state.write().unwrap();
        if state.mailboxes.contains_key(&name) {
            return Err(Error::MailboxExists);
        }

        let mut staged = self.stage(&state);
        let result = self.stage_lineage(&mut staged, &name, true);
        let created = self.commit(&mut state, staged, result)?;
        for mailbox in created {
            info!("Created mailbox {}", mailbox.name());
            state.mailboxes.insert(mailbox.name(), mailbox);
        }

        state.mailboxes.get(&name).cloned().ok_or(Error::NxMailbox)
    }

    /// Delete a mailbox and every message in it.
    ///
    /// Sessions which have the mailbox selected fail every further operation
    /// with `NxMailbox`. Subscriptions are not affected.
    pub fn delete_mailbox(&self, name: &str) -> Result<(), Error> {
        let name = canonical_mailbox_name(name)?;
        if INBOX == name {
            return Err(Error::BadOperationOnInbox);
        }

        let mut state = self.state.write().unwrap();
        let mailbox =
            state.mailboxes.get(&name).cloned().ok_or(Error::NxMailbox)?;
        if state.mailboxes.keys().any(|n| is_descendant(n, &name)) {
            return Err(Error::MailboxHasInferiors);
        }

        let mut registry = state.registry.clone();
        registry.mailboxes.remove(&name);
        self.backend.save_registry(&registry)?;
        state.registry = registry;
        state.mailboxes.remove(&name);

        mailbox.mark_deleted();
        // The registry no longer refers to the store, so failing to destroy
        // it only wastes space.
        if let Err(e) = self.backend.destroy_store(mailbox.uid_validity()) {
            warn!(
                "Failed to destroy store {} of deleted mailbox {}: {}",
                mailbox.uid_validity(),
                name,
                e
            );
        }

        info!("Deleted mailbox {}", name);
        Ok(())
    }

    /// Rename `before` (and everything under it) to `after`.
    ///
    /// The mailbox keeps its UID validity, messages and flags, and sessions
    /// which have it selected stay attached to it. Renaming INBOX moves its
    /// content to `after` and leaves a new, empty INBOX behind.
    pub fn rename_mailbox(
        &self,
        before: &str,
        after: &str,
    ) -> Result<Arc<MailboxData>, Error> {
        let before = canonical_mailbox_name(before)?;
        let after = canonical_mailbox_name(after)?;
        if before == after {
            return Err(Error::RenameToSelf);
        }
        if is_descendant(&after, &before) {
            return Err(Error::RenameIntoSelf);
        }
        if is_inbox_child(&after) {
            return Err(Error::BadOperationOnInbox);
        }

        let mut state = self.state.write().unwrap();
        if !state.mailboxes.contains_key(&before) {
            return Err(Error::NxMailbox);
        }

        let moves = state
            .mailboxes
            .keys()
            .filter(|n| **n == before || is_descendant(n, &before))
            .map(|n| (n.clone(), format!("{}{}", after, &n[before.len()..])))
            .collect::<Vec<_>>();
        if moves
            .iter()
            .any(|&(_, ref to)| state.mailboxes.contains_key(to))
        {
            return Err(Error::MailboxExists);
        }

        let mut staged = self.stage(&state);
        for &(ref from, ref to) in &moves {
            if let Some(uid_validity) = staged.registry.mailboxes.remove(from)
            {
                staged.registry.mailboxes.insert(to.clone(), uid_validity);
            }
        }

        let mut result = self.stage_lineage(&mut staged, &after, false);
        if result.is_ok() && INBOX == before {
            result = self.stage_create(&mut staged, INBOX);
        }
        let created = self.commit(&mut state, staged, result)?;

        for (from, to) in moves {
            if let Some(mailbox) = state.mailboxes.remove(&from) {
                mailbox.set_name(&to);
                state.mailboxes.insert(to, mailbox);
            }
        }
        for mailbox in created {
            info!("Created mailbox {}", mailbox.name());
            state.mailboxes.insert(mailbox.name(), mailbox);
        }

        info!("Renamed mailbox {} to {}", before, after);
        state.mailboxes.get(&after).cloned().ok_or(Error::NxMailbox)
    }

    /// Add or remove `name` from the subscription list.
    ///
    /// Subscriptions are independent of whether the mailbox exists.
    pub fn set_subscribed(
        &self,
        name: &str,
        subscribed: bool,
    ) -> Result<(), Error> {
        let name = canonical_mailbox_name(name)?;
        let mut state = self.state.write().unwrap();

        let mut registry = state.registry.clone();
        let changed = if subscribed {
            registry.subscriptions.insert(name.clone())
        } else {
            registry.subscriptions.remove(&name)
        };

        if changed {
            self.backend.save_registry(&registry)?;
            state.registry = registry;
            info!(
                "{} {}",
                if subscribed {
                    "Subscribed to"
                } else {
                    "Unsubscribed from"
                },
                name
            );
        }

        Ok(())
    }

    /// Every subscribed name, in order, whether or not it exists.
    pub fn list_subscribed(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        state.registry.subscriptions.iter().cloned().collect()
    }

    /// Every mailbox, in order, with its attributes.
    pub fn list(&self) -> Vec<MailboxInfo> {
        self.list_matching(&["*"])
    }

    /// Every mailbox matching any of the RFC 3501 `patterns`, in order.
    pub fn list_matching(&self, patterns: &[&str]) -> Vec<MailboxInfo> {
        let matcher = mailbox_name_matcher(patterns.iter().copied());
        let state = self.state.read().unwrap();

        state
            .mailboxes
            .keys()
            .filter(|name| matcher(name.as_str()))
            .map(|name| {
                let mut attributes = Vec::new();
                if INBOX == name {
                    attributes.push(MailboxAttribute::Noinferiors);
                }

                if state.mailboxes.keys().any(|n| is_descendant(n, name)) {
                    attributes.push(MailboxAttribute::HasChildren);
                } else {
                    attributes.push(MailboxAttribute::HasNoChildren);
                }

                if state.registry.subscriptions.contains(name) {
                    attributes.push(MailboxAttribute::Subscribed);
                }

                if !name.contains(DELIMITER) {
                    attributes.extend(MailboxAttribute::special_use_for(name));
                }

                MailboxInfo {
                    name: name.clone(),
                    attributes,
                }
            })
            .collect()
    }

    /// Summarise a mailbox without selecting it.
    pub fn status(&self, name: &str) -> Result<MailboxSnapshot, Error> {
        self.get_mailbox(name, false)?.snapshot()
    }

    /// Create whichever of `names` do not exist yet, subscribing to them if
    /// `subscribe` is set.
    ///
    /// Returns the names of the mailboxes that were created, including any
    /// implicit parents.
    pub fn provision<S: AsRef<str>>(
        &self,
        names: impl IntoIterator<Item = S>,
        subscribe: bool,
    ) -> Result<Vec<String>, Error> {
        let names = names
            .into_iter()
            .map(|n| canonical_mailbox_name(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if names.iter().any(|n| is_inbox_child(n)) {
            return Err(Error::BadOperationOnInbox);
        }

        let mut state = self.state.write().unwrap();
        let mut staged = self.stage(&state);
        let mut result = Ok(());
        for name in &names {
            if staged.registry.mailboxes.contains_key(name) {
                continue;
            }

            result = self.stage_lineage(&mut staged, name, true);
            if result.is_err() {
                break;
            }
            if subscribe {
                staged.registry.subscriptions.insert(name.clone());
            }
        }

        if result.is_ok() && staged.created.is_empty() {
            return Ok(vec![]);
        }

        let created = self.commit(&mut state, staged, result)?;
        let mut created_names = Vec::with_capacity(created.len());
        for mailbox in created {
            let name = mailbox.name();
            info!("Provisioned mailbox {}", name);
            state.mailboxes.insert(name.clone(), mailbox);
            created_names.push(name);
        }

        created_names.sort();
        Ok(created_names)
    }

    fn stage(&self, state: &SetState) -> Staged {
        Staged {
            registry: state.registry.clone(),
            created: Vec::new(),
        }
    }

    /// Stage creation of every missing ancestor of `name`, and `name` itself
    /// if `include_self`.
    fn stage_lineage(
        &self,
        staged: &mut Staged,
        name: &str,
        include_self: bool,
    ) -> Result<(), Error> {
        let ends = name
            .match_indices(DELIMITER)
            .map(|(ix, _)| ix)
            .chain(if include_self { Some(name.len()) } else { None });

        for end in ends {
            let prefix = &name[..end];
            if !staged.registry.mailboxes.contains_key(prefix) {
                self.stage_create(staged, prefix)?;
            }
        }

        Ok(())
    }

    fn stage_create(
        &self,
        staged: &mut Staged,
        name: &str,
    ) -> Result<(), Error> {
        let uid_validity = new_uid_validity(staged.registry.last_uid_validity);
        let store = self.backend.create_store(uid_validity)?;

        staged.registry.last_uid_validity = uid_validity;
        staged
            .registry
            .mailboxes
            .insert(name.to_owned(), uid_validity);
        staged.created.push((name.to_owned(), uid_validity, store));
        Ok(())
    }

    /// Save the staged registry if staging succeeded, returning the newly
    /// created mailboxes. The caller must add those to the map.
    ///
    /// On any failure, the stores created while staging are destroyed again
    /// and the in-memory state is left as it was.
    fn commit(
        &self,
        state: &mut SetState,
        staged: Staged,
        staging_result: Result<(), Error>,
    ) -> Result<Vec<Arc<MailboxData>>, Error> {
        let saved = staging_result
            .and_then(|()| self.backend.save_registry(&staged.registry));
        if let Err(e) = saved {
            self.discard(&staged);
            return Err(e);
        }

        state.registry = staged.registry;

        let mut mailboxes = Vec::with_capacity(staged.created.len());
        for (name, _, store) in staged.created {
            match MailboxData::open(&name, store) {
                Ok(mailbox) => mailboxes.push(mailbox),
                Err(e) => {
                    // The registry already refers to it, so the next load of
                    // the account will retry.
                    error!("Failed to open new mailbox {}: {}", name, e);
                    return Err(e);
                }
            }
        }

        Ok(mailboxes)
    }

    fn discard(&self, staged: &Staged) {
        for &(ref name, uid_validity, _) in &staged.created {
            if let Err(e) = self.backend.destroy_store(uid_validity) {
                warn!(
                    "Failed to clean up store {} for {}: {}",
                    uid_validity, name, e
                );
            }
        }
    }
}

/// Whether `name` is strictly inside the hierarchy of `ancestor`.
fn is_descendant(name: &str, ancestor: &str) -> bool {
    name.len() > ancestor.len()
        && name.starts_with(ancestor)
        && name[ancestor.len()..].starts_with(DELIMITER)
}

fn is_inbox_child(name: &str) -> bool {
    is_descendant(name, INBOX)
}

#[cfg(test)]
mod test {
    use chrono::prelude::*;
    use rayon::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::account::mailbox::test_prelude::test_message;
    use crate::account::message::Message;
    use crate::account::model::*;
    use crate::support::system_config::StorageConfig;

    fn set_up() -> (Arc<MemoryBackend>, MailboxSet) {
        crate::init_test_log();
        let backend = Arc::new(MemoryBackend::new());
        let set = MailboxSet::open(backend.clone()).unwrap();
        (backend, set)
    }

    fn names(set: &MailboxSet) -> Vec<String> {
        set.list().into_iter().map(|i| i.name).collect()
    }

    fn flagged_message() -> Message {
        Message::parse(
            Uid::MIN,
            b"Subject: flagged\r\n\r\nflagged body\r\n".to_vec(),
            vec![Flag::Flagged, Flag::Keyword("$Important".to_owned())],
            FixedOffset::east(3600).ymd(2020, 5, 1).and_hms(12, 0, 0),
        )
        .unwrap()
    }

    #[test]
    fn inbox_always_exists() {
        let (backend, set) = set_up();
        assert_eq!(vec!["INBOX"], names(&set));
        assert_eq!(vec!["INBOX"], set.list_subscribed());

        let inbox = set.get_mailbox("inbox", false).unwrap();
        assert!(Arc::ptr_eq(
            &inbox,
            &set.get_mailbox("InBoX", false).unwrap()
        ));

        // Reopening finds the same INBOX rather than making a new one
        let reopened = MailboxSet::open(backend).unwrap();
        assert_eq!(
            inbox.uid_validity(),
            reopened.get_mailbox("INBOX", false).unwrap().uid_validity()
        );
        assert_eq!(vec!["INBOX"], names(&reopened));
    }

    #[test]
    fn get_missing_mailbox() {
        let (_, set) = set_up();
        assert_matches!(Err(Error::NxMailbox), set.get_mailbox("foo", false));
        assert_matches!(
            Err(Error::NxMailboxTryCreate),
            set.get_mailbox("foo", true)
        );
        assert_matches!(Err(Error::NxMailbox), set.get_mailbox("../x", false));
    }

    #[test]
    fn add_mailbox_creates_parents() {
        let (_, set) = set_up();
        let leaf = set.add_mailbox("Work/Projects/Crymap").unwrap();
        assert_eq!("Work/Projects/Crymap", leaf.name());
        assert_eq!(
            vec!["INBOX", "Work", "Work/Projects", "Work/Projects/Crymap"],
            names(&set)
        );

        let work = set.get_mailbox("Work", false).unwrap();
        let projects = set.get_mailbox("Work/Projects", false).unwrap();
        assert!(work.uid_validity() < projects.uid_validity());
        assert!(projects.uid_validity() < leaf.uid_validity());

        assert_matches!(Err(Error::MailboxExists), set.add_mailbox("Work/"));
        assert_matches!(
            Err(Error::BadOperationOnInbox),
            set.add_mailbox("inbox/foo")
        );
        assert_matches!(Err(Error::MailboxExists), set.add_mailbox("Inbox"));
        assert_matches!(Err(Error::UnsafeName), set.add_mailbox("a/../b"));
        assert_matches!(Err(Error::UnsafeName), set.add_mailbox("foo*"));

        // Creation doesn't subscribe
        assert_eq!(vec!["INBOX"], set.list_subscribed());
    }

    #[test]
    fn delete_mailbox() {
        let (backend, set) = set_up();
        set.add_mailbox("Archive/2020").unwrap();

        assert_matches!(
            Err(Error::BadOperationOnInbox),
            set.delete_mailbox("inbox")
        );
        assert_matches!(Err(Error::NxMailbox), set.delete_mailbox("nx"));
        assert_matches!(
            Err(Error::MailboxHasInferiors),
            set.delete_mailbox("Archive")
        );

        let doomed = set.get_mailbox("Archive/2020", false).unwrap();
        doomed.add(test_message("doomed"), false).unwrap();
        let session = doomed.select(false).unwrap();
        set.set_subscribed("Archive/2020", true).unwrap();

        set.delete_mailbox("Archive/2020").unwrap();
        assert_eq!(vec!["Archive", "INBOX"], names(&set));
        assert!(doomed.is_deleted());
        assert!(backend.store(doomed.uid_validity()).is_none());
        assert_matches!(Err(Error::NxMailbox), session.poll());
        assert_matches!(Err(Error::NxMailbox), session.snapshot());
        assert_eq!(
            vec!["Archive/2020", "INBOX"],
            set.list_subscribed()
        );

        set.delete_mailbox("Archive").unwrap();
        let recreated = set.add_mailbox("Archive/2020").unwrap();
        assert!(recreated.uid_validity() > doomed.uid_validity());
        assert_eq!(0, recreated.snapshot().unwrap().exists);
    }

    #[test]
    fn rename_preserves_identity() {
        let (_, set) = set_up();
        let work = set.add_mailbox("Work").unwrap();
        set.add_mailbox("Work/Old").unwrap();
        for _ in 0..3 {
            work.add(test_message("work"), false).unwrap();
        }
        work.add(flagged_message(), false).unwrap();
        work.delete(Some(Uid::u(2))).unwrap();
        let session = work.select(false).unwrap();

        let renamed = set.rename_mailbox("Work", "Archive/Job").unwrap();
        assert!(Arc::ptr_eq(&work, &renamed));
        assert_eq!("Archive/Job", renamed.name());
        assert_eq!(
            vec!["Archive", "Archive/Job", "Archive/Job/Old", "INBOX"],
            names(&set)
        );
        assert_matches!(Err(Error::NxMailbox), set.get_mailbox("Work", false));

        let found = set.get_mailbox("Archive/Job", false).unwrap();
        assert_eq!(work.uid_validity(), found.uid_validity());
        assert_eq!(
            vec![Uid::u(1), Uid::u(3), Uid::u(4)],
            found.uids().unwrap().collect::<Vec<_>>()
        );
        let m = found
            .get(Uid::u(4), FetchRequirement::Metadata)
            .unwrap()
            .unwrap();
        assert!(m.permanent_flags().contains(&Flag::Flagged));

        // The session follows the mailbox
        assert_eq!("Archive/Job", session.snapshot().unwrap().name);
        assert_eq!(3, session.exists());
    }

    #[test]
    fn rename_errors() {
        let (_, set) = set_up();
        set.add_mailbox("a/b").unwrap();
        set.add_mailbox("c").unwrap();

        assert_matches!(
            Err(Error::RenameToSelf),
            set.rename_mailbox("a", "a/")
        );
        assert_matches!(
            Err(Error::RenameIntoSelf),
            set.rename_mailbox("a", "a/b/c")
        );
        assert_matches!(
            Err(Error::MailboxExists),
            set.rename_mailbox("a", "c")
        );
        assert_matches!(Err(Error::NxMailbox), set.rename_mailbox("x", "y"));
        assert_matches!(
            Err(Error::BadOperationOnInbox),
            set.rename_mailbox("c", "INBOX/c")
        );
        assert_matches!(
            Err(Error::MailboxExists),
            set.rename_mailbox("c", "inbox")
        );

        assert_eq!(vec!["INBOX", "a", "a/b", "c"], names(&set));
    }

    #[test]
    fn rename_inbox_leaves_fresh_inbox() {
        let (_, set) = set_up();
        let inbox = set.get_mailbox("INBOX", false).unwrap();
        inbox.add(test_message("one"), true).unwrap();
        inbox.add(test_message("two"), false).unwrap();

        let moved = set.rename_mailbox("inbox", "Old Mail").unwrap();
        assert!(Arc::ptr_eq(&inbox, &moved));
        assert_eq!(2, moved.snapshot().unwrap().exists);

        let fresh = set.get_mailbox("INBOX", false).unwrap();
        assert!(!Arc::ptr_eq(&inbox, &fresh));
        assert!(fresh.uid_validity() > inbox.uid_validity());
        assert_eq!(0, set.status("INBOX").unwrap().exists);
        assert_eq!(Uid::MIN, fresh.next_uid().unwrap());
        assert_eq!(vec!["INBOX", "Old Mail"], names(&set));
    }

    #[test]
    fn subscriptions_are_independent() {
        let (_, set) = set_up();
        set.set_subscribed("Nonexistent", true).unwrap();
        set.set_subscribed("inbox", false).unwrap();
        set.set_subscribed("inbox", false).unwrap();
        assert_eq!(vec!["Nonexistent"], set.list_subscribed());
        assert_eq!(vec!["INBOX"], names(&set));

        set.add_mailbox("Nonexistent").unwrap();
        set.delete_mailbox("Nonexistent").unwrap();
        assert_eq!(vec!["Nonexistent"], set.list_subscribed());

        assert_matches!(
            Err(Error::UnsafeName),
            set.set_subscribed("%", true)
        );
    }

    #[test]
    fn list_attributes() {
        let (_, set) = set_up();
        set.provision(vec!["Sent", "Trash"], true).unwrap();
        set.add_mailbox("Work/Sent").unwrap();
        set.add_mailbox("Spam").unwrap();

        assert_eq!(
            vec![
                MailboxInfo {
                    name: "INBOX".to_owned(),
                    attributes: vec![
                        MailboxAttribute::Noinferiors,
                        MailboxAttribute::HasNoChildren,
                        MailboxAttribute::Subscribed,
                    ],
                },
                MailboxInfo {
                    name: "Sent".to_owned(),
                    attributes: vec![
                        MailboxAttribute::HasNoChildren,
                        MailboxAttribute::Subscribed,
                        MailboxAttribute::Sent,
                    ],
                },
                MailboxInfo {
                    name: "Spam".to_owned(),
                    attributes: vec![
                        MailboxAttribute::HasNoChildren,
                        MailboxAttribute::Junk,
                    ],
                },
                MailboxInfo {
                    name: "Trash".to_owned(),
                    attributes: vec![
                        MailboxAttribute::HasNoChildren,
                        MailboxAttribute::Subscribed,
                        MailboxAttribute::Trash,
                    ],
                },
                MailboxInfo {
                    name: "Work".to_owned(),
                    attributes: vec![MailboxAttribute::HasChildren],
                },
                MailboxInfo {
                    name: "Work/Sent".to_owned(),
                    attributes: vec![MailboxAttribute::HasNoChildren],
                },
            ],
            set.list()
        );

        let matched = set
            .list_matching(&["%/Sent", "inbox"])
            .into_iter()
            .map(|i| i.name)
            .collect::<Vec<_>>();
        assert_eq!(vec!["INBOX", "Work/Sent"], matched);
    }

    #[test]
    fn status_of_unselected_mailbox() {
        let (_, set) = set_up();
        let inbox = set.get_mailbox("INBOX", false).unwrap();
        inbox.add(test_message("a"), true).unwrap();
        inbox.add(flagged_message(), false).unwrap();

        let status = set.status("inbox").unwrap();
        assert_eq!(2, status.exists);
        assert_eq!(1, status.recent);
        assert_eq!(Uid::u(3), status.next_uid);
        assert_eq!(inbox.uid_validity(), status.uid_validity);
        assert_matches!(Err(Error::NxMailbox), set.status("nx"));
    }

    #[test]
    fn provision_only_creates_missing() {
        let (_, set) = set_up();
        set.add_mailbox("Drafts").unwrap();

        let created = set
            .provision(vec!["Drafts", "Sent", "Lists/Rust"], true)
            .unwrap();
        assert_eq!(vec!["Lists", "Lists/Rust", "Sent"], created);
        assert_eq!(
            vec!["INBOX", "Lists/Rust", "Sent"],
            set.list_subscribed()
        );

        assert!(set.provision(vec!["Sent"], true).unwrap().is_empty());
        assert_matches!(
            Err(Error::UnsafeName),
            set.provision(vec!["Good", "b%d"], true)
        );
        assert_matches!(Err(Error::NxMailbox), set.get_mailbox("Good", false));
    }

    #[test]
    fn from_config_provisions() {
        crate::init_test_log();
        let config: SystemConfig = "[mailboxes]\nprovision = [\"Sent\"]\n"
            .parse()
            .unwrap();
        let set = MailboxSet::from_config(&config).unwrap();
        assert_eq!(vec!["INBOX", "Sent"], names(&set));
        assert_eq!(vec!["INBOX", "Sent"], set.list_subscribed());
    }

    #[test]
    fn file_system_backend_survives_reopen() {
        crate::init_test_log();
        let root = TempDir::new().unwrap();
        let config = SystemConfig {
            storage: StorageConfig {
                backend: BackendKind::Filesystem,
                root: root.path().to_owned(),
            },
            ..SystemConfig::default()
        };

        let (uid_validity, keyword_flags) = {
            let set = MailboxSet::from_config(&config).unwrap();
            let work = set.add_mailbox("Work").unwrap();
            work.add(test_message("one"), false).unwrap();
            let flagged = work.add(flagged_message(), false).unwrap();
            work.delete(Some(Uid::u(1))).unwrap();
            set.rename_mailbox("Work", "Done/Work").unwrap();
            set.delete_mailbox("Trash").unwrap();
            (work.uid_validity(), flagged.permanent_flags().clone())
        };

        let set = MailboxSet::from_config(&config).unwrap();
        // Trash is provisioned again, but with a new UID validity
        assert!(set.get_mailbox("Trash", false).unwrap().uid_validity() > 0);
        assert_matches!(Err(Error::NxMailbox), set.get_mailbox("Work", false));

        let work = set.get_mailbox("Done/Work", false).unwrap();
        assert_eq!(uid_validity, work.uid_validity());
        assert_eq!(vec![Uid::u(2)], work.uids().unwrap().collect::<Vec<_>>());
        assert_eq!(Uid::u(3), work.next_uid().unwrap());

        let m = work
            .get(Uid::u(2), FetchRequirement::Content)
            .unwrap()
            .unwrap();
        assert_eq!(&keyword_flags, m.permanent_flags());
        assert_eq!(vec!["flagged"], m.get_header("Subject"));
    }

    #[test]
    fn concurrent_creation() {
        let (_, set) = set_up();
        (0..32).into_par_iter().for_each(|i| {
            set.add_mailbox(&format!("Parent/Child {}", i)).unwrap();
        });

        let all = set.list();
        assert_eq!(34, all.len());

        let mut uid_validities = all
            .iter()
            .map(|i| set.get_mailbox(&i.name, false).unwrap().uid_validity())
            .collect::<Vec<_>>();
        uid_validities.sort();
        uid_validities.dedup();
        assert_eq!(34, uid_validities.len());
    }
}
