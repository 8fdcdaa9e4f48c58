//! Check-out / check-in of single documents.
//!
//! A document is either registered (read-only everywhere, no owner) or
//! checked out by exactly one user (writable in that user's replica). Both
//! transitions run inside one project index transaction that re-reads the
//! status before writing it, so two users racing for the same document
//! cannot both win.

use crate::cad::{CadSession, reopen};
use crate::error::VaultError;
use crate::storage::{Entry, IndexData, Status, modified_time_of};
use crate::utils::files::copy_preserving_mtime;
use crate::utils::permissions::set_readonly;
use crate::vault::{Vault, common_root_of};
use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Drives registration transitions for the vault's user.
pub struct Registrar<'a> {
    vault: &'a Vault,
}

impl<'a> Registrar<'a> {
    #[must_use]
    pub const fn new(vault: &'a Vault) -> Self {
        Self { vault }
    }

    /// Checks the document `name` out to the current user.
    ///
    /// The canonical status becomes the user's name and the local copy is
    /// made writable. A replica copy that is missing or whose modification
    /// time differs from the indexed one is first refreshed from the
    /// canonical tree. Calling this on a document the user already holds is
    /// a no-op that returns the entry and leaves the local edits alone.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if no document has this name
    /// - [`VaultError::Conflict`] if another user holds it
    /// - [`VaultError::Filesystem`] if the local copy cannot be prepared, in
    ///   which case the status is left unchanged
    pub fn unregister(&self, name: &str, cad: &mut dyn CadSession) -> Result<Entry> {
        let user = self.vault.user();
        let span = tracing::info_span!("unregister", name, user);
        let _guard = span.enter();

        let (entry, local_path) = self.vault.project().transaction(|data| {
            let entry = lookup(data, name)?;
            if let Some(holder) = entry.status.holder()
                && holder != user
            {
                return Err(VaultError::Conflict {
                    name: name.to_string(),
                    holder: holder.to_string(),
                }
                .into());
            }

            let local_path = self.local_path(data, &entry)?;
            let held = entry.status.is_checked_out_by(user);
            if (held && local_path.is_file()) || is_current(&local_path, entry.last_modified) {
                set_readonly(&local_path, false)?;
            } else {
                // An out-of-date copy would roll back the last check-in on register
                tracing::debug!(path = %local_path.display(), "refreshing local copy before checkout");
                copy_preserving_mtime(Path::new(&entry.path), &local_path)?;
            }

            let entry = checked_out(data, &entry.path, Status::CheckedOut(user.to_string()))?;
            data.last_editor = Some(user.to_string());
            Ok((entry, local_path))
        })?;

        self.record_local(&entry, &local_path)?;

        if let Err(e) = reopen(cad, &local_path, false) {
            tracing::warn!(path = %local_path.display(), error = %e, "CAD session did not reopen document");
        }
        tracing::info!(path = %entry.path, "document checked out");
        Ok(entry)
    }

    /// Checks the document `name` back in.
    ///
    /// The local copy overwrites the canonical one, both become read-only,
    /// both index entries get the canonical modification time and the
    /// canonical status goes back to registered.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if no document has this name
    /// - [`VaultError::Conflict`] if another user holds it
    /// - [`VaultError::NotCheckedOut`] if nobody holds it
    /// - [`VaultError::LocalFileMissing`] if the replica has no copy
    /// - [`VaultError::Filesystem`] if a copy or permission change fails;
    ///   the status then stays checked out
    pub fn register(&self, name: &str, cad: &mut dyn CadSession) -> Result<Entry> {
        let user = self.vault.user();
        let span = tracing::info_span!("register", name, user);
        let _guard = span.enter();

        let (entry, local_path) = self.vault.project().transaction(|data| {
            let entry = lookup(data, name)?;
            match entry.status.holder() {
                Some(holder) if holder == user => {}
                Some(holder) => {
                    return Err(VaultError::Conflict {
                        name: name.to_string(),
                        holder: holder.to_string(),
                    }
                    .into());
                }
                None => {
                    return Err(VaultError::NotCheckedOut {
                        name: name.to_string(),
                        status: entry.status.clone(),
                    }
                    .into());
                }
            }

            let local_path = self.local_path(data, &entry)?;
            if !local_path.is_file() {
                return Err(VaultError::LocalFileMissing(local_path).into());
            }

            let canonical = PathBuf::from(&entry.path);
            copy_preserving_mtime(&local_path, &canonical)?;
            set_readonly(&canonical, true)?;
            set_readonly(&local_path, true)?;

            let modified = modified_time_of(&canonical)?;
            let entry = checked_out(data, &entry.path, Status::Registered)?;
            if let Some(stored) = data.get_mut(&entry.path) {
                stored.last_modified = modified;
            }
            data.last_editor = Some(user.to_string());
            Ok((Entry { last_modified: modified, ..entry }, local_path))
        })?;

        self.record_local(&entry, &local_path)?;

        if let Err(e) = reopen(cad, &local_path, true) {
            tracing::warn!(path = %local_path.display(), error = %e, "CAD session did not reopen document");
        }
        tracing::info!(path = %entry.path, "document registered");
        Ok(entry)
    }

    fn local_path(&self, data: &IndexData, entry: &Entry) -> Result<PathBuf> {
        self.vault.local_path(&entry.path, &common_root_of(data))
    }

    /// Mirrors the canonical status and timestamp into the user index.
    fn record_local(&self, entry: &Entry, local_path: &Path) -> Result<()> {
        let key = local_path.to_string_lossy().into_owned();
        self.vault.local().transaction(|local| {
            local.upsert(Entry::new(
                key,
                entry.kind,
                entry.status.clone(),
                entry.last_modified,
            ));
            Ok(())
        })
    }
}

fn lookup(data: &IndexData, name: &str) -> Result<Entry> {
    let entry = data.get_by_name(name)?.clone();
    if entry.is_dir() {
        anyhow::bail!("'{name}' is a directory; only documents can be checked out");
    }
    Ok(entry)
}

fn is_current(local_path: &Path, last_modified: NaiveDateTime) -> bool {
    local_path.is_file() && modified_time_of(local_path).is_ok_and(|modified| modified == last_modified)
}

fn checked_out(data: &mut IndexData, path: &str, status: Status) -> Result<Entry> {
    let stored = data
        .get_mut(path)
        .ok_or_else(|| VaultError::NotFound(path.to_string()))?;
    stored.status = status;
    Ok(stored.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cad::DetachedSession;
    use crate::error::classify;
    use crate::utils::permissions::is_readonly;
    use filetime::FileTime;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        root: PathBuf,
        alice: Vault,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("net/CAD");
        fs::create_dir_all(root.join("A")).unwrap();
        fs::write(root.join("A/part.m3d"), b"v1").unwrap();
        let alice = Vault::open(&temp.path().join("idx"), temp.path().join("alice"), "alice").unwrap();
        alice.reindex(&root).unwrap();
        alice.sync_to_local().unwrap();
        Fixture { temp, root, alice }
    }

    fn bob(fx: &Fixture) -> Vault {
        let bob = Vault::open(&fx.temp.path().join("idx"), fx.temp.path().join("bob"), "bob").unwrap();
        bob.sync_to_local().unwrap();
        bob
    }

    #[test]
    fn test_unregister_makes_local_writable() -> Result<()> {
        let fx = fixture();
        let entry = fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        assert_eq!(entry.status, Status::CheckedOut("alice".into()));

        let local = fx.temp.path().join("alice/A/part.m3d");
        assert!(!is_readonly(&local)?);
        assert!(is_readonly(&fx.root.join("A/part.m3d"))?);
        assert_eq!(fx.alice.project().last_editor()?.as_deref(), Some("alice"));

        // Holding it already is fine
        fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        Ok(())
    }

    #[test]
    fn test_second_user_conflicts() -> Result<()> {
        let fx = fixture();
        let bob = bob(&fx);
        fx.alice.unregister("part.m3d", &mut DetachedSession)?;

        let err = bob.unregister("part.m3d", &mut DetachedSession).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(VaultError::Conflict { holder, .. }) if holder == "alice"
        ));

        let err = bob.register("part.m3d", &mut DetachedSession).unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::Conflict { .. })));
        Ok(())
    }

    #[test]
    fn test_register_requires_checkout() {
        let fx = fixture();
        let err = fx.alice.register("part.m3d", &mut DetachedSession).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(VaultError::NotCheckedOut { status: Status::Registered, .. })
        ));
    }

    #[test]
    fn test_unknown_document() {
        let fx = fixture();
        let err = fx.alice.unregister("nope.m3d", &mut DetachedSession).unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::NotFound(_))));
    }

    #[test]
    fn test_register_without_local_copy() -> Result<()> {
        let fx = fixture();
        fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        let local = fx.temp.path().join("alice/A/part.m3d");
        fs::remove_file(&local)?;

        let err = fx.alice.register("part.m3d", &mut DetachedSession).unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::LocalFileMissing(p)) if *p == local));
        let held = fx.alice.project().get_by_name("part.m3d")?;
        assert_eq!(held.status, Status::CheckedOut("alice".into()));
        Ok(())
    }

    #[test]
    fn test_register_publishes_local_edits() -> Result<()> {
        let fx = fixture();
        fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        let local = fx.temp.path().join("alice/A/part.m3d");
        fs::write(&local, b"v2")?;

        let entry = fx.alice.register("part.m3d", &mut DetachedSession)?;
        assert_eq!(entry.status, Status::Registered);

        let canonical = fx.root.join("A/part.m3d");
        assert_eq!(fs::read(&canonical)?, b"v2");
        assert!(is_readonly(&canonical)?);
        assert!(is_readonly(&local)?);

        let local_entry = fx.alice.local().get(&local.to_string_lossy())?.unwrap();
        assert_eq!(local_entry.last_modified, entry.last_modified);
        assert_eq!(modified_time_of(&local)?, modified_time_of(&canonical)?);

        // Bob picks the edit up on his next sync
        let bob = bob(&fx);
        assert_eq!(fs::read(fx.temp.path().join("bob/A/part.m3d"))?, b"v2");
        assert!(bob.sync_to_local()?.is_clean());
        Ok(())
    }

    #[test]
    fn test_checkout_refreshes_out_of_date_copy() -> Result<()> {
        let fx = fixture();
        let bob = bob(&fx);

        bob.unregister("part.m3d", &mut DetachedSession)?;
        let bob_local = fx.temp.path().join("bob/A/part.m3d");
        fs::write(&bob_local, b"bob v2")?;
        filetime::set_file_mtime(&bob_local, FileTime::from_unix_time(1_700_000_000, 0))?;
        bob.register("part.m3d", &mut DetachedSession)?;

        // Alice checks out without syncing first
        let alice_local = fx.temp.path().join("alice/A/part.m3d");
        assert_eq!(fs::read(&alice_local)?, b"v1");
        fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        assert_eq!(fs::read(&alice_local)?, b"bob v2");
        assert!(!is_readonly(&alice_local)?);

        fx.alice.register("part.m3d", &mut DetachedSession)?;
        assert_eq!(fs::read(fx.root.join("A/part.m3d"))?, b"bob v2");
        Ok(())
    }

    #[test]
    fn test_repeated_checkout_keeps_local_edits() -> Result<()> {
        let fx = fixture();
        fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        let local = fx.temp.path().join("alice/A/part.m3d");
        fs::write(&local, b"work in progress")?;
        filetime::set_file_mtime(&local, FileTime::from_unix_time(1_700_000_000, 0))?;

        fx.alice.unregister("part.m3d", &mut DetachedSession)?;
        assert_eq!(fs::read(&local)?, b"work in progress");
        Ok(())
    }

    #[test]
    fn test_shared_name_is_checked_out_by_folder() -> Result<()> {
        let fx = fixture();
        fs::create_dir(fx.root.join("B"))?;
        fs::write(fx.root.join("B/part.m3d"), b"other")?;
        fx.alice.reindex(&fx.root)?;
        fx.alice.sync_to_local()?;

        let err = fx.alice.unregister("part.m3d", &mut DetachedSession).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(VaultError::Ambiguous { candidates, .. }) if candidates.len() == 2
        ));

        let entry = fx.alice.unregister("B/part.m3d", &mut DetachedSession)?;
        assert!(entry.path.ends_with("/B/part.m3d"));
        assert_eq!(fs::read(fx.temp.path().join("alice/B/part.m3d"))?, b"other");
        assert_eq!(
            fx.alice.project().get_by_name("A/part.m3d")?.status,
            Status::Registered
        );
        Ok(())
    }

    #[test]
    fn test_directories_cannot_be_checked_out() {
        let fx = fixture();
        assert!(fx.alice.unregister("A", &mut DetachedSession).is_err());
    }
}
