mod common;

use anyhow::Result;
use cadsync::cad::DetachedSession;
use cadsync::error::classify;
use cadsync::mapping;
use cadsync::storage::{EntryKind, Status};
use cadsync::utils::files::remove_path;
use cadsync::utils::permissions::is_readonly;
use cadsync::VaultError;
use common::{TestVault, key};
use std::collections::BTreeSet;
use std::fs;

#[test]
fn test_reindex_is_idempotent() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;

    let first = alice.reindex(&fx.root)?;
    assert_eq!(first.added, 7);
    let before = alice.project().read()?;

    let second = alice.reindex(&fx.root)?;
    assert!(!second.changed());
    assert_eq!(second.scanned, 7);
    assert_eq!(alice.project().read()?, before);
    Ok(())
}

#[test]
fn test_index_dir_inside_tree_is_not_indexed() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;
    alice.reindex(&fx.root)?;

    assert!(fx.index_dir().join("project.idx").exists());
    let keys: Vec<String> = alice.project().list(None)?.into_iter().map(|e| e.path).collect();
    assert!(keys.iter().all(|k| !k.contains(cadsync::INDEX_DIR_NAME)));
    Ok(())
}

#[test]
fn test_sync_converges_on_project_index() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;
    alice.reindex(&fx.root)?;
    let report = alice.sync_to_local()?;
    assert!(report.is_clean());

    let root = alice.common_root()?;
    assert_eq!(root, key(&fx.root));

    let expected: BTreeSet<String> = alice
        .project()
        .list(None)?
        .iter()
        .map(|e| mapping::to_local(&e.path, &root, alice.local_root()))
        .map(|p| p.map(|p| p.to_string_lossy().into_owned()))
        .collect::<Result<_>>()?;
    let actual: BTreeSet<String> = alice.local().list(None)?.into_iter().map(|e| e.path).collect();
    assert_eq!(actual, expected);

    for entry in alice.local().list(Some(EntryKind::File))? {
        assert!(is_readonly(std::path::Path::new(&entry.path))?);
    }
    Ok(())
}

#[test]
fn test_deletion_reaches_every_replica() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;
    let bob = fx.vault("bob")?;
    alice.reindex(&fx.root)?;
    alice.sync_to_local()?;
    bob.sync_to_local()?;

    remove_path(&fx.canonical("A/B"))?;
    remove_path(&fx.canonical("top.m3d"))?;
    bob.reindex(&fx.root)?;

    for (user, vault) in [("alice", &alice), ("bob", &bob)] {
        let report = vault.sync_to_local()?;
        assert!(report.is_clean());
        assert_eq!(report.removed, 3, "{user}");
        assert!(!fx.local(user, "A/B").exists());
        assert!(!fx.local(user, "top.m3d").exists());
        assert!(fx.local(user, "A/part.m3d").exists());
        assert_eq!(vault.local().list(None)?.len(), 4);
    }
    Ok(())
}

#[test]
fn test_registration_round_trip() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;
    alice.reindex(&fx.root)?;
    alice.sync_to_local()?;

    let held = alice.unregister("part.m3d", &mut DetachedSession)?;
    assert_eq!(held.status, Status::CheckedOut("alice".into()));
    let local = fx.local("alice", "A/part.m3d");
    assert!(!is_readonly(&local)?);

    fs::write(&local, b"part v2")?;
    let entry = alice.register("part.m3d", &mut DetachedSession)?;
    assert_eq!(entry.status, Status::Registered);

    let canonical = fx.canonical("A/part.m3d");
    assert_eq!(fs::read(&canonical)?, b"part v2");
    assert!(is_readonly(&canonical)?);
    assert!(is_readonly(&local)?);

    let canonical_entry = alice.project().get_by_name("part.m3d")?;
    let local_entry = alice
        .local()
        .get(&local.to_string_lossy())?
        .ok_or_else(|| anyhow::anyhow!("local entry missing"))?;
    assert_eq!(canonical_entry.status, Status::Registered);
    assert_eq!(local_entry.last_modified, canonical_entry.last_modified);

    // The published edit is not recopied onto the author's replica
    assert!(!alice.sync_to_local()?.changed());
    Ok(())
}

#[test]
fn test_checkout_is_exclusive_under_contention() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    fx.vault("alice")?.reindex(&fx.root)?;

    let users = ["alice", "bob", "carol", "dave"];
    let results: Vec<Result<_>> = std::thread::scope(|s| {
        let handles: Vec<_> = users
            .iter()
            .map(|user| {
                let vault = fx.vault(user).unwrap();
                s.spawn(move || vault.unregister("asm.a3d", &mut DetachedSession))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let holder = winners[0].status.holder().unwrap().to_string();

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            classify(err),
            Some(VaultError::Conflict { holder: h, .. }) if *h == holder
        ));
    }
    assert_eq!(
        fx.vault("alice")?.project().get_by_name("asm.a3d")?.status,
        Status::CheckedOut(holder)
    );
    Ok(())
}

#[test]
fn test_remote_change_reaches_other_user() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;
    let bob = fx.vault("bob")?;
    alice.reindex(&fx.root)?;
    bob.sync_to_local()?;

    fx.write("C/sheet.cdw", b"sheet rev B")?;
    fx.touch("C/sheet.cdw", 1_700_000_000)?;
    alice.reindex(&fx.root)?;
    assert_eq!(bob.project().last_editor()?.as_deref(), Some("alice"));

    let report = bob.sync_to_local()?;
    assert_eq!(report.updated, 1);
    let local = fx.local("bob", "C/sheet.cdw");
    assert_eq!(fs::read(&local)?, b"sheet rev B");
    let entry = bob
        .local()
        .get(&local.to_string_lossy())?
        .ok_or_else(|| anyhow::anyhow!("local entry missing"))?;
    assert_eq!(entry.status, Status::Stale);
    Ok(())
}

#[test]
fn test_transient_files_are_never_indexed() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    fx.write("A/~temp.m3d", b"lock")?;
    fx.write("A/backup.bak", b"old")?;
    fx.write("A/BACKUP2.BAK", b"old")?;

    let alice = fx.vault("alice")?;
    alice.reindex(&fx.root)?;
    let names: BTreeSet<String> = alice.project().list(None)?.into_iter().map(|e| e.name).collect();
    assert!(!names.contains("~temp.m3d"));
    assert!(!names.contains("backup.bak"));
    assert!(!names.contains("BACKUP2.BAK"));
    assert!(names.contains("part.m3d"));
    Ok(())
}

#[test]
fn test_empty_root_clears_index() -> Result<()> {
    let fx = TestVault::with_sample_tree()?;
    let alice = fx.vault("alice")?;
    alice.reindex(&fx.root)?;

    for name in ["A", "C", "top.m3d"] {
        remove_path(&fx.canonical(name))?;
    }
    let report = alice.reindex(&fx.root)?;
    assert_eq!(report.removed, 7);
    assert!(alice.project().read()?.is_empty());
    Ok(())
}
