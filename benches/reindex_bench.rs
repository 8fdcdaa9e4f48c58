use cadsync::vault::Vault;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::fs;
use std::hint::black_box;
use std::path::Path;
use tempfile::tempdir;

/// `dirs` directories with `files` documents each.
fn create_tree(root: &Path, dirs: usize, files: usize) {
    for d in 0..dirs {
        let dir = root.join(format!("ASM-{d:03}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files {
            fs::write(dir.join(format!("PRT-{d:03}-{f:03}.m3d")), b"part").unwrap();
        }
        fs::write(dir.join("~lock.m3d"), b"").unwrap();
    }
}

fn benchmark_reindex(c: &mut Criterion) {
    let mut group = c.benchmark_group("reindex");

    for dirs in &[10, 50] {
        let temp = tempdir().unwrap();
        let root = temp.path().join("CAD");
        create_tree(&root, *dirs, 20);
        let vault = Vault::open(&temp.path().join("idx"), temp.path().join("local"), "bench").unwrap();
        vault.reindex(&root).unwrap();

        // Steady state: nothing changed since the last scan
        group.bench_with_input(BenchmarkId::new("unchanged", dirs), &root, |b, root| {
            b.iter(|| vault.reindex(black_box(root)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_sync(c: &mut Criterion) {
    let temp = tempdir().unwrap();
    let root = temp.path().join("CAD");
    create_tree(&root, 20, 20);
    let vault = Vault::open(&temp.path().join("idx"), temp.path().join("local"), "bench").unwrap();
    vault.reindex(&root).unwrap();
    vault.sync_to_local().unwrap();

    c.bench_function("sync_to_local_unchanged", |b| {
        b.iter(|| vault.sync_to_local().unwrap());
    });
}

criterion_group!(benches, benchmark_reindex, benchmark_sync);
criterion_main!(benches);
