use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nodus::{Context, ContextOptions};
use std::fs;

fn bench_resolution(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("entry.ns"), "exports = {x: 1}\n").unwrap();
    let nested = dir.path().join("nodus_modules/dep");
    fs::create_dir_all(&nested).unwrap();
    fs::write(
        nested.join("nodus.json"),
        r#"{"name":"dep","version":"1.0.0","main":"lib/main.ns"}"#,
    )
    .unwrap();
    fs::create_dir_all(nested.join("lib")).unwrap();
    fs::write(nested.join("lib/main.ns"), "exports = {}\n").unwrap();

    let ctx = Context::new(ContextOptions {
        current_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    });
    ctx.enter();
    let require = ctx.require_root();

    c.bench_function("resolve_relative_cached", |b| {
        b.iter(|| black_box(require.resolve("./entry").unwrap()))
    });

    c.bench_function("resolve_package_entry", |b| {
        b.iter(|| black_box(require.resolve("dep").unwrap()))
    });

    ctx.leave();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
