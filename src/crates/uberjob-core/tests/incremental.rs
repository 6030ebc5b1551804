//! Incremental re-execution against file-backed stores: second runs reuse
//! fresh values, deleted or outdated stores rebuild exactly their slice, and
//! dependent sources re-run their preparation only when out of date.

use serde_json::{json, Value};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uberjob_core::{run, CallFn, Plan, Registry, RunOptions, Signature, UberjobError};
use uberjob_stores::{JsonFileStore, PathSource, ValueStore};

fn counted(
    name: &str,
    params: [&'static str; 2],
    counter: Arc<AtomicUsize>,
    op: fn(i64, i64) -> i64,
) -> CallFn {
    CallFn::from_sync(name, Signature::positional(params), move |inv| {
        counter.fetch_add(1, Ordering::SeqCst);
        let a = inv.param(0, params[0])?.as_i64().unwrap_or_default();
        let b = inv.param(1, params[1])?.as_i64().unwrap_or_default();
        Ok(json!(op(a, b)))
    })
}

fn bump_mtime(path: &Path, ahead: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + ahead).unwrap();
}

struct Pipeline {
    adds: Arc<AtomicUsize>,
    muls: Arc<AtomicUsize>,
    x_store: Arc<JsonFileStore>,
    y_store: Arc<JsonFileStore>,
    z_store: Arc<JsonFileStore>,
}

impl Pipeline {
    fn new(dir: &Path) -> Self {
        Self {
            adds: Arc::new(AtomicUsize::new(0)),
            muls: Arc::new(AtomicUsize::new(0)),
            x_store: Arc::new(JsonFileStore::new(dir.join("x.json"))),
            y_store: Arc::new(JsonFileStore::new(dir.join("y.json"))),
            z_store: Arc::new(JsonFileStore::new(dir.join("z.json"))),
        }
    }

    /// x = add(1, 2), y = add(1, 3), z = mul(x, y), all stored.
    fn build(&self) -> (Plan, Registry, uberjob_core::NodeRef) {
        let add = counted("jobs::add", ["a", "b"], self.adds.clone(), |a, b| a + b);
        let mul = counted("jobs::mul", ["a", "b"], self.muls.clone(), |a, b| a * b);

        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let x = plan.call(&add, [1.into(), 2.into()]).unwrap();
        let y = plan.call(&add, [1.into(), 3.into()]).unwrap();
        let z = plan.call(&mul, [x.into(), y.into()]).unwrap();
        registry.add(x, self.x_store.clone()).unwrap();
        registry.add(y, self.y_store.clone()).unwrap();
        registry.add(z, self.z_store.clone()).unwrap();
        (plan, registry, z)
    }
}

#[tokio::test]
async fn second_run_reads_instead_of_recomputing() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(dir.path());

    // First run computes and persists all three values.
    let (mut plan, registry, z) = pipeline.build();
    let value = run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(12)));
    assert_eq!(pipeline.adds.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.muls.load(Ordering::SeqCst), 1);

    assert_eq!(pipeline.x_store.read().await.unwrap(), json!(3));
    assert_eq!(pipeline.y_store.read().await.unwrap(), json!(4));
    assert_eq!(pipeline.z_store.read().await.unwrap(), json!(12));

    // Second run: everything is fresh, so only the output read happens.
    let (mut plan, registry, z) = pipeline.build();
    let value = run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(12)));
    assert_eq!(pipeline.adds.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.muls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deleting_one_store_rebuilds_exactly_its_slice() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(dir.path());

    let (mut plan, registry, z) = pipeline.build();
    run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(pipeline.adds.load(Ordering::SeqCst), 2);

    // Drop x's stored value; x and z must rebuild, y must not.
    std::fs::remove_file(dir.path().join("x.json")).unwrap();

    let (mut plan, registry, z) = pipeline.build();
    let value = run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(12)));
    // One more add (x), not two.
    assert_eq!(pipeline.adds.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.muls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn changed_sources_invalidate_downstream_but_not_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let x_path = dir.path().join("x.json");
    std::fs::write(&x_path, b"3").unwrap();

    let adds = Arc::new(AtomicUsize::new(0));
    let muls = Arc::new(AtomicUsize::new(0));
    let y_store = Arc::new(JsonFileStore::new(dir.path().join("y.json")));
    let z_store = Arc::new(JsonFileStore::new(dir.path().join("z.json")));

    let build = |adds: &Arc<AtomicUsize>, muls: &Arc<AtomicUsize>| {
        let add = counted("jobs::add", ["a", "b"], adds.clone(), |a, b| a + b);
        let mul = counted("jobs::mul", ["a", "b"], muls.clone(), |a, b| a * b);

        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let x = registry
            .source(&mut plan, Arc::new(JsonFileStore::new(&x_path)))
            .unwrap();
        let y = plan.call(&add, [3.into(), 4.into()]).unwrap();
        let z = plan.call(&mul, [x.into(), y.into()]).unwrap();
        registry.add(y, y_store.clone()).unwrap();
        registry.add(z, z_store.clone()).unwrap();
        (plan, registry, z)
    };

    let (mut plan, registry, z) = build(&adds, &muls);
    let value = run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(21)));
    assert_eq!(adds.load(Ordering::SeqCst), 1);
    assert_eq!(muls.load(Ordering::SeqCst), 1);

    // Change the sourced input; its mtime moves ahead of the stored outputs.
    std::fs::write(&x_path, b"5").unwrap();
    bump_mtime(&x_path, Duration::from_secs(5));

    let (mut plan, registry, z) = build(&adds, &muls);
    let value = run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(35)));
    // y's stored value was reused; only the product recomputed.
    assert_eq!(adds.load(Ordering::SeqCst), 1);
    assert_eq!(muls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dependent_sources_rerun_preparation_only_when_stale() {
    let dir = tempfile::tempdir().unwrap();
    let a_path = dir.path().join("a.json");
    let b_path = dir.path().join("b.json");
    std::fs::write(&a_path, b"3").unwrap();

    let copies = Arc::new(AtomicUsize::new(0));
    let squares = Arc::new(AtomicUsize::new(0));

    let build = |copies: &Arc<AtomicUsize>, squares: &Arc<AtomicUsize>| {
        let copy_count = copies.clone();
        let copy = CallFn::from_sync(
            "jobs::copy",
            Signature::positional(["src", "dest"]),
            move |inv| {
                copy_count.fetch_add(1, Ordering::SeqCst);
                let src = inv.param(0, "src")?.as_str().unwrap_or_default().to_string();
                let dest = inv.param(1, "dest")?.as_str().unwrap_or_default().to_string();
                std::fs::copy(&src, &dest)
                    .map_err(|err| UberjobError::execution(err.to_string()))?;
                Ok(Value::Null)
            },
        );
        let square_count = squares.clone();
        let square = CallFn::from_sync("jobs::square", Signature::positional(["v"]), move |inv| {
            square_count.fetch_add(1, Ordering::SeqCst);
            let v = inv.param(0, "v")?.as_i64().unwrap_or_default();
            Ok(json!(v * v))
        });

        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let a = registry
            .source(&mut plan, Arc::new(PathSource::new(&a_path)))
            .unwrap();
        let prepared = plan
            .call(&copy, [a.into(), b_path.display().to_string().into()])
            .unwrap();
        let b = registry
            .source(&mut plan, Arc::new(JsonFileStore::new(&b_path)))
            .unwrap();
        plan.add_dependency(prepared, b).unwrap();
        let out = plan.call(&square, [b.into()]).unwrap();
        (plan, registry, out)
    };

    // b is absent: the copy runs, then the read.
    let (mut plan, registry, out) = build(&copies, &squares);
    let value = run(&mut plan, Some(&registry), Some(out.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(9)));
    assert_eq!(copies.load(Ordering::SeqCst), 1);

    // b is now at least as new as a: the copy is skipped.
    let (mut plan, registry, out) = build(&copies, &squares);
    let value = run(&mut plan, Some(&registry), Some(out.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(9)));
    assert_eq!(copies.load(Ordering::SeqCst), 1);

    // a moves ahead of b: the copy runs again and the new value flows through.
    std::fs::write(&a_path, b"5").unwrap();
    bump_mtime(&a_path, Duration::from_secs(5));

    let (mut plan, registry, out) = build(&copies, &squares);
    let value = run(&mut plan, Some(&registry), Some(out.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(25)));
    assert_eq!(copies.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fresh_time_forces_rebuild_of_older_values() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(dir.path());

    let (mut plan, registry, z) = pipeline.build();
    run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new())
        .await
        .unwrap();
    assert_eq!(pipeline.muls.load(Ordering::SeqCst), 1);

    // A cutoff far in the future treats every stored value as absent.
    let cutoff = chrono::Utc::now() + chrono::Duration::hours(1);
    let (mut plan, registry, z) = pipeline.build();
    run(
        &mut plan,
        Some(&registry),
        Some(z.into()),
        RunOptions::new().with_fresh_time(cutoff),
    )
    .await
    .unwrap();
    assert_eq!(pipeline.adds.load(Ordering::SeqCst), 4);
    assert_eq!(pipeline.muls.load(Ordering::SeqCst), 2);
}
