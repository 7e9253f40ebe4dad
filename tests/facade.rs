use std::path::Path;

use gkv::{Driver, Gkv, KvStore, KvsEngine, KvsError, MemoryStore, Registry, Result, SledStore};
use tempfile::TempDir;

fn broken(_: &Path) -> Result<Box<dyn KvsEngine>> {
    Err(KvsError::Other("broken driver".to_owned()))
}

fn broken_driver() -> Driver {
    Driver {
        name: "broken",
        default_location: "",
        open: broken,
    }
}

/// Registers tables but fails every read.
struct FailingStore;

impl KvsEngine for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn register(&mut self, _: &[u8]) -> Result<()> {
        Ok(())
    }

    fn put(&mut self, _: &[u8], _: &[u8], _: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get(&mut self, _: &[u8], _: &[u8]) -> Result<Option<Vec<u8>>> {
        Err(KvsError::Other("disk failure".to_owned()))
    }

    fn delete(&mut self, _: &[u8], _: &[u8]) -> Result<()> {
        Ok(())
    }

    fn count(&mut self, _: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn iterate(&mut self, _: &[u8], _: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn open_failing(_: &Path) -> Result<Box<dyn KvsEngine>> {
    Ok(Box::new(FailingStore))
}

// A read error surfaces through `lookup` but reads as an empty value through `get`.
#[test]
fn get_hides_engine_errors() -> Result<()> {
    let mut db = Gkv::new(Registry::with(Driver {
        name: "failing",
        default_location: "",
        open: open_failing,
    }));
    db.open(b"t", None)?;
    db.put(b"t", b"k", b"v")?;
    assert!(db.get(b"t", b"k").is_empty());
    assert!(matches!(db.lookup(b"t", b"k"), Err(KvsError::Other(_))));
    assert!(db.is_open());
    Ok(())
}

#[test]
fn last_registered_driver_is_used() -> Result<()> {
    let mut registry = Registry::new();
    registry.register(broken_driver());
    registry.register(MemoryStore::driver());
    assert_eq!(registry.name(), Some("memory"));

    let mut db = Gkv::new(registry);
    db.open(b"users", None)?;
    assert_eq!(db.driver_name(), Some("memory"));
    Ok(())
}

#[test]
fn override_before_next_open() -> Result<()> {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let mut db = Gkv::new(Registry::with(MemoryStore::driver()));
    db.open(b"users", None)?;
    db.put(b"users", b"alice", b"30")?;

    db.registry_mut().register(SledStore::driver());
    assert_eq!(db.driver_name(), Some("memory"));

    db.open(b"users", Some(temp_dir.path()))?;
    assert_eq!(db.driver_name(), Some("sled"));
    assert_eq!(db.lookup(b"users", b"alice")?, None);
    Ok(())
}

#[test]
fn construction_failure_leaves_facade_closed() {
    let mut db = Gkv::new(Registry::with(broken_driver()));
    assert!(matches!(db.open(b"users", None), Err(KvsError::Other(_))));
    assert!(!db.is_open());
    assert!(db.get(b"users", b"alice").is_empty());
    assert!(matches!(
        db.count(b"users"),
        Err(KvsError::ServiceNotStarted)
    ));
}

#[test]
fn calls_before_open() {
    let mut db = Gkv::new(Registry::with(MemoryStore::driver()));
    assert!(matches!(
        db.put(b"users", b"alice", b"30"),
        Err(KvsError::ServiceNotStarted)
    ));
    assert!(matches!(
        db.lookup(b"users", b"alice"),
        Err(KvsError::ServiceNotStarted)
    ));
    assert!(db.get(b"users", b"alice").is_empty());
    assert!(matches!(
        db.iterate(b"users", |_, _| true),
        Err(KvsError::ServiceNotStarted)
    ));
}

fn users_scenario(driver: Driver, path: Option<&Path>) -> Result<()> {
    let mut db = Gkv::new(Registry::with(driver));
    db.open(b"users", path)?;
    db.put(b"users", b"alice", b"30")?;
    assert_eq!(db.get(b"users", b"alice"), b"30");
    assert_eq!(db.count(b"users")?, 1);
    db.put(b"users", b"alice", b"31")?;
    assert_eq!(db.count(b"users")?, 1);
    assert_eq!(db.get(b"users", b"alice"), b"31");
    assert!(db.get(b"users", b"bob").is_empty());
    db.delete(b"users", b"alice")?;
    assert_eq!(db.count(b"users")?, 0);
    db.close()
}

#[test]
fn users_scenario_on_every_driver() -> Result<()> {
    users_scenario(MemoryStore::driver(), None)?;

    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    users_scenario(KvStore::driver(), Some(&temp_dir.path().join("kvs")))?;
    users_scenario(SledStore::driver(), Some(&temp_dir.path().join("sled")))?;
    #[cfg(feature = "sqlite")]
    users_scenario(
        gkv::SqliteStore::driver(),
        Some(&temp_dir.path().join("data.db")),
    )?;
    #[cfg(feature = "rocksdb")]
    users_scenario(
        gkv::RocksStore::driver(),
        Some(&temp_dir.path().join("rocksdb")),
    )?;
    Ok(())
}

#[test]
fn reopen_keeps_data() -> Result<()> {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let mut db = Gkv::new(Registry::with(KvStore::driver()));
    db.open(b"users", Some(temp_dir.path()))?;
    db.put(b"users", b"alice", b"30")?;
    db.close()?;

    db.open(b"users", Some(temp_dir.path()))?;
    assert_eq!(db.get(b"users", b"alice"), b"30");
    assert_eq!(db.table(), Some(&b"users"[..]));
    Ok(())
}

#[test]
fn iterate_through_facade() -> Result<()> {
    let mut db = Gkv::new(Registry::with(MemoryStore::driver()));
    db.open(b"t", None)?;
    for i in 0..10u8 {
        db.put(b"t", &[i], &[i, i])?;
    }
    let mut seen = Vec::new();
    db.iterate(b"t", |k, v| {
        seen.push((k.to_vec(), v.to_vec()));
        seen.len() < 3
    })?;
    assert_eq!(
        seen,
        vec![
            (vec![0], vec![0, 0]),
            (vec![1], vec![1, 1]),
            (vec![2], vec![2, 2])
        ]
    );
    Ok(())
}
