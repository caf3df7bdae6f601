//! Durability tests
//!
//! An acknowledged `set` must survive killing and restarting the process.
//! Restart with recovery enabled reproduces the map state of applying the
//! acknowledged sequence in order, truncated only at records that were
//! never acknowledged.

use statestore::engine::{EngineState, StoreEngine};
use statestore::wal::log_path;
use statestore::StoreConfig;

use std::fs::{self, OpenOptions};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn config_at(dir: &TempDir) -> StoreConfig {
    StoreConfig::at(dir.path())
}

// =============================================================================
// Acknowledged Writes Survive Restart
// =============================================================================

#[test]
fn acknowledged_sets_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let engine = StoreEngine::open(config_at(&dir)).unwrap();
        for i in 1..=50 {
            let key = i.to_string();
            let value = format!(r#"{{"id":{},"name":"item-{}"}}"#, i, i);
            engine.set(key.as_bytes(), value.as_bytes()).unwrap();
        }
    }
    // Engine dropped without checkpoint or clean shutdown: the log is the
    // only durable copy

    let engine = StoreEngine::open(config_at(&dir)).unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
    for i in 1..=50 {
        let key = i.to_string();
        let expected = format!(r#"{{"id":{},"name":"item-{}"}}"#, i, i);
        assert_eq!(
            engine.get(key.as_bytes()).unwrap(),
            Some(expected.into_bytes()),
            "acknowledged write for key {} was lost",
            i
        );
    }
}

#[test]
fn last_write_per_key_wins_after_restart() {
    let dir = TempDir::new().unwrap();

    {
        let engine = StoreEngine::open(config_at(&dir)).unwrap();
        engine.set(b"k", b"v1").unwrap();
        engine.set(b"k", b"v2").unwrap();
        engine.set(b"k", b"v3").unwrap();
    }

    let engine = StoreEngine::open(config_at(&dir)).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v3".to_vec()));
}

#[test]
fn deletes_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let engine = StoreEngine::open(config_at(&dir)).unwrap();
        engine.set(b"keep", b"1").unwrap();
        engine.set(b"gone", b"2").unwrap();
        engine.delete(b"gone").unwrap();
    }

    let engine = StoreEngine::open(config_at(&dir)).unwrap();
    assert_eq!(engine.get(b"keep").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"gone").unwrap(), None);
}

// =============================================================================
// Partial Recovery: Torn Tail
// =============================================================================

#[test]
fn torn_tail_salvages_acknowledged_prefix() {
    let dir = TempDir::new().unwrap();
    let config = config_at(&dir);

    {
        let engine = StoreEngine::open(config.clone()).unwrap();
        engine.set(b"1", b"pen").unwrap();
        engine.set(b"2", b"ink").unwrap();
        engine.set(b"3", b"pad").unwrap();
    }

    // Simulate a crash mid-append: chop bytes off the final record
    let path = log_path(&config.logs_dir());
    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 6).unwrap();

    let engine = StoreEngine::open(config).unwrap();
    assert_eq!(engine.state(), EngineState::Ready);

    let report = engine.recovery_report().unwrap();
    assert!(report.partial.is_some(), "tail loss must be reported");
    assert_eq!(report.records_replayed, 2);

    // Everything before the torn record is intact; the torn record is lost
    assert_eq!(engine.get(b"1").unwrap(), Some(b"pen".to_vec()));
    assert_eq!(engine.get(b"2").unwrap(), Some(b"ink".to_vec()));
    assert_eq!(engine.get(b"3").unwrap(), None);
}

#[test]
fn store_remains_writable_after_partial_recovery() {
    let dir = TempDir::new().unwrap();
    let config = config_at(&dir);

    {
        let engine = StoreEngine::open(config.clone()).unwrap();
        engine.set(b"1", b"pen").unwrap();
        engine.set(b"2", b"ink").unwrap();
    }

    let path = log_path(&config.logs_dir());
    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 2).unwrap();

    {
        let engine = StoreEngine::open(config.clone()).unwrap();
        engine.set(b"3", b"pad").unwrap();
    }

    // A further restart sees the salvaged record and the new one
    let engine = StoreEngine::open(config).unwrap();
    assert_eq!(engine.get(b"1").unwrap(), Some(b"pen".to_vec()));
    assert_eq!(engine.get(b"2").unwrap(), None);
    assert_eq!(engine.get(b"3").unwrap(), Some(b"pad".to_vec()));
}
