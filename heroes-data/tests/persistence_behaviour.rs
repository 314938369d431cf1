//! Behavioural tests for [`Persister`] against an in-memory store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use heroes_data::persist::{PersistError, Persister};
use heroes_data::test_support::MemoryKvStore;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

const HERO_HASH: &str = "HERO_BY_ID";

#[derive(Default)]
struct PersistWorld {
    store: RefCell<Option<Arc<MemoryKvStore>>>,
    read: RefCell<Option<Result<HashMap<u32, String>, PersistError>>>,
}

#[fixture]
fn world() -> PersistWorld {
    PersistWorld::default()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build Tokio runtime")
        .block_on(future)
}

fn store(world: &PersistWorld) -> Arc<MemoryKvStore> {
    world
        .store
        .borrow()
        .clone()
        .expect("store must be initialised")
}

// --- Given steps ---

#[given("an empty key/value store")]
fn empty_store(world: &PersistWorld) {
    world.store.replace(Some(Arc::new(MemoryKvStore::new())));
}

#[given("a key/value store that answers every read with null")]
fn null_store(world: &PersistWorld) {
    world
        .store
        .replace(Some(Arc::new(MemoryKvStore::new().with_null_reads())));
}

// --- When steps ---

#[when("I write 700 numbered entries to the hero hash")]
fn write_entries(world: &PersistWorld) {
    let persister = Persister::new(store(world));
    let entries = (1..=700u32).map(|id| (id, format!("PID_{id}")));
    let written = block_on(persister.write_hash(HERO_HASH, entries)).expect("write");
    assert_eq!(written, 700);
}

#[when("I read the hero hash back")]
fn read_entries(world: &PersistWorld) {
    let persister = Persister::new(store(world));
    world
        .read
        .replace(Some(block_on(persister.read_hash(HERO_HASH))));
}

// --- Then steps ---

#[then("the hero hash received batches of 300, 300 and 100 fields")]
fn batch_sizes(world: &PersistWorld) {
    assert_eq!(store(world).hset_batch_sizes(HERO_HASH), vec![300, 300, 100]);
}

#[then("reading the hero hash back yields 700 entries")]
fn read_back(world: &PersistWorld) {
    let persister = Persister::new(store(world));
    let read: HashMap<u32, String> = block_on(persister.read_hash(HERO_HASH)).expect("read");
    assert_eq!(read.len(), 700);
    assert_eq!(read.get(&700).map(String::as_str), Some("PID_700"));
}

#[then("the hero hash holds 700 fields")]
fn hash_len(world: &PersistWorld) {
    let kv = store(world);
    assert_eq!(kv.hash_len(HERO_HASH), 700);
    assert_eq!(kv.hset_batch_sizes(HERO_HASH).len(), 6);
}

#[then("the read fails on the first null batch")]
fn null_batch(world: &PersistWorld) {
    let read = world.read.borrow();
    let outcome = read.as_ref().expect("read must have run");
    assert!(matches!(
        outcome,
        Err(PersistError::NullBatch { batch: 0, name }) if name == HERO_HASH
    ));
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/persistence.feature", name = $title)]
        fn $fn_name(world: PersistWorld) {
            let _ = world;
        }
    };
}

register_scenario!(bounded_batches, "a large hash is written in bounded batches");
register_scenario!(rewrite_overwrites, "rewriting a hash overwrites every field");
register_scenario!(null_batch_fatal, "a null batch read is fatal");
