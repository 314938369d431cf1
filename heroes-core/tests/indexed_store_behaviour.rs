//! Behavioural coverage for the write-once [`IndexedStore`].

use heroes_core::{IdIndexed, IndexedStore, Indexing, StoreState, WriteOutcome};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq)]
struct Hero {
    id_num: u32,
    id_tag: String,
}

impl Hero {
    fn new(id_num: u32) -> Self {
        Self {
            id_num,
            id_tag: format!("PID_{id_num}"),
        }
    }
}

impl IdIndexed for Hero {
    fn id_num(&self) -> u32 {
        self.id_num
    }
}

type StoreCell = RefCell<IndexedStore<Hero>>;

#[fixture]
fn store() -> StoreCell {
    RefCell::new(IndexedStore::new("heroes", Indexing::by_id()))
}

#[fixture]
fn snapshot() -> RefCell<Vec<Hero>> {
    RefCell::new(Vec::new())
}

#[fixture]
fn write_outcome() -> RefCell<Option<WriteOutcome>> {
    RefCell::new(None)
}

#[fixture]
fn lookup() -> RefCell<Vec<Option<u32>>> {
    RefCell::new(Vec::new())
}

// --- Given steps ---

#[given("a store holding heroes 1 and 2")]
fn store_with_two(#[from(store)] store: &StoreCell) {
    let outcome = store.borrow_mut().set_many([Hero::new(2), Hero::new(1)]);
    assert_eq!(outcome, WriteOutcome::Applied(2));
}

// --- When steps ---

#[when("I read every hero")]
fn read_all(#[from(store)] store: &StoreCell, #[from(snapshot)] snapshot: &RefCell<Vec<Hero>>) {
    *snapshot.borrow_mut() = store.borrow().get_all().to_vec();
}

#[when("I write hero 3")]
fn write_third(
    #[from(store)] store: &StoreCell,
    #[from(write_outcome)] outcome: &RefCell<Option<WriteOutcome>>,
) {
    *outcome.borrow_mut() = Some(store.borrow_mut().set_many([Hero::new(3)]));
}

#[when("I look up heroes 2 and 1")]
fn look_up(#[from(store)] store: &StoreCell, #[from(lookup)] lookup: &RefCell<Vec<Option<u32>>>) {
    let guard = store.borrow();
    *lookup.borrow_mut() = guard
        .get_many_by_ids(&[2, 1])
        .into_iter()
        .map(|hero| hero.map(|h| h.id_num))
        .collect();
}

// --- Then steps ---

#[then("the store is frozen")]
fn frozen(#[from(store)] store: &StoreCell) {
    assert_eq!(store.borrow().state(), StoreState::Frozen);
}

#[then("the write is rejected")]
fn rejected(#[from(write_outcome)] outcome: &RefCell<Option<WriteOutcome>>) {
    assert_eq!(*outcome.borrow(), Some(WriteOutcome::Rejected(1)));
}

#[then("reading every hero again returns heroes 1 and 2")]
fn unchanged(#[from(store)] store: &StoreCell, #[from(snapshot)] snapshot: &RefCell<Vec<Hero>>) {
    let guard = store.borrow();
    let again = guard.get_all();
    assert_eq!(again, snapshot.borrow().as_slice());
    let ids: Vec<u32> = again.iter().map(|hero| hero.id_num).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(again.iter().all(|hero| hero.id_tag.starts_with("PID_")));
}

#[then("heroes 2 and 1 are returned in that order")]
fn ordered(#[from(lookup)] lookup: &RefCell<Vec<Option<u32>>>) {
    assert_eq!(*lookup.borrow(), vec![Some(2), Some(1)]);
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/indexed_store.feature", name = $title)]
        fn $fn_name(
            store: StoreCell,
            snapshot: RefCell<Vec<Hero>>,
            write_outcome: RefCell<Option<WriteOutcome>>,
            lookup: RefCell<Vec<Option<u32>>>,
        ) {
            let _ = (store, snapshot, write_outcome, lookup);
        }
    };
}

register_scenario!(reading_freezes, "reading freezes the store");
register_scenario!(
    late_writes_are_no_ops,
    "writes after a read leave the collection unchanged"
);
register_scenario!(lookups_follow_order, "lookups by id follow the requested order");
