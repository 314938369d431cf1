//! Behavioural tests for [`Ingestor`].
//!
//! Sources are served by [`StubSource`], except for the local mirror scenario
//! which reads a temporary directory through [`LocalSource`].

use std::cell::RefCell;
use std::fs;

use camino::Utf8Path;
use heroes_core::ShapeError;
use heroes_data::source::{HierarchicalSource, LocalSource, RepositoryDetails};
use heroes_data::test_support::StubSource;
use heroes_data::{Ingestor, SourceRoot};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value;
use tempfile::TempDir;

const DATA_TREE: &str = "data";
const COMBINED_BLOB: &str = "all.json";
const TRUNCATED_BLOB: &str = "data/a.json";

/// World state shared by the ingestion steps.
#[derive(Default)]
struct IngestWorld {
    stub: RefCell<Option<StubSource>>,
    mirror: RefCell<Option<(TempDir, LocalSource)>>,
    walks: RefCell<Vec<Vec<u64>>>,
}

#[fixture]
fn world() -> IngestWorld {
    IngestWorld::default()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build Tokio runtime")
        .block_on(future)
}

fn id_of(value: Value) -> Result<u64, ShapeError> {
    value
        .get("id_num")
        .and_then(Value::as_u64)
        .ok_or_else(|| ShapeError::new("missing numeric `id_num`"))
}

fn walk(source: &dyn HierarchicalSource, root: SourceRoot) -> Vec<u64> {
    block_on(Ingestor::new(source, root).ingest(|_: &Value| true, id_of)).expect("ingest")
}

fn heroes(ids: &[u64]) -> String {
    let records: Vec<Value> = ids
        .iter()
        .map(|id| serde_json::json!({ "id_num": id, "id_tag": format!("PID_{id}") }))
        .collect();
    Value::Array(records).to_string()
}

// --- Given steps ---

#[given("a source tree holding one blob with hero 1")]
fn one_blob(world: &IngestWorld) {
    let stub = StubSource::new().with_blob("data/heroes/a.json", &heroes(&[1]));
    world.stub.replace(Some(stub));
}

#[given("a source whose only blob is truncated to hero 1 but holds heroes 1 and 2")]
fn truncated_blob(world: &IngestWorld) {
    let full = heroes(&[1, 2]);
    let truncated = heroes(&[1]);
    assert!(full.len() >= truncated.len());
    let stub = StubSource::new().with_truncated_blob(TRUNCATED_BLOB, &truncated, &full);
    world.stub.replace(Some(stub));
}

#[given("a source with heroes 1 and 2 in nested blobs and in one combined blob")]
fn nested_and_combined(world: &IngestWorld) {
    let stub = StubSource::new()
        .with_blob("data/a.json", &heroes(&[2]))
        .with_blob("data/nested/deeper/b.json", &heroes(&[1]))
        .with_blob(COMBINED_BLOB, &heroes(&[1, 2]));
    world.stub.replace(Some(stub));
}

#[given("a local mirror holding one blob with hero 1")]
fn local_mirror(world: &IngestWorld) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8Path::from_path(dir.path()).expect("utf-8 temp dir");
    let data = root.join("feh-assets-json").join("data").join("heroes");
    fs::create_dir_all(&data).expect("create mirror tree");
    fs::write(data.join("a.json"), heroes(&[1])).expect("write blob");
    let details = RepositoryDetails::new(
        "HertzDevil",
        "feh-assets-json",
        "master",
        "https://raw.githubusercontent.com/HertzDevil/feh-assets-json",
    );
    let source = LocalSource::open(root, &details).expect("open mirror");
    world.mirror.replace(Some((dir, source)));
}

// --- When steps ---

#[when("I ingest the data tree")]
fn ingest_tree(world: &IngestWorld) {
    let stub = world.stub.borrow();
    let source = stub.as_ref().expect("source must be initialised");
    let ids = walk(source, SourceRoot::tree(DATA_TREE));
    world.walks.borrow_mut().push(ids);
}

#[when("I ingest the combined blob")]
fn ingest_blob(world: &IngestWorld) {
    let stub = world.stub.borrow();
    let source = stub.as_ref().expect("source must be initialised");
    let ids = walk(source, SourceRoot::blob(COMBINED_BLOB));
    world.walks.borrow_mut().push(ids);
}

#[when("I ingest the mirrored data tree")]
fn ingest_mirror(world: &IngestWorld) {
    let mirror = world.mirror.borrow();
    let (_, source) = mirror.as_ref().expect("mirror must be initialised");
    let ids = walk(source, SourceRoot::tree(DATA_TREE));
    world.walks.borrow_mut().push(ids);
}

// --- Then steps ---

#[then("only hero 1 is ingested")]
fn only_hero_one(world: &IngestWorld) {
    assert_eq!(world.walks.borrow().last(), Some(&vec![1]));
}

#[then("heroes 1 and 2 are ingested")]
fn heroes_one_and_two(world: &IngestWorld) {
    assert_eq!(world.walks.borrow().last(), Some(&vec![1, 2]));
}

#[then("the raw path of the blob was fetched once")]
fn raw_fetched_once(world: &IngestWorld) {
    let stub = world.stub.borrow();
    let source = stub.as_ref().expect("source must be initialised");
    assert_eq!(source.raw_fetches(TRUNCATED_BLOB), 1);
}

#[then("both walks yield the same records")]
fn walks_agree(world: &IngestWorld) {
    let mut walks = world.walks.borrow().clone();
    for ids in &mut walks {
        ids.sort_unstable();
    }
    assert_eq!(walks.len(), 2);
    assert_eq!(walks.first(), walks.last());
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/ingestion.feature", name = $title)]
        fn $fn_name(world: IngestWorld) {
            let _ = world;
        }
    };
}

register_scenario!(single_blob_tree, "a tree holding one blob yields its record");
register_scenario!(
    truncated_blob_fallback,
    "a truncated blob is re-read through the raw path"
);
register_scenario!(
    tree_blob_equivalence,
    "nested trees and a single blob yield the same records"
);
register_scenario!(local_mirror_records, "a local mirror serves the same records");
