use flyto_index::bm25::Bm25Index;
use flyto_index::model::Index;
use flyto_index::store::Store;
use flyto_index::{CancelFlag, Engine};
use std::fs;

#[test]
fn scan_serialize_load_serialize_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ws");
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("app.py"),
        "from util import helper\n\ndef main():\n    helper()\n",
    )
    .unwrap();
    fs::write(root.join("util.py"), "def helper():\n    return 1\n").unwrap();

    let engine = Engine::open(&root).unwrap();
    engine.scan(&CancelFlag::new()).unwrap();

    let index_path = root.join(".flyto-index/index.json");
    let bytes = fs::read(&index_path).unwrap();

    let store = Store::new(root.join(".flyto-index"));
    let loaded: Index = store.load_index().unwrap().unwrap();
    let reserialized = serde_json::to_vec_pretty(&loaded).unwrap();
    assert_eq!(bytes, reserialized);

    let bm25: Bm25Index = store.load_bm25().unwrap().unwrap();
    let bm25_bytes = fs::read(root.join(".flyto-index/bm25.json")).unwrap();
    assert_eq!(bm25_bytes, serde_json::to_vec_pretty(&bm25).unwrap());
}

#[test]
fn unknown_top_level_keys_are_ignored_and_missing_keys_default() {
    let payload = r#"{
  "symbols": {},
  "version": "9.9.9",
  "some_future_section": {"anything": [1, 2, 3]}
}"#;
    let index: Index = serde_json::from_str(payload).unwrap();
    assert_eq!(index.version, "9.9.9");
    assert!(index.files.is_empty());
    assert!(index.edges.is_empty());
    assert!(index.reverse.is_empty());
    assert!(index.unresolved.is_empty());
    assert!(index.apis.is_empty());
    assert!(index.calls.is_empty());
}

#[test]
fn symbol_bodies_are_retrievable_from_the_content_log() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ws");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("util.py"), "def helper():\n    return 1\n").unwrap();

    let engine = Engine::open(&root).unwrap();
    engine.scan(&CancelFlag::new()).unwrap();

    let id = "ws:util.py:function:helper".parse().unwrap();
    let body = engine.store().symbol_body(&id).unwrap().unwrap();
    assert!(body.starts_with("def helper()"));
    assert!(body.contains("return 1"));
}

#[test]
fn corrupt_index_files_fall_back_to_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join(".flyto-index");
    fs::create_dir_all(&store_dir).unwrap();
    fs::write(store_dir.join("index.json"), "{not json").unwrap();

    let store = Store::new(&store_dir);
    assert!(store.load_index().unwrap().is_none());
}
