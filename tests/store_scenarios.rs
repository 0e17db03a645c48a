//! End-to-end dataset-layer coverage of the concrete scenarios: full
//! `Dataset` lifecycles exercised through the same public API a request
//! handler uses, rather than the column-level unit tests already in
//! `src/store/*`.

use coldataset::dataset::ColumnType;
use coldataset::Dataset;

fn file_len(dir: &std::path::Path, id: &str) -> u64 {
    std::fs::metadata(dir.join(id)).unwrap().len()
}

#[test]
fn scenario_create_set_and_grow_and_shrink_a_string_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t1");
    let mut ds = Dataset::create(&path, "t1".into(), 3).unwrap();

    let c = ds.column_create("c".into(), ColumnType::String).unwrap();
    ds.set_string(&c, 0, b"hi").unwrap();
    ds.set_string(&c, 1, b"hello world").unwrap();
    ds.set_string(&c, 2, b"").unwrap();

    assert_eq!(ds.get_string(&c, 0).unwrap(), b"hi");
    assert_eq!(ds.get_string(&c, 1).unwrap(), b"hello world");
    assert_eq!(ds.get_string(&c, 2).unwrap(), b"");
    assert_eq!(file_len(&path, &c), 8 + 24 + 3 * 16);

    // set(1, "A" * 100): chain length becomes max(1, 1 + (100-5)/12) = 8,
    // growing from the 1-block start by (8-1)*16 = 112 bytes.
    let before = file_len(&path, &c);
    ds.set_string(&c, 1, &[b'A'; 100]).unwrap();
    assert_eq!(ds.get_string(&c, 1).unwrap(), vec![b'A'; 100]);
    assert_eq!(file_len(&path, &c), before + 112);

    // set(1, "B"): row 1 shrinks back to a single block, freeing 7.
    ds.set_string(&c, 1, b"B").unwrap();
    assert_eq!(ds.get_string(&c, 1).unwrap(), b"B");
    assert_eq!(file_len(&path, &c), before);

    let r = ds.column_create("r".into(), ColumnType::Real).unwrap();
    ds.set_real(&r, 0, 3.5).unwrap();
    ds.set_real(&r, 2, -0.25).unwrap();
    assert_eq!(ds.get_real(&r, 0).unwrap(), 3.5);
    assert_eq!(ds.get_real(&r, 1).unwrap(), 0.0);
    assert_eq!(ds.get_real(&r, 2).unwrap(), -0.25);

    drop(ds);

    // Scenario 5: reopen recovers manifest and both columns' values exactly.
    let mut reopened = Dataset::open(&path).unwrap();
    assert_eq!(reopened.get_info().name, "t1");
    assert_eq!(reopened.get_column_count(), 2);
    assert_eq!(reopened.get_string(&c, 1).unwrap(), b"B");
    assert_eq!(reopened.get_real(&r, 0).unwrap(), 3.5);
    assert_eq!(reopened.get_real(&r, 1).unwrap(), 0.0);
    assert_eq!(reopened.get_real(&r, 2).unwrap(), -0.25);
}

#[test]
fn generation_numbers_are_strictly_increasing_per_column() {
    let dir = tempfile::tempdir().unwrap();
    let mut ds = Dataset::create(dir.path().join("d"), "t".into(), 4).unwrap();
    let c = ds.column_create("c".into(), ColumnType::String).unwrap();

    let mut last = 0;
    for i in 0..4 {
        let gen = ds.set_string(&c, i, b"v").unwrap();
        assert!(gen > last);
        last = gen;
    }
}

#[test]
fn batch_rows_without_indices_do_not_touch_generation() {
    let dir = tempfile::tempdir().unwrap();
    let mut ds = Dataset::create(dir.path().join("d"), "t".into(), 3).unwrap();
    let c = ds.column_create("c".into(), ColumnType::String).unwrap();

    assert_eq!(ds.generation(&c).unwrap(), 0);
    ds.set_string_rows(&c, &[0, 1, 2], &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]).unwrap();
    assert_eq!(ds.generation(&c).unwrap(), 0);
    assert_eq!(
        ds.get_string_rows(&c, &[0, 1, 2]).unwrap(),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );
}

#[test]
fn two_datasets_hold_independent_advisory_locks() {
    let dir = tempfile::tempdir().unwrap();
    let _a = Dataset::create(dir.path().join("a"), "a".into(), 1).unwrap();
    let _b = Dataset::create(dir.path().join("b"), "b".into(), 1).unwrap();
}

#[test]
fn opening_an_already_open_dataset_fails_instead_of_racing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("d");
    let _held = Dataset::create(&path, "d".into(), 1).unwrap();
    assert!(Dataset::open(&path).is_err());
}
