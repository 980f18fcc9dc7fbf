//! Integration tests for matrix, tree and booster persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use boostcore::data::{ColEntry, Entry, MatrixError};
use boostcore::io::{DeserializeError, HEADER_SIZE};
use boostcore::{
    BoosterError, BoosterKind, BoosterRegistry, GBLinear, GBTree, GradBooster, Parallelism,
    RegTree, SparseMatrix,
};

// ============================================================================
// Fixtures
// ============================================================================

fn two_row_matrix() -> SparseMatrix {
    let mut m = SparseMatrix::new();
    m.add_row(&[0, 3], &[0.5, -2.0]);
    m.add_row(&[2], &[9.0]);
    m
}

fn trained_tree_booster() -> (GBTree, SparseMatrix) {
    let mut m = SparseMatrix::new();
    for i in 0..10 {
        m.add_row(&[0, 1], &[i as f32, (i % 3) as f32]);
    }
    m.build_column_view(Parallelism::Sequential);

    let mut booster = GBTree::new();
    booster.set_param("min_child_weight", "0").expect("param");
    booster.set_param("max_depth", "3").expect("param");
    booster.init_model();
    let mut grad: Vec<f32> = (0..10).map(|i| i as f32 - 4.5).collect();
    let mut hess = vec![1.0; 10];
    booster.do_boost(&mut grad, &mut hess, &m, &[]).expect("boost");
    (booster, m)
}

// ============================================================================
// Sparse Matrix
// ============================================================================

#[test]
fn column_view_of_two_rows() {
    let mut m = two_row_matrix();
    assert_eq!(m.num_row(), 2);
    assert_eq!(m.num_entry(), 3);
    assert!(matches!(m.num_col(), Err(MatrixError::NoColumnAccess)));

    m.build_column_view(Parallelism::Sequential);
    assert_eq!(m.num_col().unwrap(), 4);
    assert_eq!(m.col_slice(0), &[ColEntry::new(0, 0.5)]);
    assert!(m.col_slice(1).is_empty());
    assert_eq!(m.col_slice(2), &[ColEntry::new(1, 9.0)]);
    assert_eq!(m.col_slice(3), &[ColEntry::new(0, -2.0)]);
    assert_eq!(m.row_slice(0), &[Entry::new(0, 0.5), Entry::new(3, -2.0)]);
}

#[test]
fn matrix_file_roundtrip() {
    let mut m = two_row_matrix();
    m.build_column_view(Parallelism::Parallel);
    let path = std::env::temp_dir().join("boostcore_test_matrix_integration.bin");

    m.save_file(&path).expect("save");
    let restored = SparseMatrix::load_file(&path).expect("load");

    std::fs::remove_file(&path).ok();

    assert_eq!(restored, m);
    assert!(restored.have_col_access());
    assert_eq!(restored.col_slice(3), &[ColEntry::new(0, -2.0)]);
}

#[test]
fn matrix_without_columns_stays_row_only() {
    let m = two_row_matrix();
    let mut buf = Vec::new();
    m.serialize(&mut buf).expect("serialize");
    let restored = SparseMatrix::deserialize(&mut buf.as_slice()).expect("deserialize");
    assert!(!restored.have_col_access());
    assert_eq!(restored.row_slice(1), &[Entry::new(2, 9.0)]);
}

#[test]
fn missing_matrix_file_is_io_error() {
    let path = std::env::temp_dir().join("boostcore_test_matrix_missing.bin");
    std::fs::remove_file(&path).ok();
    let err = SparseMatrix::load_file(&path).unwrap_err();
    assert!(matches!(err, MatrixError::Io(_)), "got: {err:?}");
}

// ============================================================================
// Tree Model
// ============================================================================

#[test]
fn minimal_tree_is_68_bytes() {
    let tree = RegTree::new();
    let mut buf = Vec::new();
    tree.serialize(&mut buf).expect("serialize");
    assert_eq!(buf.len(), 68);

    let restored = RegTree::deserialize(&mut buf.as_slice()).expect("deserialize");
    assert_eq!(restored.num_nodes(), 1);
    assert!(restored.is_leaf(0));
    assert_eq!(restored.leaf_value(0), 0.0);
}

#[test]
fn tree_with_free_list_survives_file_roundtrip() {
    let mut tree = RegTree::with_roots(2);
    let (l, r) = tree.split(0, 4, 1.5, true);
    tree.split(l, 2, 0.0, false);
    tree.split(1, 0, -3.0, false);
    tree.set_leaf_value(r, 0.75);
    tree.prune(l);
    tree.refresh_max_depth();

    let path = std::env::temp_dir().join("boostcore_test_tree_integration.bin");
    {
        let mut writer = BufWriter::new(File::create(&path).expect("create"));
        tree.serialize(&mut writer).expect("serialize");
        writer.flush().expect("flush");
    }
    let restored =
        RegTree::deserialize(&mut BufReader::new(File::open(&path).expect("open"))).expect("load");

    std::fs::remove_file(&path).ok();

    assert_eq!(restored, tree);
    assert_eq!(restored.param().num_deleted, 2);
    // The freed pair is handed out again on the next split.
    let mut grown = restored.clone();
    let mut original = tree.clone();
    assert_eq!(grown.split(l, 1, 0.5, false), original.split(l, 1, 0.5, false));
}

// ============================================================================
// Booster Envelopes
// ============================================================================

#[test]
fn gbtree_file_roundtrip() {
    let (booster, m) = trained_tree_booster();
    let path = std::env::temp_dir().join("boostcore_test_gbtree_integration.bstc");

    {
        let mut writer = BufWriter::new(File::create(&path).expect("create"));
        booster.save_model(&mut writer).expect("save");
        writer.flush().expect("flush");
    }
    let mut reader = BufReader::new(File::open(&path).expect("open"));
    let restored = BoosterRegistry::with_defaults()
        .load(&mut reader)
        .expect("load");

    std::fs::remove_file(&path).ok();

    assert_eq!(restored.kind(), BoosterKind::Tree);
    assert_eq!(restored.num_feature(), 2);
    for r in 0..m.num_row() {
        assert_eq!(restored.predict(&m, r, 0), booster.predict(&m, r, 0));
    }
}

#[test]
fn loading_tree_into_linear_is_rejected() {
    let (booster, _) = trained_tree_booster();
    let mut buf = Vec::new();
    booster.save_model(&mut buf).expect("save");

    let mut linear = GBLinear::new();
    let err = linear.load_model(&mut buf.as_slice()).unwrap_err();
    assert!(
        matches!(
            err,
            BoosterError::Deserialize(DeserializeError::TypeMismatch {
                expected: BoosterKind::Linear,
                actual: BoosterKind::Tree,
            })
        ),
        "got: {err:?}"
    );
}

#[test]
fn loading_linear_into_tree_is_rejected() {
    let mut linear = GBLinear::new();
    linear.set_param("num_feature", "3").expect("param");
    linear.init_model();
    let mut buf = Vec::new();
    linear.save_model(&mut buf).expect("save");

    let err = GBTree::new().load_model(&mut buf.as_slice()).unwrap_err();
    assert!(matches!(
        err,
        BoosterError::Deserialize(DeserializeError::TypeMismatch {
            expected: BoosterKind::Tree,
            actual: BoosterKind::Linear,
        })
    ));
}

#[test]
fn envelope_errors_are_typed() {
    let (booster, _) = trained_tree_booster();
    let mut buf = Vec::new();
    booster.save_model(&mut buf).expect("save");
    let registry = BoosterRegistry::with_defaults();

    let mut bad_magic = buf.clone();
    bad_magic[0] = b'X';
    let err = registry.load(&mut bad_magic.as_slice()).err().unwrap();
    assert!(matches!(err, BoosterError::Deserialize(DeserializeError::NotAModel)));

    let mut bad_kind = buf.clone();
    bad_kind[6] = 99;
    let err = registry.load(&mut bad_kind.as_slice()).err().unwrap();
    assert!(matches!(err, BoosterError::Deserialize(DeserializeError::UnknownKind(99))));

    let mut flipped = buf.clone();
    flipped[HEADER_SIZE + 5] ^= 0x40;
    let err = registry.load(&mut flipped.as_slice()).err().unwrap();
    assert!(matches!(
        err,
        BoosterError::Deserialize(DeserializeError::ChecksumMismatch { .. })
    ));

    let err = registry.load(&mut &buf[..buf.len() - 1]).err().unwrap();
    assert!(matches!(
        err,
        BoosterError::Deserialize(DeserializeError::Truncated { .. })
    ));
}

#[test]
fn failed_load_keeps_previous_model() {
    let (mut booster, m) = trained_tree_booster();
    let before: Vec<f32> = (0..m.num_row()).map(|r| booster.predict(&m, r, 0)).collect();

    let mut buf = Vec::new();
    booster.save_model(&mut buf).expect("save");
    buf.truncate(buf.len() - 8);
    assert!(booster.load_model(&mut buf.as_slice()).is_err());

    let after: Vec<f32> = (0..m.num_row()).map(|r| booster.predict(&m, r, 0)).collect();
    assert_eq!(before, after);
}
