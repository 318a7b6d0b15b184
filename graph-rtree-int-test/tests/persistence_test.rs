//! Persistence of the record-and-link layout across reopen.

use graph_rtree::rtree::LayoutStorage;
use graph_rtree::{
    BboxObjectStore, Envelope, RTreeConfig, RTreeIndex, SpatialError, SplitMode,
};
use graph_rtree_int_test::test_util::{
    cleanup, create_small_fanout_context, create_test_context, random_path, run_test,
};
use std::path::Path;
use std::sync::Arc;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_reopen_restores_identical_tree() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            let objects = ctx.insert_grid(0, 250, (0.0, 0.0))?;
            for object in objects.iter().step_by(3) {
                ctx.tree().delete(*object, false)?;
            }
            let layout = ctx.tree().to_layout()?;
            let count = ctx.tree().count()?;

            let reopened = ctx.reopen(RTreeConfig::new(4, 2)?)?;
            let tree = reopened.tree();
            assert_eq!(tree.to_layout()?, layout);
            assert_eq!(tree.count()?, count);
            assert!(tree.check_integrity()?.is_valid);

            let mut found = tree.find_contained(&Envelope::new(0.0, 0.0, 9.0, 2.0))?;
            found.sort_unstable();
            let expected = reopened.expected(&objects, |envelope| {
                Envelope::new(0.0, 0.0, 9.0, 2.0).contains(envelope)
            });
            let expected: Vec<u64> = expected.into_iter().filter(|o| o % 3 != 0).collect();
            assert_eq!(found, expected);
            tree.close()?;
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_stored_fanout_wins_over_configuration() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            ctx.insert_grid(0, 40, (0.0, 0.0))?;
            let config = RTreeConfig::new(50, 20)?.with_split_mode(SplitMode::Greene);
            let reopened = ctx.reopen(config)?;
            let tree = reopened.tree();

            assert_eq!(tree.config().max_node_references(), 4);
            assert_eq!(tree.config().min_node_references(), 2);
            assert_eq!(tree.config().split_mode(), SplitMode::Greene);

            reopened.insert_grid(100, 40, (50.0, 50.0))?;
            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert_eq!(tree.count()?, 80);
            tree.close()?;
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unflushed_tree_is_written_on_drop() {
    let path = random_path();
    let store = Arc::new(BboxObjectStore::new());
    {
        let tree = RTreeIndex::create(&path, RTreeConfig::default(), store.clone()).unwrap();
        for object in 0..30u64 {
            store.insert_point(object, object as f64, 0.0);
            tree.insert(object).unwrap();
        }
    }

    let tree = RTreeIndex::open(&path, RTreeConfig::default(), store).unwrap();
    assert_eq!(tree.count().unwrap(), 30);
    tree.drop_index().unwrap();
    assert!(!Path::new(&path).exists());
}

#[test]
fn test_missing_object_fails_to_open() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.insert_grid(0, 20, (0.0, 0.0))?;
            ctx.tree().close()?;
            ctx.store().remove(7);

            let result = RTreeIndex::open(ctx.path(), RTreeConfig::default(), ctx.store());
            assert!(matches!(result, Err(SpatialError::UndecodableObject(7))));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_corrupted_file_fails_to_open() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.insert_grid(0, 20, (0.0, 0.0))?;
            ctx.tree().close()?;

            let mut bytes = std::fs::read(ctx.path())?;
            let middle = bytes.len() - 10;
            bytes[middle] ^= 0x5A;
            std::fs::write(ctx.path(), &bytes)?;

            assert!(RTreeIndex::open(ctx.path(), RTreeConfig::default(), ctx.store()).is_err());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_layout_links_on_disk() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            ctx.insert_grid(0, 12, (0.0, 0.0))?;
            ctx.tree().flush()?;

            let storage = LayoutStorage::open(Path::new(ctx.path()))?;
            let layout = storage.read_layout()?;
            assert_eq!(layout, ctx.tree().to_layout()?);
            assert_eq!(layout.metadata.total_count, 12);
            assert_eq!(layout.metadata.max_node_references, 4);
            Ok(())
        },
        cleanup,
    )
}
