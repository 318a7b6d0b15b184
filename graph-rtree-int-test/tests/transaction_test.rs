//! All-or-nothing behaviour of write operations.

use graph_rtree::{
    Envelope, NullListener, ObjectId, ProgressLoggingListener, RTreeConfig, SpatialError,
};
use graph_rtree_int_test::test_util::{cleanup, create_small_fanout_context, run_test};
use std::time::Duration;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_failed_batch_leaves_tree_untouched() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            let tree = ctx.tree();
            ctx.insert_grid(0, 30, (0.0, 0.0))?;
            let layout = tree.to_layout()?;

            let store = ctx.store();
            let batch: Vec<ObjectId> = (100..160).collect();
            for object in &batch[..59] {
                store.insert_point(*object, *object as f64, 50.0);
            }
            let result = tree.insert_all(&batch, &mut NullListener);
            assert!(matches!(result, Err(SpatialError::UndecodableObject(159))));

            assert_eq!(tree.to_layout()?, layout);
            assert_eq!(tree.count()?, 30);
            assert!(tree.find_intersecting(&Envelope::new(100.0, 50.0, 200.0, 50.0))?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failed_update_keeps_old_entry() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            let tree = ctx.tree();
            ctx.insert_grid(0, 20, (0.0, 0.0))?;
            let layout = tree.to_layout()?;

            // an inverted box cannot be decoded
            ctx.store().insert(5, [10.0, 10.0, 0.0, 0.0]);
            assert!(matches!(tree.update(5), Err(SpatialError::UndecodableObject(5))));
            assert!(tree.is_indexed(5)?);
            assert_eq!(tree.to_layout()?, layout);
            assert_eq!(tree.find_intersecting(&Envelope::point(5.0, 0.0))?, vec![5]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_duplicate_insert_is_rejected() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            let tree = ctx.tree();
            ctx.insert_point(1, 1.0, 1.0)?;
            assert!(matches!(tree.insert(1), Err(SpatialError::AlreadyIndexed(1))));

            let batch: Vec<ObjectId> = vec![2, 3, 1];
            ctx.store().insert_point(2, 2.0, 2.0);
            ctx.store().insert_point(3, 3.0, 3.0);
            assert!(matches!(
                tree.insert_all(&batch, &mut NullListener),
                Err(SpatialError::AlreadyIndexed(1))
            ));
            assert!(!tree.is_indexed(2)?);
            assert_eq!(tree.count()?, 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_bulk_operations_report_progress() {
    run_test(
        create_small_fanout_context,
        |ctx| {
            let tree = ctx.tree();
            let store = ctx.store();
            let objects: Vec<ObjectId> = (0..500).collect();
            for object in &objects {
                store.insert_point(*object, (*object % 25) as f64, (*object / 25) as f64);
            }

            let mut listener = ProgressLoggingListener::new("bulk insert").with_interval(Duration::ZERO);
            tree.insert_all(&objects, &mut listener)?;
            assert_eq!(listener.percent(), 100.0);
            assert!(listener.lines_logged() >= 2);

            let mut listener = ProgressLoggingListener::new("remove all");
            tree.remove_all(false, &mut listener)?;
            assert_eq!(listener.percent(), 100.0);
            assert_eq!(tree.count()?, 0);
            assert_eq!(store.len(), 500);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_closed_tree_rejects_writes() {
    run_test(
        || graph_rtree_int_test::test_util::create_test_context_with(RTreeConfig::default()),
        |ctx| {
            let tree = ctx.tree();
            ctx.insert_point(1, 0.0, 0.0)?;
            tree.close()?;
            assert!(matches!(tree.insert(2), Err(SpatialError::Closed)));
            assert!(matches!(tree.delete(1, false), Err(SpatialError::Closed)));
            assert!(matches!(tree.warm_up(), Err(SpatialError::Closed)));
            Ok(())
        },
        cleanup,
    )
}
