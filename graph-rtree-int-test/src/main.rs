use graph_rtree::{Envelope, ProgressLoggingListener, RTreeConfig, SpatialResult};
use graph_rtree_int_test::test_util::{cleanup, create_test_context_with};
use rand::Rng;

fn main() -> SpatialResult<()> {
    colog::init();
    log::info!("Starting stress test...");
    let ctx = create_test_context_with(RTreeConfig::default())?;
    let store = ctx.store();
    let tree = ctx.tree();

    let count = 200_000u64;
    let mut rng = rand::rng();
    let objects: Vec<u64> = (0..count).collect();
    for object in &objects {
        let x = rng.random_range(-180.0..180.0);
        let y = rng.random_range(-90.0..90.0);
        store.insert(*object, [x, y, x + 0.01, y + 0.01]);
    }

    let start = std::time::Instant::now();
    let mut listener = ProgressLoggingListener::new("bulk insert");
    tree.insert_all(&objects, &mut listener)?;
    log::info!("Inserted {} objects in {:?}", count, start.elapsed());

    let start = std::time::Instant::now();
    let found = tree.find_intersecting(&Envelope::new(-10.0, -10.0, 10.0, 10.0))?;
    log::info!("Found {} objects in {:?}", found.len(), start.elapsed());

    let start = std::time::Instant::now();
    for object in objects.iter().step_by(2) {
        tree.delete(*object, false)?;
    }
    log::info!("Deleted {} objects in {:?}", count / 2, start.elapsed());

    let start = std::time::Instant::now();
    tree.flush()?;
    log::info!("Flushed {} objects in {:?}", tree.count()?, start.elapsed());

    let report = tree.check_integrity()?;
    log::info!(
        "Integrity: valid={} nodes={} height={}",
        report.is_valid, report.nodes_checked, report.tree_height
    );

    cleanup(ctx)
}
