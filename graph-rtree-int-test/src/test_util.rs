use graph_rtree::{
    BboxObjectStore, Envelope, EnvelopeDecoder, NullListener, ObjectId, RTreeConfig, RTreeIndex, SpatialError,
    SpatialResult,
};
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> SpatialResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return, // Test passed
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };

                let message = format!("Panic: {}", err_msg);
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("{}", message);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(message);
            }
        }
    }

    // All retries exhausted - print full details
    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

#[derive(Clone)]
pub struct TestContext {
    path: String,
    store: Arc<BboxObjectStore>,
    tree: RTreeIndex,
}

impl TestContext {
    pub fn new(path: String, store: Arc<BboxObjectStore>, tree: RTreeIndex) -> Self {
        Self { path, store, tree }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn store(&self) -> Arc<BboxObjectStore> {
        self.store.clone()
    }

    pub fn tree(&self) -> RTreeIndex {
        self.tree.clone()
    }

    /// Closes the tree and opens the file again with `config`.
    pub fn reopen(&self, config: RTreeConfig) -> SpatialResult<TestContext> {
        self.tree.close()?;
        let tree = RTreeIndex::open(&self.path, config, self.store.clone())?;
        Ok(TestContext::new(self.path.clone(), self.store.clone(), tree))
    }

    /// Adds a point object to the store and indexes it.
    pub fn insert_point(&self, object: ObjectId, x: f64, y: f64) -> SpatialResult<()> {
        self.store.insert_point(object, x, y);
        self.tree.insert(object)
    }

    /// Adds `count` points laid out on a 10-wide grid starting at `origin`
    /// and indexes them in one batch.
    pub fn insert_grid(&self, first: ObjectId, count: u64, origin: (f64, f64)) -> SpatialResult<Vec<ObjectId>> {
        let objects: Vec<ObjectId> = (first..first + count).collect();
        for (i, object) in objects.iter().enumerate() {
            let x = origin.0 + (i % 10) as f64;
            let y = origin.1 + (i / 10) as f64;
            self.store.insert_point(*object, x, y);
        }
        self.tree.insert_all(&objects, &mut NullListener)?;
        Ok(objects)
    }

    /// Objects in the store whose envelope satisfies `predicate`.
    pub fn expected(&self, objects: &[ObjectId], predicate: impl Fn(&Envelope) -> bool) -> Vec<ObjectId> {
        let mut expected: Vec<ObjectId> = objects
            .iter()
            .copied()
            .filter(|object| {
                self.store
                    .decode_envelope(*object)
                    .map(|envelope| predicate(&envelope))
                    .unwrap_or(false)
            })
            .collect();
        expected.sort_unstable();
        expected
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    let temp_dir = env::temp_dir();
    temp_dir
        .join(format!("graph_rtree_{}.rtree", id))
        .to_string_lossy()
        .to_string()
}

pub fn create_test_context() -> SpatialResult<TestContext> {
    create_test_context_with(RTreeConfig::default())
}

pub fn create_test_context_with(config: RTreeConfig) -> SpatialResult<TestContext> {
    let path = random_path();
    let store = Arc::new(BboxObjectStore::new());
    let tree = RTreeIndex::create(&path, config, store.clone())?;
    Ok(TestContext::new(path, store, tree))
}

pub fn create_small_fanout_context() -> SpatialResult<TestContext> {
    create_test_context_with(RTreeConfig::new(4, 2)?)
}

pub fn create_memory_context(config: RTreeConfig) -> SpatialResult<TestContext> {
    let store = Arc::new(BboxObjectStore::new());
    let tree = RTreeIndex::in_memory(config, store.clone())?;
    Ok(TestContext::new(random_path(), store, tree))
}

pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    match ctx.tree().close() {
        Ok(_) | Err(SpatialError::Closed) => {}
        Err(e) => eprintln!("Warning: Failed to close tree: {:?}", e),
    }

    let path = ctx.path().to_string();
    let max_retries = 5;
    for retry in 0..max_retries {
        if !std::path::Path::new(&path).exists() {
            return Ok(());
        }
        match fs::remove_file(&path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(_) if retry < max_retries - 1 => {
                thread::sleep(Duration::from_millis(50 * (retry as u64 + 1)));
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to remove test file {} after {} attempts: {:?}",
                    path, max_retries, e
                );
                return Ok(());
            }
        }
    }

    Ok(())
}
