use pagebox::{Options, Storage};
use tempfile::TempDir;

/// A storage engine over a temporary directory, with a pinned hash seed so
/// slot layouts are reproducible across a reopen.
pub struct TestDb {
    pub storage: Storage,
    dir: TempDir,
}

fn opts(path: &std::path::Path, pool_size: usize) -> Options {
    let mut options = Options::new();
    options.path(path);
    options.pool_size(pool_size);
    options.hash_seed([7; 16]);
    options
}

#[allow(dead_code)]
impl TestDb {
    pub fn new(pool_size: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(opts(dir.path(), pool_size)).unwrap();
        TestDb { storage, dir }
    }

    /// Flush everything to disk and reopen the same database directory.
    pub fn reopen(self, pool_size: usize) -> Self {
        self.storage.sync().unwrap();
        let TestDb { storage, dir } = self;
        drop(storage);
        let storage = Storage::open(opts(dir.path(), pool_size)).unwrap();
        TestDb { storage, dir }
    }
}
