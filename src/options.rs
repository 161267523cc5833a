use std::path::PathBuf;

/// Options when opening a [`crate::Storage`] instance.
pub struct Options {
    /// The path to the directory where the database is stored.
    pub(crate) path: PathBuf,
    /// The number of frames in the buffer pool.
    pub(crate) pool_size: usize,
    /// Enable or disable buffer pool counters.
    pub(crate) metrics: bool,
    /// The seed for the default key-hash family.
    pub(crate) hash_seed: [u8; 16],
}

impl Options {
    /// Create a new `Options` instance with the default values and a random
    /// hash seed.
    pub fn new() -> Self {
        use rand::Rng as _;
        let mut hash_seed = [0u8; 16];
        rand::rngs::OsRng.fill(&mut hash_seed);

        Self {
            path: PathBuf::from("pagebox_db"),
            pool_size: 64,
            metrics: false,
            hash_seed,
        }
    }

    /// Set the path to the directory where the database is stored.
    pub fn path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    /// Set the number of frames in the buffer pool.
    ///
    /// May not be zero.
    pub fn pool_size(&mut self, pool_size: usize) {
        assert!(pool_size > 0);
        self.pool_size = pool_size;
    }

    /// Set counter collection on or off.
    ///
    /// Default: off.
    pub fn metrics(&mut self, metrics: bool) {
        self.metrics = metrics;
    }

    /// Set the seed for the default key-hash family.
    ///
    /// Useful for reproducibility.
    pub fn hash_seed(&mut self, hash_seed: [u8; 16]) {
        self.hash_seed = hash_seed;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
