/// Configuration for a [`SystemResource`](crate::SystemResource) pool.
#[derive(Debug, Clone, Copy)]
pub struct ResourceConfig {
    /// Number of reusable object wrappers owned by the pool.
    pub object_count: usize,
    /// Maximum number of producer ports (empty-side workers).
    pub max_producers: usize,
    /// Maximum number of consumer ports (full-side workers).
    ///
    /// Ignored when `full_queue` is false; a pure allocator has no
    /// consumer side.
    pub max_consumers: usize,
    /// Whether the resource carries a full queue. When false the resource
    /// models a pure allocator: objects are fetched empty and returned by
    /// release, never posted downstream.
    pub full_queue: bool,
    /// Enable wait-time diagnostics on blocking pops (slight overhead).
    pub enable_metrics: bool,
}

impl ResourceConfig {
    /// Creates a configuration for a full producer/consumer rendezvous.
    ///
    /// # Panics
    ///
    /// Panics if `object_count` is 0, or if either worker count is 0 or
    /// greater than 128.
    pub const fn new(object_count: usize, max_producers: usize, max_consumers: usize) -> Self {
        assert!(object_count > 0, "object_count must be at least 1");
        assert!(
            max_producers > 0 && max_producers <= 128,
            "max_producers must be between 1 and 128"
        );
        assert!(
            max_consumers > 0 && max_consumers <= 128,
            "max_consumers must be between 1 and 128"
        );

        Self {
            object_count,
            max_producers,
            max_consumers,
            full_queue: true,
            enable_metrics: false,
        }
    }

    /// Creates a configuration for a pure allocator (no full queue).
    ///
    /// # Panics
    ///
    /// Panics if `object_count` is 0, or if `max_producers` is 0 or
    /// greater than 128.
    pub const fn allocator(object_count: usize, max_producers: usize) -> Self {
        assert!(object_count > 0, "object_count must be at least 1");
        assert!(
            max_producers > 0 && max_producers <= 128,
            "max_producers must be between 1 and 128"
        );

        Self {
            object_count,
            max_producers,
            max_consumers: 0,
            full_queue: false,
            enable_metrics: false,
        }
    }

    /// Enables wait-time diagnostics on blocking pops.
    #[must_use]
    pub const fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            object_count: 8,
            max_producers: 4,
            max_consumers: 4,
            full_queue: true,
            enable_metrics: false,
        }
    }
}
