use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::pool::{Block, BufferStore};

/// Free lists of request stores, output blocks and staging char buffers.
///
/// One pool is shared (as `Arc<BufferPool>`) by every connection of a server. `acquire_*`
/// hands out a recycled object when one is idle and allocates otherwise; `release_*` clears
/// the object and keeps it for the next lease, up to the configured idle limits. Releasing
/// moves the object into the pool, so the releasing request can't touch it afterwards.
#[derive(Debug)]
pub struct BufferPool {
    config: EngineConfig,
    stores: Mutex<Vec<Box<BufferStore>>>,
    blocks: Mutex<Vec<Block>>,
    chars: Mutex<Vec<String>>,
    metrics: PoolMetrics,
}

/// Snapshot of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub stores_allocated: usize,
    pub stores_leased: usize,
    pub stores_idle: usize,
    pub blocks_allocated: usize,
    pub blocks_leased: usize,
    pub blocks_idle: usize,
}

#[derive(Debug, Default)]
struct PoolMetrics {
    stores_allocated: AtomicUsize,
    stores_leased: AtomicUsize,
    blocks_allocated: AtomicUsize,
    blocks_leased: AtomicUsize,
}

impl BufferPool {
    /// A pool for `config`. An invalid configuration is logged; block sizes outside the
    /// framable range are clamped.
    pub fn new(config: &EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(cause = %e, "buffer pool created from an invalid config");
        }
        Self {
            config: config.clone(),
            stores: Mutex::new(Vec::new()),
            blocks: Mutex::new(Vec::new()),
            chars: Mutex::new(Vec::new()),
            metrics: PoolMetrics::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn acquire_store(&self) -> Box<BufferStore> {
        self.metrics.stores_leased.fetch_add(1, Ordering::Relaxed);
        if let Some(store) = self.stores.lock().pop() {
            return store;
        }

        self.metrics.stores_allocated.fetch_add(1, Ordering::Relaxed);
        trace!("allocate buffer store");
        Box::new(BufferStore::new(&self.config))
    }

    pub fn release_store(&self, mut store: Box<BufferStore>) {
        self.metrics.stores_leased.fetch_sub(1, Ordering::Relaxed);
        store.clear();
        let mut stores = self.stores.lock();
        if stores.len() < self.config.max_idle_stores {
            stores.push(store);
        }
    }

    pub fn acquire_block(&self) -> Block {
        self.metrics.blocks_leased.fetch_add(1, Ordering::Relaxed);
        if let Some(block) = self.blocks.lock().pop() {
            return block;
        }

        self.metrics.blocks_allocated.fetch_add(1, Ordering::Relaxed);
        Block::new(self.config.block_size)
    }

    pub fn release_block(&self, mut block: Block) {
        self.metrics.blocks_leased.fetch_sub(1, Ordering::Relaxed);
        block.clear();
        let mut blocks = self.blocks.lock();
        if blocks.len() < self.config.max_idle_blocks {
            blocks.push(block);
        }
    }

    /// Releases every block of `chain`, leaving it empty.
    pub fn release_blocks(&self, chain: &mut Vec<Block>) {
        for block in chain.drain(..) {
            self.release_block(block);
        }
    }

    /// A staging char buffer with `char_buffer_size` capacity.
    pub fn acquire_chars(&self) -> String {
        self.chars.lock().pop().unwrap_or_else(|| String::with_capacity(self.config.char_buffer_size))
    }

    pub fn release_chars(&self, mut chars: String) {
        chars.clear();
        let mut idle = self.chars.lock();
        if idle.len() < self.config.max_idle_stores {
            idle.push(chars);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            stores_allocated: self.metrics.stores_allocated.load(Ordering::Relaxed),
            stores_leased: self.metrics.stores_leased.load(Ordering::Relaxed),
            stores_idle: self.stores.lock().len(),
            blocks_allocated: self.metrics.blocks_allocated.load(Ordering::Relaxed),
            blocks_leased: self.metrics.blocks_leased.load(Ordering::Relaxed),
            blocks_idle: self.blocks.lock().len(),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
