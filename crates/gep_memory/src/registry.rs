//! # Memory Registry
//!
//! A named directory of live allocators for budget reports.
//!
//! The registry only borrows. It never allocates through the registered
//! allocators and never frees them; it reads their statistics on demand.

use serde::Serialize;

use crate::allocator::{AllocatorStatistics, AllocatorStats};
use crate::error::{MemoryError, MemoryResult};

/// Statistics of one registered allocator at the time of the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocatorReport {
    /// Name given at registration.
    pub name: String,
    /// Snapshot of the allocator's statistics.
    pub stats: AllocatorStats,
}

/// Sums over every registered allocator.
///
/// Nested allocators are counted at every level they are registered, so a
/// pool and its registered parent both contribute the pool's region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryTotals {
    /// Number of registered allocators.
    pub allocators: usize,
    /// Sum of allocation counts.
    pub num_allocations: usize,
    /// Sum of free counts.
    pub num_frees: usize,
    /// Sum of reserved bytes.
    pub bytes_reserved: usize,
    /// Sum of used bytes.
    pub bytes_used: usize,
}

#[derive(Serialize)]
struct ReportDocument<'r> {
    totals: MemoryTotals,
    allocators: &'r [AllocatorReport],
}

struct Entry<'a> {
    name: String,
    allocator: &'a dyn AllocatorStatistics,
}

/// Borrowed allocators, reported by name in registration order.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = MemoryRegistry::new();
/// registry.register("particles", &particle_pool)?;
/// registry.register("frame", &frame_stack)?;
///
/// registry.log_report();
/// std::fs::write("memory_report.toml", registry.report_toml()?)?;
/// ```
#[derive(Default)]
pub struct MemoryRegistry<'a> {
    entries: Vec<Entry<'a>>,
}

/// Identity of an allocator: the address of its data, ignoring vtables.
fn address_of(allocator: &dyn AllocatorStatistics) -> usize {
    (allocator as *const dyn AllocatorStatistics).cast::<()>() as usize
}

impl<'a> MemoryRegistry<'a> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `allocator` under `name`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::DuplicateRegistration`] if the same allocator is
    /// already registered, under any name.
    pub fn register(&mut self, name: impl Into<String>, allocator: &'a dyn AllocatorStatistics) -> MemoryResult<()> {
        let address = address_of(allocator);
        if let Some(existing) = self.entries.iter().find(|e| address_of(e.allocator) == address) {
            return Err(MemoryError::DuplicateRegistration(existing.name.clone()));
        }
        let name = name.into();
        tracing::debug!(name = %name, "allocator registered");
        self.entries.push(Entry { name, allocator });
        Ok(())
    }

    /// Removes `allocator`. Returns whether it was registered.
    pub fn deregister(&mut self, allocator: &dyn AllocatorStatistics) -> bool {
        let address = address_of(allocator);
        let before = self.entries.len();
        self.entries.retain(|e| address_of(e.allocator) != address);
        before != self.entries.len()
    }

    /// Number of registered allocators.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots every registered allocator.
    #[must_use]
    pub fn report(&self) -> Vec<AllocatorReport> {
        self.entries
            .iter()
            .map(|e| AllocatorReport { name: e.name.clone(), stats: e.allocator.stats() })
            .collect()
    }

    /// Sums the statistics of every registered allocator.
    #[must_use]
    pub fn totals(&self) -> MemoryTotals {
        self.entries.iter().fold(MemoryTotals::default(), |mut totals, e| {
            totals.allocators += 1;
            totals.num_allocations += e.allocator.num_allocations();
            totals.num_frees += e.allocator.num_frees();
            totals.bytes_reserved += e.allocator.bytes_reserved();
            totals.bytes_used += e.allocator.bytes_used();
            totals
        })
    }

    /// Renders the report and totals as a TOML document.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Report`] if a value cannot be represented in TOML,
    /// such as a counter above `i64::MAX`.
    pub fn report_toml(&self) -> MemoryResult<String> {
        let allocators = self.report();
        let document = ReportDocument { totals: self.totals(), allocators: &allocators };
        toml::to_string(&document).map_err(|e| MemoryError::Report(e.to_string()))
    }

    /// Emits one `info` event per allocator and one for the totals.
    pub fn log_report(&self) {
        for report in self.report() {
            let stats = report.stats;
            tracing::info!(
                name = %report.name,
                allocations = stats.num_allocations,
                frees = stats.num_frees,
                reserved = stats.bytes_reserved,
                used = stats.bytes_used,
                affinity = ?stats.affinity,
                "allocator report"
            );
        }
        let totals = self.totals();
        tracing::info!(
            allocators = totals.allocators,
            reserved = totals.bytes_reserved,
            used = totals.bytes_used,
            "memory totals"
        );
    }
}

impl std::fmt::Debug for MemoryRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|e| &e.name)).finish()
    }
}
