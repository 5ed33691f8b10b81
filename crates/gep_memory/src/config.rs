//! # Memory Budgets
//!
//! Named allocator budgets loaded from TOML, so region sizes can be tuned per
//! platform without a rebuild.
//!
//! ```toml
//! [pools.particles]
//! chunk_size = 64
//! chunk_count = 4096
//!
//! [stacks.frame]
//! direction = "upward"
//! capacity = 1048576
//! violation_policy = "panic"
//!
//! [double_ended.level]
//! capacity = 16777216
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult, ViolationPolicy};
use crate::memory::GrowthDirection;

/// Budget of a [`PoolAllocator`](crate::PoolAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Size of every chunk in bytes.
    pub chunk_size: usize,
    /// Number of chunks.
    pub chunk_count: usize,
    /// How misuse of `free` is handled.
    #[serde(default)]
    pub violation_policy: ViolationPolicy,
}

/// Budget of a [`StackAllocator`](crate::StackAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    /// End the stack grows from.
    #[serde(default = "default_direction")]
    pub direction: GrowthDirection,
    /// Region size in bytes.
    pub capacity: usize,
    /// How misuse of `free` is handled.
    #[serde(default)]
    pub violation_policy: ViolationPolicy,
}

/// Budget of a [`DoubleEndedStackAllocator`](crate::DoubleEndedStackAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoubleEndedConfig {
    /// Region size in bytes, shared by both ends.
    pub capacity: usize,
    /// How misuse of `free` is handled.
    #[serde(default)]
    pub violation_policy: ViolationPolicy,
}

const fn default_direction() -> GrowthDirection {
    GrowthDirection::Upward
}

/// Every named budget of an application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Pool budgets by name.
    #[serde(default)]
    pub pools: BTreeMap<String, PoolConfig>,
    /// Stack budgets by name.
    #[serde(default)]
    pub stacks: BTreeMap<String, StackConfig>,
    /// Double-ended stack budgets by name.
    #[serde(default)]
    pub double_ended: BTreeMap<String, DoubleEndedConfig>,
}

impl MemoryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Config`] for malformed TOML,
    /// [`MemoryError::InvalidConfig`] for a zero-sized budget.
    pub fn from_toml_str(source: &str) -> MemoryResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| MemoryError::Config(e.to_string()))?;
        config.validate()?;
        tracing::debug!(
            pools = config.pools.len(),
            stacks = config.stacks.len(),
            double_ended = config.double_ended.len(),
            "memory configuration loaded"
        );
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Rejects budgets that cannot describe a usable region.
    pub fn validate(&self) -> MemoryResult<()> {
        for (name, pool) in &self.pools {
            if pool.chunk_size == 0 || pool.chunk_count == 0 {
                return Err(MemoryError::InvalidConfig(format!(
                    "pool '{name}' needs a non-zero chunk size and count"
                )));
            }
        }
        for (name, stack) in &self.stacks {
            if stack.capacity == 0 {
                return Err(MemoryError::InvalidConfig(format!("stack '{name}' has zero capacity")));
            }
        }
        for (name, de) in &self.double_ended {
            if de.capacity == 0 {
                return Err(MemoryError::InvalidConfig(format!(
                    "double-ended stack '{name}' has zero capacity"
                )));
            }
        }
        Ok(())
    }

    /// Serializes the configuration back to TOML.
    pub fn to_toml_string(&self) -> MemoryResult<String> {
        toml::to_string(self).map_err(|e| MemoryError::Config(e.to_string()))
    }

    /// Looks up a pool budget.
    pub fn pool(&self, name: &str) -> MemoryResult<&PoolConfig> {
        self.pools.get(name).ok_or_else(|| unknown("pool", name))
    }

    /// Looks up a stack budget.
    pub fn stack(&self, name: &str) -> MemoryResult<&StackConfig> {
        self.stacks.get(name).ok_or_else(|| unknown("stack", name))
    }

    /// Looks up a double-ended stack budget.
    pub fn double_ended(&self, name: &str) -> MemoryResult<&DoubleEndedConfig> {
        self.double_ended.get(name).ok_or_else(|| unknown("double-ended stack", name))
    }
}

fn unknown(kind: &str, name: &str) -> MemoryError {
    MemoryError::InvalidConfig(format!("no {kind} budget named '{name}'"))
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::allocator::{Allocator, AllocatorStatistics};
    use crate::memory::{DoubleEndedStackAllocator, GeneralPurposeAllocator, PoolAllocator, StackAllocator};

    const BUDGETS: &str = r#"
        [pools.particles]
        chunk_size = 64
        chunk_count = 4

        [stacks.frame]
        direction = "downward"
        capacity = 128
        violation_policy = "ignore"

        [stacks.loading]
        capacity = 256

        [double_ended.level]
        capacity = 512
        violation_policy = "panic"
    "#;

    #[test]
    fn test_parse_budgets() {
        let config = MemoryConfig::from_toml_str(BUDGETS).unwrap();

        assert_eq!(
            config.pool("particles").unwrap(),
            &PoolConfig { chunk_size: 64, chunk_count: 4, violation_policy: ViolationPolicy::default() }
        );
        let frame = config.stack("frame").unwrap();
        assert_eq!(frame.direction, GrowthDirection::Downward);
        assert_eq!(frame.violation_policy, ViolationPolicy::Ignore);
        assert_eq!(config.stack("loading").unwrap().direction, GrowthDirection::Upward);
        assert_eq!(config.double_ended("level").unwrap().violation_policy, ViolationPolicy::Panic);
    }

    #[test]
    fn test_unknown_name() {
        let config = MemoryConfig::from_toml_str(BUDGETS).unwrap();
        assert!(matches!(config.pool("missing"), Err(MemoryError::InvalidConfig(_))));
        assert!(matches!(config.double_ended("frame"), Err(MemoryError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = MemoryConfig::from_toml_str("[pools.empty]\nchunk_size = 0\nchunk_count = 8\n");
        assert!(matches!(result, Err(MemoryError::InvalidConfig(msg)) if msg.contains("empty")));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(MemoryConfig::from_toml_str("[pools.x"), Err(MemoryError::Config(_))));
        assert!(matches!(
            MemoryConfig::from_toml_str("[stacks.x]\ncapacity = 8\nsize = 3\n"),
            Err(MemoryError::Config(_))
        ));
        assert!(matches!(
            MemoryConfig::from_toml_file("/nonexistent/budgets.toml"),
            Err(MemoryError::Config(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MemoryConfig::from_toml_str(BUDGETS).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(MemoryConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_build_allocators_from_config() {
        let config = MemoryConfig::from_toml_str(BUDGETS).unwrap();
        let heap = GeneralPurposeAllocator::new();

        let pool = PoolAllocator::from_config(config.pool("particles").unwrap(), &heap).unwrap();
        assert_eq!(pool.chunk_count(), 4);

        let frame = StackAllocator::from_config(config.stack("frame").unwrap(), &heap).unwrap();
        assert_eq!(frame.direction(), GrowthDirection::Downward);
        let a = frame.allocate(16).unwrap();
        let _b = frame.allocate(16).unwrap();
        // Ignored violation: no panic, no change.
        unsafe { frame.free(a) };
        assert_eq!(frame.used(), 32);

        let level = DoubleEndedStackAllocator::from_config(config.double_ended("level").unwrap(), &heap).unwrap();
        assert_eq!(level.capacity(), 512);
        assert_eq!(heap.num_allocations(), 4);
    }
}
