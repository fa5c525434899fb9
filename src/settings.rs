//! Table Settings
//!
//! Everything the table needs from its embedding application: where spill
//! files go, how large an arena is, how much declared memory is tolerated
//! before a maintenance pass runs, the directory depth bounds, and three
//! diagnostic hooks fired during maintenance.
//!
//! ## Example
//!
//! ```
//! use blockkv::Settings;
//!
//! let settings = Settings::new(std::env::temp_dir())
//!     .with_arena_size(1024 * 1024)
//!     .with_memory_ceiling(64 * 1024 * 1024)
//!     .with_depth(8, 20)
//!     .on_archiving(|| println!("archiving"));
//!
//! assert!(settings.validate().is_ok());
//! ```

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::path::PathBuf;

/// Smallest arena that can hold a useful bucket.
pub const MIN_ARENA_SIZE: usize = 64;

/// Largest directory depth; the directory holds `2^depth` slots.
pub const MAX_DEPTH: u32 = 30;

/// Tunables of the maintenance pass.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Fraction of used arena bytes a pass tries to move to the spill tier (default: 0.2)
    pub archive_fraction: f64,

    /// Arenas whose wasted/capacity ratio exceeds this are compacted (default: 0.1)
    pub compaction_threshold: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            archive_fraction: 0.2,
            compaction_threshold: 0.1,
        }
    }
}

type Hook = Box<dyn FnMut()>;

/// Callbacks fired by the maintenance pass.
///
/// They exist for observability only; nothing in the table depends on them.
#[derive(Default)]
pub struct MaintenanceHooks {
    on_archiving: Option<Hook>,
    on_compacting_start: Option<Hook>,
    on_compacting_end: Option<Hook>,
}

impl MaintenanceHooks {
    pub(crate) fn archiving(&mut self) {
        if let Some(hook) = self.on_archiving.as_mut() {
            hook();
        }
    }

    pub(crate) fn compacting_start(&mut self) {
        if let Some(hook) = self.on_compacting_start.as_mut() {
            hook();
        }
    }

    pub(crate) fn compacting_end(&mut self) {
        if let Some(hook) = self.on_compacting_end.as_mut() {
            hook();
        }
    }
}

impl fmt::Debug for MaintenanceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaintenanceHooks")
            .field("on_archiving", &self.on_archiving.is_some())
            .field("on_compacting_start", &self.on_compacting_start.is_some())
            .field("on_compacting_end", &self.on_compacting_end.is_some())
            .finish()
    }
}

/// Configuration of a [`Table`](crate::Table).
#[derive(Debug)]
pub struct Settings {
    /// Directory receiving spill files
    pub path: PathBuf,

    /// Bytes per memory arena and per spill buffer (default: 64 MiB)
    pub arena_size: usize,

    /// Declared arena memory that triggers maintenance (default: 2 GiB)
    pub memory_ceiling: u64,

    /// Directory depth in bits at creation (default: 4)
    pub initial_depth: u32,

    /// Directory depth after which the directory stops growing (default: 24)
    pub maximal_depth: u32,

    /// Maintenance tunables
    pub maintenance: MaintenanceConfig,

    /// Maintenance callbacks
    pub hooks: MaintenanceHooks,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir(),
            arena_size: 64 * 1024 * 1024,
            memory_ceiling: 2048 * 1024 * 1024,
            initial_depth: 4,
            maximal_depth: 24,
            maintenance: MaintenanceConfig::default(),
            hooks: MaintenanceHooks::default(),
        }
    }
}

impl Settings {
    /// Creates default settings spilling into `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_arena_size(mut self, arena_size: usize) -> Self {
        self.arena_size = arena_size;
        self
    }

    pub fn with_memory_ceiling(mut self, memory_ceiling: u64) -> Self {
        self.memory_ceiling = memory_ceiling;
        self
    }

    /// Sets the initial and maximal directory depth.
    pub fn with_depth(mut self, initial: u32, maximal: u32) -> Self {
        self.initial_depth = initial;
        self.maximal_depth = maximal;
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn on_archiving(mut self, hook: impl FnMut() + 'static) -> Self {
        self.hooks.on_archiving = Some(Box::new(hook));
        self
    }

    pub fn on_compacting_start(mut self, hook: impl FnMut() + 'static) -> Self {
        self.hooks.on_compacting_start = Some(Box::new(hook));
        self
    }

    pub fn on_compacting_end(mut self, hook: impl FnMut() + 'static) -> Self {
        self.hooks.on_compacting_end = Some(Box::new(hook));
        self
    }

    /// Checks the settings for values the engine cannot work with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.arena_size < MIN_ARENA_SIZE {
            return Err(StoreError::InvalidSettings(format!(
                "arena size {} is below the minimum of {} bytes",
                self.arena_size, MIN_ARENA_SIZE
            )));
        }

        if self.arena_size > u32::MAX as usize {
            return Err(StoreError::InvalidSettings(format!(
                "arena size {} does not fit 32-bit offsets",
                self.arena_size
            )));
        }

        if self.initial_depth == 0 || self.initial_depth > self.maximal_depth {
            return Err(StoreError::InvalidSettings(format!(
                "initial depth {} must be between 1 and the maximal depth {}",
                self.initial_depth, self.maximal_depth
            )));
        }

        if self.maximal_depth > MAX_DEPTH {
            return Err(StoreError::InvalidSettings(format!(
                "maximal depth {} exceeds {}",
                self.maximal_depth, MAX_DEPTH
            )));
        }

        let fraction = self.maintenance.archive_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(StoreError::InvalidSettings(format!(
                "archive fraction {} must be in (0, 1]",
                fraction
            )));
        }

        let threshold = self.maintenance.compaction_threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(StoreError::InvalidSettings(format!(
                "compaction threshold {} must be in [0, 1)",
                threshold
            )));
        }

        Ok(())
    }
}
