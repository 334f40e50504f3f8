use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use soma_common::array::ResultOrder;

use crate::config::Config;
use crate::vfs::Vfs;
use crate::Result as SomaResult;

/// Implemented by handles which were opened through a [Context].
pub trait ContextBound {
    fn context(&self) -> &Context;
}

/// Shared settings for array operations.
///
/// Cloning a `Context` is cheap; clones share one [Config].
#[derive(Clone, Debug, Default)]
pub struct Context {
    config: Arc<Config>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &Config) -> Self {
        Context {
            config: Arc::new(cfg.clone()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vfs(&self) -> Vfs<'_> {
        Vfs::new(self)
    }

    pub fn sort_coords(&self) -> SomaResult<bool> {
        self.config.sort_coords()
    }

    pub fn consolidate_and_vacuum(&self) -> SomaResult<bool> {
        self.config.consolidate_and_vacuum()
    }

    pub fn read_batch_size(&self) -> SomaResult<usize> {
        self.config.read_batch_size()
    }

    /// Resolves `ResultOrder::Auto` against the configured order, and
    /// then against row-major.
    pub fn result_order(&self, order: ResultOrder) -> SomaResult<ResultOrder> {
        Ok(order
            .or(self.config.result_order()?)
            .or(ResultOrder::RowMajor))
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
