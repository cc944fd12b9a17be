//! At-most-once execution per computation key.
//!
//! A second request for a key that is already running is rejected with
//! `ComputationInProgress`. The key is released when the guard drops,
//! including on error paths.

use crate::{
    error::{GameError, GameResult},
    types::{MonthKey, QuarterId},
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputationKey {
    RmAllocation(QuarterId),
    CustomerAllocation(MonthKey),
    Financials(MonthKey),
}

impl std::fmt::Display for ComputationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RmAllocation(q)       => write!(f, "rm_allocation/Q{q}"),
            Self::CustomerAllocation(k) => write!(f, "customer_allocation/{k}"),
            Self::Financials(k)         => write!(f, "financials/{k}"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InFlight {
    running: Arc<Mutex<HashSet<ComputationKey>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: ComputationKey) -> GameResult<InFlightGuard> {
        let mut running = self.running.lock();
        if !running.insert(key) {
            log::warn!("rejected duplicate request for {key}");
            return Err(GameError::ComputationInProgress { key: key.to_string() });
        }
        Ok(InFlightGuard { key, running: Arc::clone(&self.running) })
    }

    pub fn is_running(&self, key: ComputationKey) -> bool {
        self.running.lock().contains(&key)
    }
}

pub struct InFlightGuard {
    key:     ComputationKey,
    running: Arc<Mutex<HashSet<ComputationKey>>>,
}

impl InFlightGuard {
    pub fn key(&self) -> ComputationKey {
        self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.key);
    }
}
