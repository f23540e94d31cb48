//! Shared wave supply pool
//!
//! Single budget shared by every scheduler. Waves spend from it before
//! spawning; formations and retreats refund it when funded units drop out.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveSupply {
    remaining: i32,
}

impl WaveSupply {
    pub fn new(remaining: i32) -> Self {
        Self { remaining }
    }

    pub fn remaining(&self) -> i32 {
        self.remaining
    }

    pub fn set(&mut self, value: i32) {
        self.remaining = value;
    }

    pub fn add(&mut self, delta: i32) {
        self.remaining += delta;
    }

    /// Spends one unit of supply. Returns false, leaving the pool untouched,
    /// when nothing is left.
    pub fn try_spend(&mut self) -> bool {
        if self.remaining <= 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Returns supply paid for a unit that never made it into play or died
    /// after its wave completed.
    pub fn refund(&mut self, count: i32) {
        if count > 0 {
            self.remaining += count;
        }
    }
}
