//! Two named pools of upstream API credentials with round-robin selection.
//!
//! Pool A is active at startup. A quota rejection makes the orchestrator flip
//! to the other pool for its single retry; there is no automatic reversion,
//! so the flipped pool stays active for subsequent requests until it is
//! flipped again or the process ends.

use std::fmt::{Display, Formatter};
use std::sync::Mutex;

use serde::Serialize;

use crate::ValidationError;

/// Identity of a credential pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolId {
    A,
    B,
}

impl PoolId {
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty list of credentials. Immutable after construction.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    id: PoolId,
    keys: Vec<String>,
}

impl CredentialPool {
    pub fn new(id: PoolId, keys: Vec<String>) -> Result<Self, ValidationError> {
        if keys.is_empty() {
            return Err(ValidationError::EmptyCredentialPool { pool: id.as_str() });
        }
        Ok(Self { id, keys })
    }

    pub const fn id(&self) -> PoolId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Round-robin indexing, wrapping modulo pool size.
    pub fn key_at(&self, cursor: usize) -> &str {
        &self.keys[cursor % self.keys.len()]
    }
}

/// Snapshot of pool state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub active_pool: PoolId,
    pub pool_a_size: usize,
    pub pool_b_size: usize,
    pub switch_count: u64,
}

#[derive(Debug)]
struct RingState {
    active: PoolId,
    switch_count: u64,
}

/// Process-wide credential selector over the two pools.
///
/// Selection is a pure function of `(active pool, cursor)`; the only mutation
/// is `switch_pool`, funneled through the orchestrator's retry branch.
#[derive(Debug)]
pub struct KeyRing {
    pool_a: CredentialPool,
    pool_b: CredentialPool,
    state: Mutex<RingState>,
}

impl KeyRing {
    pub fn new(pool_a: CredentialPool, pool_b: CredentialPool) -> Self {
        Self {
            pool_a,
            pool_b,
            state: Mutex::new(RingState {
                active: PoolId::A,
                switch_count: 0,
            }),
        }
    }

    pub fn active_pool(&self) -> PoolId {
        self.state.lock().expect("key ring lock is not poisoned").active
    }

    /// Credential at `cursor` in the currently active pool.
    pub fn credential_at(&self, cursor: usize) -> String {
        let active = self.active_pool();
        let pool = match active {
            PoolId::A => &self.pool_a,
            PoolId::B => &self.pool_b,
        };
        pool.key_at(cursor).to_owned()
    }

    /// Flip the active pool and count the switch. Returns the new active pool.
    pub fn switch_pool(&self) -> PoolId {
        let mut state = self.state.lock().expect("key ring lock is not poisoned");
        state.active = state.active.other();
        state.switch_count += 1;
        state.active
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock().expect("key ring lock is not poisoned");
        PoolStatus {
            active_pool: state.active,
            pool_a_size: self.pool_a.len(),
            pool_b_size: self.pool_b.len(),
            switch_count: state.switch_count,
        }
    }
}
