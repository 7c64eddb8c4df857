//! Interceptor state pooling.
//!
//! Every intercepted request needs an [`InterceptorState`]. The pool keeps
//! idle states around so the hot path does not allocate. A state is owned by
//! exactly one request between [`InterceptorPool::acquire`] and the drop of the
//! returned [`PooledInterceptor`]; it is reset on the way out and on the way
//! back in, so nothing leaks from one request to the next.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::interceptor::InterceptorState;
use crate::resolve::StatusPolicy;

/// Pool of reusable interceptor states.
pub struct InterceptorPool {
    idle: Mutex<Vec<InterceptorState>>,
    max_idle: usize,
    policy: StatusPolicy,
    copy_buffer_size: usize,
    /// Total states created
    total_created: AtomicU64,
    /// Total states served from the idle list
    total_reused: AtomicU64,
}

impl InterceptorPool {
    /// Create a pool retaining at most `max_idle` states.
    pub fn new(max_idle: usize, policy: StatusPolicy, copy_buffer_size: usize) -> Self {
        debug!(
            max_idle = max_idle,
            copy_buffer_size = copy_buffer_size,
            default_deny = policy.default_deny().as_u16(),
            "Interceptor pool initialized"
        );

        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle.min(64))),
            max_idle,
            policy,
            copy_buffer_size,
            total_created: AtomicU64::new(0),
            total_reused: AtomicU64::new(0),
        }
    }

    /// Take a state out of the pool, reset for a request speaking `protocol`.
    pub fn acquire(&self, protocol: &str) -> PooledInterceptor<'_> {
        let pooled = self.idle.lock().pop();
        let mut state = match pooled {
            Some(state) => {
                self.total_reused.fetch_add(1, Ordering::Relaxed);
                state
            }
            None => {
                self.total_created.fetch_add(1, Ordering::Relaxed);
                InterceptorState::new()
            }
        };

        state.reset(protocol, self.policy, self.copy_buffer_size);
        trace!(protocol = protocol, "Acquired interceptor state");

        PooledInterceptor {
            state: Some(state),
            pool: self,
        }
    }

    fn release(&self, mut state: InterceptorState) {
        state.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(state);
        }
    }

    /// Number of idle states.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Get total states created.
    pub fn total_created(&self) -> u64 {
        self.total_created.load(Ordering::Relaxed)
    }

    /// Get total states reused.
    pub fn total_reused(&self) -> u64 {
        self.total_reused.load(Ordering::Relaxed)
    }
}

/// An interceptor state on loan from an [`InterceptorPool`].
///
/// Returns to the pool on drop.
pub struct PooledInterceptor<'p> {
    state: Option<InterceptorState>,
    pool: &'p InterceptorPool,
}

impl Deref for PooledInterceptor<'_> {
    type Target = InterceptorState;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the state out.
        self.state.as_ref().unwrap_or_else(|| unreachable!("interceptor state already released"))
    }
}

impl DerefMut for PooledInterceptor<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state.as_mut().unwrap_or_else(|| unreachable!("interceptor state already released"))
    }
}

impl Drop for PooledInterceptor<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.pool.release(state);
        }
    }
}
