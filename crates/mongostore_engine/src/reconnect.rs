//! Reconnect state machine.
//!
//! ```text
//!  Connected ──connectivity error──▶ Reconnecting(min)
//!                                      │ wait w, reopen
//!                        ┌── ok ───────┤
//!                        ▼             │ fails, 2w <= max
//!                    Connected         ▼
//!                                 Reconnecting(2w) ── fails, 2w > max ──▶ Failed
//! ```
//!
//! Authentication and configuration errors during a reopen end the chain in
//! `Failed` immediately.

use crate::config::{DEFAULT_MAX_WAIT_MS, DEFAULT_MIN_WAIT_MS};
use crate::connection::ConnectionManager;
use crate::error::{StoreError, StoreResult};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// First wait of a chain.
    pub min_wait: Duration,
    /// Ceiling; a chain fails once the next wait would exceed it.
    pub max_wait: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy.
    pub fn new(min_wait: Duration, max_wait: Duration) -> Self {
        Self { min_wait, max_wait }
    }

    /// Creates a policy from millisecond bounds.
    pub fn from_millis(min_wait: u64, max_wait: u64) -> Self {
        Self::new(Duration::from_millis(min_wait), Duration::from_millis(max_wait))
    }

    /// The wait after a failed attempt that waited `current`, or `None` to give up.
    pub fn next_wait(&self, current: Duration) -> Option<Duration> {
        let next = current.saturating_mul(2);
        (next <= self.max_wait).then_some(next)
    }

    /// Every wait a chain makes when all attempts fail.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut waits = vec![self.min_wait];
        while let Some(next) = waits.last().and_then(|w| self.next_wait(*w)) {
            if next.is_zero() {
                break;
            }
            waits.push(next);
        }
        waits
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_millis(DEFAULT_MIN_WAIT_MS, DEFAULT_MAX_WAIT_MS)
    }
}

/// Phase of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    /// The connection is believed healthy.
    Connected,
    /// A chain is waiting the given time before its next reopen.
    Reconnecting(Duration),
    /// The last chain gave up.
    Failed,
}

/// Observable reconnect state.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    /// Wait of the current or most recent attempt.
    pub current_wait: Duration,
    /// Wait the next chain starts with.
    pub min_wait: Duration,
    /// Wait ceiling.
    pub max_wait: Duration,
    /// Whether a chain is running.
    pub attempt_in_flight: bool,
    /// Current phase.
    pub phase: ReconnectPhase,
    /// Number of chains started.
    pub chains: u64,
    /// Waits of the current or most recent chain, in order.
    pub waits: Vec<Duration>,
    /// Outcome of the most recent chain.
    pub outcome: Option<Result<(), StoreError>>,
}

impl ReconnectState {
    fn new(policy: ReconnectPolicy) -> Self {
        Self {
            current_wait: policy.min_wait,
            min_wait: policy.min_wait,
            max_wait: policy.max_wait,
            attempt_in_flight: false,
            phase: ReconnectPhase::Connected,
            chains: 0,
            waits: Vec::new(),
            outcome: None,
        }
    }
}

/// Runs reconnect chains for one store.
///
/// At most one chain runs at a time. A caller that asks to recover while a
/// chain is in flight joins it and receives its outcome.
pub struct Reconnector {
    policy: ReconnectPolicy,
    state: watch::Sender<ReconnectState>,
}

impl Reconnector {
    /// Creates a reconnector in the `Connected` phase.
    pub fn new(policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ReconnectState::new(policy));
        Self { policy, state }
    }

    /// The backoff bounds.
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Snapshot of the state.
    pub fn state(&self) -> ReconnectState {
        self.state.borrow().clone()
    }

    /// Current phase.
    pub fn phase(&self) -> ReconnectPhase {
        self.state.borrow().phase
    }

    /// Watches state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReconnectState> {
        self.state.subscribe()
    }

    /// Records a successful open: wait back to minimum, phase `Connected`.
    pub fn mark_connected(&self) {
        let min = self.policy.min_wait;
        self.state.send_modify(|s| {
            s.current_wait = min;
            if !s.attempt_in_flight {
                s.phase = ReconnectPhase::Connected;
            }
        });
    }

    /// Reconnects `manager`, or joins the chain already doing so.
    ///
    /// Returns `Ok(())` once a new connection is live, or the terminal
    /// failure of the chain.
    ///
    /// A closed manager is never reopened. If the leading caller is dropped
    /// mid-chain, the chain ends in `Failed` and joiners see a connectivity
    /// error.
    pub async fn recover(&self, manager: &ConnectionManager) -> StoreResult<()> {
        if manager.is_closed() {
            return Err(StoreError::NotConnected);
        }
        let min = self.policy.min_wait;
        let mut receiver = self.state.subscribe();
        let mut leader = false;
        let mut chain = 0;

        self.state.send_if_modified(|s| {
            if s.attempt_in_flight {
                chain = s.chains;
                return false;
            }
            s.attempt_in_flight = true;
            s.chains += 1;
            s.current_wait = min;
            s.phase = ReconnectPhase::Reconnecting(min);
            s.waits.clear();
            s.outcome = None;
            chain = s.chains;
            leader = true;
            true
        });

        if !leader {
            debug!("joining reconnect chain {}", chain);
            let state = receiver
                .wait_for(|s| !s.attempt_in_flight && s.chains >= chain)
                .await
                .map_err(|_| StoreError::connectivity("reconnect state dropped"))?;
            return state
                .outcome
                .clone()
                .unwrap_or_else(|| Err(StoreError::connectivity("reconnect outcome unknown")));
        }

        let guard = ChainGuard {
            state: &self.state,
            min_wait: min,
            done: false,
        };
        let outcome = self.run_chain(manager).await;
        guard.finish(outcome.clone());
        outcome
    }

    async fn run_chain(&self, manager: &ConnectionManager) -> StoreResult<()> {
        let mut wait = self.policy.min_wait;
        let mut attempts = 0u32;

        loop {
            self.state.send_modify(|s| {
                s.current_wait = wait;
                s.phase = ReconnectPhase::Reconnecting(wait);
                s.waits.push(wait);
            });
            debug!("attempting db reconnect in {:?}", wait);
            tokio::time::sleep(wait).await;
            attempts += 1;

            if manager.is_closed() {
                debug!("store closed; reconnect abandoned");
                return Err(StoreError::NotConnected);
            }

            let err = match manager.reopen().await {
                Ok(live) => {
                    info!(
                        "reconnect ok after {} attempt(s), generation {}",
                        attempts,
                        live.generation()
                    );
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.class().is_fatal() {
                error!("reconnect aborted: {}", err);
                return Err(StoreError::ReconnectFailed {
                    attempts,
                    last: Box::new(err),
                });
            }

            match self.policy.next_wait(wait) {
                Some(next) => {
                    warn!("db reconnect (wait {:?}) failed: {}", wait, err);
                    wait = next;
                }
                None => {
                    error!("giving up reconnect after {} attempt(s): {}", attempts, err);
                    return Err(StoreError::ReconnectFailed {
                        attempts,
                        last: Box::new(err),
                    });
                }
            }
        }
    }
}

/// Settles the leader's chain, also when the leader is dropped before it ends.
struct ChainGuard<'a> {
    state: &'a watch::Sender<ReconnectState>,
    min_wait: Duration,
    done: bool,
}

impl ChainGuard<'_> {
    fn finish(mut self, outcome: StoreResult<()>) {
        self.settle(outcome);
        self.done = true;
    }

    fn settle(&self, outcome: StoreResult<()>) {
        let min = self.min_wait;
        self.state.send_modify(|s| {
            s.attempt_in_flight = false;
            match &outcome {
                Ok(()) => {
                    s.phase = ReconnectPhase::Connected;
                    s.current_wait = min;
                }
                Err(_) => s.phase = ReconnectPhase::Failed,
            }
            s.outcome = Some(outcome);
        });
    }
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            warn!("reconnect chain cancelled");
            self.settle(Err(StoreError::connectivity("reconnect cancelled")));
        }
    }
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
