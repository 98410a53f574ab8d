//! # Scan Session State Machine
//!
//! One [`ScanSession`] exists per call to `synchronize`. It carries the
//! session's immutable inputs (partition, cache flag, settings snapshot) and
//! its cancellation handle, and guards the lifecycle with validated state
//! transitions.
//!
//! ## State Machine
//!
//! ```text
//! Idle → CacheAttempt → Reconciled ─┐
//!  │          │                      ├→ Persisting → Idle
//!  └──────────┴──→ FullCrawl ────────┘
//!
//! CacheAttempt | Reconciled | FullCrawl → Canceled | Failed
//! ```
//!
//! `Persisting` cannot be canceled: a save that has started runs to
//! completion or failure.

use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use core_library::MediaKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::ScanSettings;
use crate::{Result, SyncError};

/// Unique identifier for a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    CacheAttempt,
    Reconciled,
    FullCrawl,
    Persisting,
    Canceled,
    Failed,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Canceled | ScanState::Failed)
    }

    /// States a session may be canceled from
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            ScanState::CacheAttempt | ScanState::Reconciled | ScanState::FullCrawl
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::CacheAttempt => "cache_attempt",
            ScanState::Reconciled => "reconciled",
            ScanState::FullCrawl => "full_crawl",
            ScanState::Persisting => "persisting",
            ScanState::Canceled => "canceled",
            ScanState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synchronization attempt for a partition.
#[derive(Debug)]
pub struct ScanSession {
    pub id: SessionId,
    pub kind: MediaKind,
    /// Cache requested by the caller and allowed by settings
    pub use_cache: bool,
    pub settings: ScanSettings,
    pub started_at: DateTime<Utc>,
    state: ScanState,
    cancel: CancellationToken,
}

impl ScanSession {
    pub fn new(
        kind: MediaKind,
        use_cache: bool,
        settings: ScanSettings,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            kind,
            use_cache: use_cache && settings.use_snapshot_cache,
            settings,
            started_at,
            state: ScanState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Handle that cancels this session when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return [`SyncError::Cancelled`] once cancellation has been requested
    /// and the session is in a cancelable state.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.state.is_cancelable() && self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    pub fn transition(&mut self, to: ScanState) -> Result<()> {
        self.validate_transition(to)?;
        self.state = to;
        Ok(())
    }

    fn validate_transition(&self, to: ScanState) -> Result<()> {
        use ScanState::*;

        let valid = match (self.state, to) {
            (Idle, CacheAttempt) | (Idle, FullCrawl) => true,
            (CacheAttempt, Reconciled) | (CacheAttempt, FullCrawl) => true,
            (Reconciled, Persisting) | (FullCrawl, Persisting) => true,
            (Persisting, Idle) => true,
            (from, Canceled) | (from, Failed) => from.is_cancelable(),
            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
                reason: format!("Cannot transition from {} to {}", self.state, to),
            });
        }
        Ok(())
    }
}
