//! Lease records and lifecycle callbacks.

use crate::errors::ClientError;
use crate::transport::{CallDescriptor, LeaseInfo};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of a held lease.
///
/// `RenewalPending` and `Rotating` double as in-flight markers: a record in
/// either state is owned by exactly one maintenance job until it is replaced
/// or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Valid; nothing in flight.
    Active,
    /// A renewal attempt is in flight.
    RenewalPending,
    /// A rotation attempt is in flight.
    Rotating,
    /// Past expiry with no way to recover.
    Expired,
    /// Maintenance failed terminally; the record is about to be dropped.
    Errored,
}

impl LeaseState {
    /// Lowercase name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Active => "active",
            LeaseState::RenewalPending => "renewal_pending",
            LeaseState::Rotating => "rotating",
            LeaseState::Expired => "expired",
            LeaseState::Errored => "errored",
        }
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked with the replacement record after a renewal or rotation.
pub type LeaseCallback = Arc<dyn Fn(&LeaseRecord) + Send + Sync>;

/// Callback invoked with the terminal error and the now-stale record.
pub type LeaseErrorCallback = Arc<dyn Fn(&ClientError, &LeaseRecord) + Send + Sync>;

/// Optional lifecycle callbacks supplied at read time.
///
/// Callbacks run on the callback dispatcher's execution context, never on
/// the maintenance scheduler loop; a slow callback cannot delay renewals.
#[derive(Clone, Default)]
pub struct LeaseCallbacks {
    /// Fired after a successful renewal, with the replacement record.
    pub on_renew: Option<LeaseCallback>,

    /// Fired after a successful rotation, with the replacement record.
    pub on_rotate: Option<LeaseCallback>,

    /// Fired when maintenance fails terminally, with the error and the
    /// stale record that was removed from the cache.
    pub on_error: Option<LeaseErrorCallback>,
}

impl LeaseCallbacks {
    /// No callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the on-renew callback.
    pub fn with_renew(mut self, f: impl Fn(&LeaseRecord) + Send + Sync + 'static) -> Self {
        self.on_renew = Some(Arc::new(f));
        self
    }

    /// Set the on-rotate callback.
    pub fn with_rotate(mut self, f: impl Fn(&LeaseRecord) + Send + Sync + 'static) -> Self {
        self.on_rotate = Some(Arc::new(f));
        self
    }

    /// Set the on-error callback.
    pub fn with_error(
        mut self,
        f: impl Fn(&ClientError, &LeaseRecord) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for LeaseCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseCallbacks")
            .field("on_renew", &self.on_renew.is_some())
            .field("on_rotate", &self.on_rotate.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// One unit of time-bound material currently held by the client.
///
/// Records are immutable snapshots from the cache's point of view: renewal
/// and rotation replace the whole record, they never patch one in place.
/// `expires_at` always comes from a fresh server response; the client never
/// extrapolates a duration across renewals.
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    /// Stable identifier: the server's lease id, or `mount/path` for
    /// leaseless secrets held under a pseudo-TTL.
    pub key: String,

    /// Opaque payload owned by this record; replaced wholesale on renewal
    /// or rotation.
    pub value: serde_json::Value,

    /// Wall-clock timestamp the current grant was issued.
    pub issued_at: DateTime<Utc>,

    /// Validity duration granted by the server.
    pub duration: Duration,

    /// Monotonic deadline (`issued_at + duration` in monotonic terms).
    pub expires_at: Instant,

    /// Whether the server will extend this lease on request. Non-renewable
    /// leases are rotated instead.
    pub renewable: bool,

    /// How far ahead of `expires_at` maintenance should begin.
    pub renewal_window: Duration,

    /// Random offset within the configured maximum that staggers this
    /// lease's effective renewal time.
    pub jitter: Duration,

    /// Lifecycle state.
    pub state: LeaseState,

    /// Call replayed to renew (lease renew endpoint, or token renew-self).
    /// Absent for leases that can only rotate.
    pub renew_with: Option<CallDescriptor>,

    /// Call replayed to rotate: the original read that produced this lease.
    pub rotate_with: Option<CallDescriptor>,

    /// User lifecycle callbacks.
    pub callbacks: LeaseCallbacks,
}

impl LeaseRecord {
    /// Create an active record issued now.
    pub fn new(
        key: impl Into<String>,
        value: serde_json::Value,
        duration: Duration,
        renewable: bool,
        renewal_window: Duration,
        jitter_cap: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            issued_at: Utc::now(),
            duration,
            expires_at: Instant::now() + duration,
            renewable,
            renewal_window,
            jitter: sample_jitter(jitter_cap),
            state: LeaseState::Active,
            renew_with: None,
            rotate_with: None,
            callbacks: LeaseCallbacks::default(),
        }
    }

    /// Attach lifecycle callbacks.
    pub fn with_callbacks(mut self, callbacks: LeaseCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Set the renewal descriptor.
    pub fn with_renew_descriptor(mut self, descriptor: CallDescriptor) -> Self {
        self.renew_with = Some(descriptor);
        self
    }

    /// Set the rotation descriptor.
    pub fn with_rotate_descriptor(mut self, descriptor: CallDescriptor) -> Self {
        self.rotate_with = Some(descriptor);
        self
    }

    /// Whether this record has entered its (jittered) renewal window.
    ///
    /// Only `Active` records are ever due; in-flight and terminal states are
    /// someone else's responsibility.
    pub fn is_due(&self, now: Instant) -> bool {
        self.state == LeaseState::Active && now + self.renewal_window >= self.expires_at + self.jitter
    }

    /// Whether the grant has expired outright.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Whether nothing can keep this lease alive: not renewable and no
    /// rotation source.
    pub fn is_unrecoverable(&self) -> bool {
        !self.renewable && self.rotate_with.is_none()
    }

    /// Build the replacement record after a successful renewal.
    ///
    /// The payload, key, descriptors and callbacks carry over; expiry is
    /// recomputed from the fresh grant and the jitter is resampled.
    pub fn renewed(&self, info: &LeaseInfo, jitter_cap: Duration) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            issued_at: Utc::now(),
            duration: info.duration,
            expires_at: Instant::now() + info.duration,
            renewable: info.renewable,
            renewal_window: self.renewal_window,
            jitter: sample_jitter(jitter_cap),
            state: LeaseState::Active,
            renew_with: self.renew_with.clone(),
            rotate_with: self.rotate_with.clone(),
            callbacks: self.callbacks.clone(),
        }
    }

    /// A copy of this record tagged with the given state, for handing to
    /// callbacks after the cache entry is gone.
    pub fn with_state(&self, state: LeaseState) -> Self {
        let mut copy = self.clone();
        copy.state = state;
        copy
    }

    /// Remaining validity from `now`, zero if expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

fn sample_jitter(cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as u64;
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms))
}
