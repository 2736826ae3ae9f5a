//! The session gate: decides, before every navigation, whether the user may
//! proceed to the requested destination.
//!
//! Resolution order for a protected destination:
//!
//! 1. No refresh token stored: unauthenticated, no network.
//! 2. Access token stored and unexpired: authenticated, no network.
//! 3. Otherwise exchange the refresh token for a new access token.
//!
//! Step 3 is single-flight. Every caller that needs a renewal for the same
//! refresh token while one is running waits on that renewal instead of
//! starting its own. The renewal itself runs as a spawned task, so a caller
//! that gives up waiting does not cancel it, and the new access token is in
//! the store before any waiter is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::api::{RenewalError, RenewalTransport, REQUEST_TIMEOUT_SECS};
use crate::credentials::{CredentialName, CredentialStore};
use crate::routes::Destination;

/// Buffer size for the notice broadcast channel.
/// Notices are rare; a slow subscriber only loses the oldest ones.
const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// What the router should do with a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    RedirectToLogin,
}

/// Resolved authentication status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Unauthenticated { reason: RenewalError },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

/// A user-visible failure notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Notice {
    pub status: Option<u16>,
    pub message: String,
}

impl Notice {
    /// The notice shown for a failed renewal, if the failure is one the
    /// user is told about.
    pub fn for_error(err: &RenewalError) -> Option<Self> {
        if let Some(status) = err.status() {
            Some(Self {
                status: Some(status),
                message: format!("Your session could not be renewed (status {})", status),
            })
        } else if err.is_transport() {
            Some(Self {
                status: None,
                message: "Could not reach the server to renew your session".to_string(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Upper bound on a single renewal round trip.
    pub renewal_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            renewal_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

type RenewalOutcome = Result<(), RenewalError>;
type SharedRenewal = Shared<BoxFuture<'static, RenewalOutcome>>;

struct InFlight {
    id: u64,
    outcome: SharedRenewal,
}

struct Inner<S, T> {
    store: S,
    transport: T,
    config: GateConfig,
    notices: broadcast::Sender<Notice>,
    /// Running renewals keyed by the refresh token they were started with.
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_flight_id: AtomicU64,
}

/// Navigation interceptor. Clone is cheap; clones share the same store,
/// transport and in-flight renewals.
pub struct SessionGate<S, T> {
    inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for SessionGate<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, T> SessionGate<S, T>
where
    S: CredentialStore + 'static,
    T: RenewalTransport,
{
    pub fn new(store: S, transport: T, config: GateConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                config,
                notices,
                in_flight: Mutex::new(HashMap::new()),
                next_flight_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to user-visible failure notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Decide a single navigation attempt. `from` is `None` on initial load;
    /// it is logged but does not affect the decision.
    pub async fn check(&self, target: &Destination, from: Option<&Destination>) -> Decision {
        let from_name = from.map(|d| d.name.as_str()).unwrap_or("<initial>");

        if !target.is_protected() {
            debug!(to = %target.name, from = from_name, "Destination is public");
            return Decision::Allow;
        }

        match self.resolve().await {
            AuthState::Authenticated => {
                debug!(to = %target.name, from = from_name, "Navigation allowed");
                Decision::Allow
            }
            AuthState::Unauthenticated { reason } => {
                info!(to = %target.name, from = from_name, reason = %reason, "Navigation redirected to login");
                Decision::RedirectToLogin
            }
        }
    }

    /// Resolve the current authentication status, renewing if needed.
    /// Never fails: every error ends up as `Unauthenticated`.
    pub async fn resolve(&self) -> AuthState {
        let Some(refresh_token) = self.inner.store.get(CredentialName::RefreshToken) else {
            debug!("No refresh token stored");
            return AuthState::Unauthenticated {
                reason: RenewalError::NoCredential,
            };
        };

        if self.inner.store.get(CredentialName::AccessToken).is_some() {
            debug!("Access token present");
            return AuthState::Authenticated;
        }

        let Some(renewal) = self.join_or_start(refresh_token) else {
            return AuthState::Authenticated;
        };

        match renewal.await {
            Ok(()) => AuthState::Authenticated,
            Err(reason) => AuthState::Unauthenticated { reason },
        }
    }

    /// Number of renewals currently running.
    pub fn renewals_in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Join the running renewal for `refresh_token`, or start one. Returns
    /// `None` if a renewal completed between the caller's store read and
    /// taking the lock, in which case the session is already warm.
    fn join_or_start(&self, refresh_token: String) -> Option<SharedRenewal> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(flight) = in_flight.get(&refresh_token) {
            debug!(flight = flight.id, "Joining in-flight renewal");
            return Some(flight.outcome.clone());
        }

        if self.inner.store.get(CredentialName::AccessToken).is_some() {
            debug!("Access token written by a renewal that just finished");
            return None;
        }

        let id = self.inner.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let key = refresh_token.clone();
        let handle = tokio::spawn(async move { inner.renew(id, key).await });

        let outcome = async move {
            handle.await.unwrap_or_else(|e| {
                error!(error = %e, "Renewal task failed");
                Err(RenewalError::Unreachable(format!("renewal task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        in_flight.insert(
            refresh_token,
            InFlight {
                id,
                outcome: outcome.clone(),
            },
        );
        Some(outcome)
    }
}

impl<S, T> Inner<S, T>
where
    S: CredentialStore,
    T: RenewalTransport,
{
    /// Body of the spawned renewal task. Writes the new access token (or
    /// publishes a notice); the single-flight slot is freed on return.
    async fn renew(&self, id: u64, refresh_token: String) -> RenewalOutcome {
        // Frees the slot on every exit, panics included
        let _slot = FlightSlot {
            inner: self,
            id,
            refresh_token: &refresh_token,
        };
        info!(flight = id, "Renewing session");

        let result = match tokio::time::timeout(
            self.config.renewal_timeout,
            self.transport.renew(&refresh_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RenewalError::TimedOut(self.config.renewal_timeout)),
        };

        let result = result.and_then(|grant| match grant.ttl() {
            Some(ttl) => Ok((grant, ttl)),
            None => Err(RenewalError::MalformedResponse(format!(
                "expires_in out of range: {}",
                grant.expires_in
            ))),
        });

        match result {
            Ok((grant, ttl)) => {
                match self
                    .store
                    .set(CredentialName::AccessToken, &grant.access_token, ttl)
                {
                    Ok(()) => info!(flight = id, expires_in = grant.expires_in, "Session renewed"),
                    // Waiters still proceed; the next navigation renews again
                    Err(e) => warn!(flight = id, error = %e, "Failed to store renewed access token"),
                }
                Ok(())
            }
            Err(e) => {
                if let Some(status) = e.status() {
                    warn!(flight = id, status, "Renewal rejected");
                } else if e.is_transport() {
                    warn!(flight = id, error = %e, "Renewal endpoint unreachable");
                } else if let RenewalError::MalformedResponse(cause) = &e {
                    error!(flight = id, cause = %cause, "Malformed renewal response");
                }
                if let Some(notice) = Notice::for_error(&e) {
                    // No subscribers is fine
                    let _ = self.notices.send(notice);
                }
                Err(e)
            }
        }
    }
}

impl<S, T> Inner<S, T> {
    fn finish(&self, id: u64, refresh_token: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.get(refresh_token).is_some_and(|f| f.id == id) {
            in_flight.remove(refresh_token);
        }
    }
}

/// Releases a renewal's single-flight slot when dropped.
struct FlightSlot<'a, S, T> {
    inner: &'a Inner<S, T>,
    id: u64,
    refresh_token: &'a str,
}

impl<S, T> Drop for FlightSlot<'_, S, T> {
    fn drop(&mut self) {
        self.inner.finish(self.id, self.refresh_token);
    }
}
