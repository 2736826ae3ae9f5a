//! A minimal host router that runs the session gate before committing any
//! navigation.

use std::sync::Mutex;

use tracing::{debug, info};

use crate::api::RenewalTransport;
use crate::credentials::CredentialStore;
use crate::gate::{Decision, SessionGate};
use crate::routes::{Destination, RouteError, Routes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The navigation finished and `destination` is now current. It is the
    /// login page when the decision was a redirect.
    Committed {
        destination: Destination,
        decision: Decision,
    },
    /// A newer navigation started while this one was waiting on the gate.
    Superseded,
}

#[derive(Debug, Default)]
struct NavigationState {
    current: Option<Destination>,
    latest: u64,
}

pub struct Navigator<S, T> {
    routes: Routes,
    gate: SessionGate<S, T>,
    state: Mutex<NavigationState>,
}

impl<S, T> Navigator<S, T>
where
    S: CredentialStore + 'static,
    T: RenewalTransport,
{
    pub fn new(routes: Routes, gate: SessionGate<S, T>) -> Self {
        Self {
            routes,
            gate,
            state: Mutex::new(NavigationState::default()),
        }
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn gate(&self) -> &SessionGate<S, T> {
        &self.gate
    }

    /// The committed destination, `None` before the first navigation.
    pub fn current(&self) -> Option<Destination> {
        self.lock_state().current.clone()
    }

    /// Navigate to the destination called `name`.
    ///
    /// The gate runs once per call, including the first one. Only the most
    /// recently started navigation may commit; older ones still wait for
    /// their decision but then report `Superseded`.
    pub async fn navigate(&self, name: &str) -> Result<NavigationOutcome, RouteError> {
        let target = self.routes.resolve(name)?.clone();

        let (ticket, from) = {
            let mut state = self.lock_state();
            state.latest += 1;
            (state.latest, state.current.clone())
        };

        let decision = self.gate.check(&target, from.as_ref()).await;
        let destination = match decision {
            Decision::Allow => target,
            Decision::RedirectToLogin => self.routes.login().clone(),
        };

        let mut state = self.lock_state();
        if state.latest != ticket {
            debug!(to = %destination.name, "Discarding decision of superseded navigation");
            return Ok(NavigationOutcome::Superseded);
        }

        info!(
            from = from.as_ref().map(|d| d.name.as_str()).unwrap_or("<initial>"),
            to = %destination.name,
            ?decision,
            "Navigation committed"
        );
        state.current = Some(destination.clone());
        Ok(NavigationOutcome::Committed {
            destination,
            decision,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, NavigationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
