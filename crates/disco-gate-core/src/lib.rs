//! Client-side session gate for the Disco web app.
//!
//! Before every navigation the host router asks the [`SessionGate`] for a
//! [`Decision`]. Protected destinations are allowed when an access token is
//! stored; when only a refresh token is stored the gate renews the session
//! against the backend first, sharing a single renewal between all
//! navigations that need it.

pub mod api;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod gate;
pub mod navigator;
pub mod routes;

pub use api::{ApiClient, RenewalError, RenewalGrant, RenewalTransport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, CredentialBackend};
pub use credentials::{CredentialName, CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError};
pub use gate::{AuthState, Decision, GateConfig, Notice, SessionGate};
pub use navigator::{NavigationOutcome, Navigator};
pub use routes::{Destination, RouteError, Routes};
