//! Destination registry supplied by the view layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the destination unauthenticated navigations are sent to.
pub const LOGIN: &str = "login";

/// Name of the sign-up destination.
pub const REGISTER: &str = "register";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Unknown destination: {0}")]
    UnknownDestination(String),

    #[error("Destination registered twice: {0}")]
    DuplicateDestination(String),

    #[error("Route table has no '{LOGIN}' destination")]
    MissingLogin,
}

/// A named, navigable target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Destination {
    pub name: String,
    #[serde(default)]
    pub requires_auth: bool,
}

impl Destination {
    pub fn new(name: &str, requires_auth: bool) -> Self {
        Self {
            name: name.to_string(),
            requires_auth,
        }
    }

    pub fn public(name: &str) -> Self {
        Self::new(name, false)
    }

    pub fn protected(name: &str) -> Self {
        Self::new(name, true)
    }

    /// `login` and `register` are never gated, whatever their flag says.
    pub fn is_reserved(&self) -> bool {
        self.name == LOGIN || self.name == REGISTER
    }

    /// Whether a navigation here must pass the session gate.
    pub fn is_protected(&self) -> bool {
        self.requires_auth && !self.is_reserved()
    }
}

/// Ordered, immutable route table.
#[derive(Debug, Clone)]
pub struct Routes {
    destinations: Vec<Destination>,
    /// Index of the `login` destination.
    login: usize,
}

impl Routes {
    pub fn new(destinations: Vec<Destination>) -> Result<Self, RouteError> {
        for (i, destination) in destinations.iter().enumerate() {
            if destinations[..i].iter().any(|d| d.name == destination.name) {
                return Err(RouteError::DuplicateDestination(destination.name.clone()));
            }
        }
        let login = destinations
            .iter()
            .position(|d| d.name == LOGIN)
            .ok_or(RouteError::MissingLogin)?;
        Ok(Self {
            destinations,
            login,
        })
    }

    /// The Disco web app's table: a protected home feed plus the two
    /// account pages.
    pub fn default_destinations() -> Vec<Destination> {
        vec![
            Destination::protected("home"),
            Destination::public(LOGIN),
            Destination::public(REGISTER),
        ]
    }

    pub fn get(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.name == name)
    }

    pub fn resolve(&self, name: &str) -> Result<&Destination, RouteError> {
        self.get(name)
            .ok_or_else(|| RouteError::UnknownDestination(name.to_string()))
    }

    pub fn login(&self) -> &Destination {
        &self.destinations[self.login]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.iter()
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            destinations: Self::default_destinations(),
            // Position of `login` in `default_destinations`
            login: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names_are_never_protected() {
        assert!(!Destination::protected(LOGIN).is_protected());
        assert!(!Destination::protected(REGISTER).is_protected());
        assert!(Destination::protected("home").is_protected());
        assert!(!Destination::public("about").is_protected());
    }

    #[test]
    fn test_default_routes() {
        let routes = Routes::default();
        assert_eq!(
            routes.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["home", "login", "register"]
        );
        assert!(routes.get("home").unwrap().requires_auth);
        assert_eq!(routes.login().name, LOGIN);
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let err = Routes::new(vec![
            Destination::public(LOGIN),
            Destination::protected("home"),
            Destination::public("home"),
        ])
        .unwrap_err();
        assert_eq!(err, RouteError::DuplicateDestination("home".to_string()));
    }

    #[test]
    fn test_new_requires_login() {
        let err = Routes::new(vec![Destination::protected("home")]).unwrap_err();
        assert_eq!(err, RouteError::MissingLogin);
    }

    #[test]
    fn test_login_found_anywhere_in_table() {
        let routes = Routes::new(vec![
            Destination::protected("feed"),
            Destination::public("about"),
            Destination::public(LOGIN),
        ])
        .unwrap();
        assert_eq!(routes.login().name, LOGIN);

        let default = Routes::default();
        assert_eq!(default.login(), default.get(LOGIN).unwrap());
    }

    #[test]
    fn test_resolve_unknown() {
        let routes = Routes::default();
        assert_eq!(
            routes.resolve("settings").unwrap_err(),
            RouteError::UnknownDestination("settings".to_string())
        );
    }

    #[test]
    fn test_destination_deserializes_with_default_flag() {
        let d: Destination = serde_json::from_str(r#"{"name":"about"}"#).unwrap();
        assert_eq!(d, Destination::public("about"));
    }
}
