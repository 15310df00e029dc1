//! Client-side routes and the two guards that gate them.
//!
//! Both guards are pure functions of `(loading, has_session)`. No role or
//! permission checks happen here: any authenticated identity sees every page.

use serde::{Deserialize, Serialize};

use crate::types::SessionState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Dashboard,
    Users,
    Devices,
    Policies,
    Activity,
    Alerts,
    Auth,
    NotFound,
}

impl Route {
    pub const ALL: [Route; 7] = [
        Route::Dashboard,
        Route::Users,
        Route::Devices,
        Route::Policies,
        Route::Activity,
        Route::Alerts,
        Route::Auth,
    ];

    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Route::Dashboard,
            "/users" => Route::Users,
            "/devices" => Route::Devices,
            "/policies" => Route::Policies,
            "/activity" => Route::Activity,
            "/alerts" => Route::Alerts,
            "/auth" => Route::Auth,
            _ => Route::NotFound,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Dashboard => "/",
            Route::Users => "/users",
            Route::Devices => "/devices",
            Route::Policies => "/policies",
            Route::Activity => "/activity",
            Route::Alerts => "/alerts",
            Route::Auth => "/auth",
            Route::NotFound => "*",
        }
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Auth | Route::NotFound)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "outcome", content = "to", rename_all = "snake_case")]
pub enum GuardOutcome {
    Placeholder,
    Redirect(Route),
    Render,
}

pub fn protected_guard(loading: bool, has_session: bool) -> GuardOutcome {
    if loading {
        GuardOutcome::Placeholder
    } else if !has_session {
        GuardOutcome::Redirect(Route::Auth)
    } else {
        GuardOutcome::Render
    }
}

pub fn login_guard(loading: bool, has_session: bool) -> GuardOutcome {
    if loading {
        GuardOutcome::Placeholder
    } else if has_session {
        GuardOutcome::Redirect(Route::Dashboard)
    } else {
        GuardOutcome::Render
    }
}

/// Applies whichever guard owns `route` to the current session state.
pub fn resolve(route: Route, state: &SessionState) -> GuardOutcome {
    let loading = state.is_loading();
    let has_session = state.session().is_some();
    if route.is_protected() {
        protected_guard(loading, has_session)
    } else if route == Route::Auth {
        login_guard(loading, has_session)
    } else {
        GuardOutcome::Render
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Identity, Session};
    use chrono::{Duration, Utc};

    fn authenticated() -> SessionState {
        SessionState::Authenticated(Session {
            user: Identity { id: "U1".into(), email: Some("u1@example.com".into()) },
            access_token: "token".into(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    #[test]
    fn loading_shows_placeholder_regardless_of_session() {
        for has_session in [false, true] {
            assert_eq!(protected_guard(true, has_session), GuardOutcome::Placeholder);
            assert_eq!(login_guard(true, has_session), GuardOutcome::Placeholder);
        }
    }

    #[test]
    fn anonymous_is_sent_to_auth_and_sees_login_form() {
        assert_eq!(protected_guard(false, false), GuardOutcome::Redirect(Route::Auth));
        assert_eq!(login_guard(false, false), GuardOutcome::Render);
    }

    #[test]
    fn authenticated_sees_pages_and_leaves_login() {
        assert_eq!(protected_guard(false, true), GuardOutcome::Render);
        assert_eq!(login_guard(false, true), GuardOutcome::Redirect(Route::Dashboard));
    }

    #[test]
    fn parse_known_and_unknown_paths() {
        assert_eq!(Route::parse("/"), Route::Dashboard);
        assert_eq!(Route::parse(""), Route::Dashboard);
        assert_eq!(Route::parse("/devices/"), Route::Devices);
        assert_eq!(Route::parse("/users?page=2"), Route::Users);
        assert_eq!(Route::parse("/auth"), Route::Auth);
        assert_eq!(Route::parse("/nope"), Route::NotFound);
        for route in Route::ALL {
            assert_eq!(Route::parse(route.path()), route);
        }
    }

    #[test]
    fn resolve_picks_guard_by_route() {
        let state = authenticated();
        assert_eq!(resolve(Route::Devices, &state), GuardOutcome::Render);
        assert_eq!(resolve(Route::Auth, &state), GuardOutcome::Redirect(Route::Dashboard));
        assert_eq!(
            resolve(Route::Alerts, &SessionState::Anonymous),
            GuardOutcome::Redirect(Route::Auth)
        );
        assert_eq!(resolve(Route::NotFound, &SessionState::Loading), GuardOutcome::Render);
    }

    #[test]
    fn only_auth_and_unknown_paths_are_open() {
        for route in Route::ALL {
            let expected = if route.is_protected() {
                GuardOutcome::Redirect(Route::Auth)
            } else {
                GuardOutcome::Render
            };
            assert_eq!(resolve(route, &SessionState::Anonymous), expected, "{:?}", route);
        }
        assert!(!Route::Auth.is_protected());
        assert!(!Route::NotFound.is_protected());
        assert!(Route::Dashboard.is_protected());
    }
}
