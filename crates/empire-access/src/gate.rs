use crate::role::Role;

/// Where unauthenticated viewers are sent, whatever the route.
pub const LOGIN_PATH: &str = "/login";

/// Outcome of a route authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Render the requested route.
    Render,
    /// Send the viewer elsewhere.
    Redirect(String),
}

/// Decide whether a viewer may proceed to a route.
///
/// `viewer_role` is `None` for unauthenticated viewers, who always
/// redirect to [`LOGIN_PATH`]. Authenticated viewers render iff their
/// role is in `allowed`; otherwise they redirect to `fallback`.
///
/// Pure function: a pending role lookup is the caller's loading state,
/// not a gate concern.
pub fn authorize(viewer_role: Option<Role>, allowed: &[Role], fallback: &str) -> Decision {
    match viewer_role {
        None => Decision::Redirect(LOGIN_PATH.to_string()),
        Some(role) if allowed.contains(&role) => Decision::Render,
        Some(_) => Decision::Redirect(fallback.to_string()),
    }
}
