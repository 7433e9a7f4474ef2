//! Profile visibility and role-gated routing.
//!
//! Three small pieces:
//! - per-field disclosure decisions over member profiles
//!   ([`can_view`], [`directory_visible`]) plus the owner-only
//!   mutations that persist visibility settings;
//! - the fixed role ladder ([`Role`]) and the route decision function
//!   ([`authorize`]);
//! - a TTL'd role cache with an injected clock ([`RoleCache`],
//!   [`RoleResolver`]).

pub mod cache;
pub mod gate;
pub mod role;
pub mod visibility;

pub use cache::{Clock, ManualClock, RoleCache, RoleResolver, SystemClock};
pub use gate::{authorize, Decision, LOGIN_PATH};
pub use role::Role;
pub use visibility::{
    can_view, directory_visible, set_invisible, set_visibility, AccessError, Profile,
    ProfileField, Viewer, VisibilityLevel,
};
