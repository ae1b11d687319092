//! Local fork management.
//!
//! Setup clones the fork on first run and installs its dependency
//! manifest; sync fetches the upstream branch, rebases onto it and pushes
//! the result to `origin`. All git and pip calls go through the shared
//! [`CommandRunner`](crate::execution::CommandRunner).

pub mod sync;

pub use sync::{RepoSync, UPSTREAM_REMOTE};
