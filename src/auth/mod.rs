//! Credential authentication and transparent refresh for axum routes.
//!
//! Protected routes sit behind [`transparent_refresh`], which turns a rotation
//! token into a fresh credential when needed, and then use the [`Auth`] or
//! [`ActiveAuth`] extractor, which only ever look at the credential.

mod errors;
mod extractors;
mod refresh;
mod state;
mod transport;
mod types;

pub use errors::ApiAuthError;
pub use extractors::{ActiveAuth, Auth};
pub use refresh::transparent_refresh;
pub use state::HasAuthBackend;
pub use transport::{
    ACCESS_COOKIE_NAME, ACCESS_HEADER_NAME, CREDENTIAL_TRANSPORT, REFRESH_COOKIE_NAME,
    REFRESH_HEADER_NAME, ROTATION_TRANSPORT, TokenSource, TokenTransport, append_cleared_cookies,
    write_session,
};
pub use types::AuthenticatedUser;
