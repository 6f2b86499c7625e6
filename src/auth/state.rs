//! Authentication state traits and macro.

use crate::session::SessionService;

/// Trait for state types that provide session access for authentication.
pub trait HasAuthBackend {
    fn sessions(&self) -> &SessionService;
    fn secure_cookies(&self) -> bool;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `sessions: Arc<SessionService>`
/// - `secure_cookies: bool`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: Arc<SessionService>,
///     pub secure_cookies: bool,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn sessions(&self) -> &$crate::session::SessionService {
                &self.sessions
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
