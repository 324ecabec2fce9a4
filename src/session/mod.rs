//! Session lookup against the external identity provider.

mod provider;
mod static_provider;

pub use provider::{Session, SessionError, SessionProvider, SessionUser};
pub use static_provider::StaticSessionProvider;
