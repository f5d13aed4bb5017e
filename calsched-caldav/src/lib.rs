//! CalDAV transport for calsched.
//!
//! [`DavStore`] implements the core `ResourceStore` over WebDAV and
//! [`DavAddressResolver`] resolves principal URLs with the same credentials.
//! [`Session`] ties both to a configured account.

pub mod caldav;
pub mod discovery;
pub mod session;
pub mod store;

pub use discovery::{DavAddressResolver, discover_principal, supports_scheduling};
pub use session::Session;
pub use store::DavStore;
