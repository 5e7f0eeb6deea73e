mod arbiter;
#[cfg(feature = "dbus")]
mod dbus;
mod error;
mod file_store;
mod notify;
mod record;
mod store;
pub use arbiter::*;
#[cfg(feature = "dbus")]
pub use dbus::*;
pub use error::*;
pub use file_store::*;
pub use notify::*;
pub use record::*;
pub use store::*;
