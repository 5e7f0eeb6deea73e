use crate::ProcessState;

/// Errors surfaced by the coordination protocol
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The shared coordination store could not be read or written. No
    /// arbitration decision can be made without it.
    #[error("Coordination store unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),

    /// An arbiter operation was called out of protocol order
    #[error("Cannot call {operation}() while the process is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ProcessState,
    },

    #[cfg(feature = "dbus")]
    #[error("D-Bus error: {0}")]
    DBus(String),
}

#[cfg(feature = "dbus")]
impl From<zbus::Error> for Error {
    fn from(e: zbus::Error) -> Self {
        Error::DBus(e.to_string())
    }
}

#[cfg(feature = "dbus")]
impl From<zbus::fdo::Error> for Error {
    fn from(e: zbus::fdo::Error) -> Self {
        Error::DBus(e.to_string())
    }
}
