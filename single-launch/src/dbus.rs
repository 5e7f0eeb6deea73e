use crate::Error;
use crate::HandoffNotifier;
use crate::OwnershipRecord;
use futures::executor::block_on;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use zbus::interface;
use zbus::Connection;

const OBJECT_PATH: &str = "/org/singlelaunch/Owner";
const INTERFACE_NAME: &str = "org.singlelaunch.Owner";

/// Make a D-Bus well-known name for an application identity.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, and an element may not
/// start with a digit. The mapping only depends on the identity, so every
/// participating binary derives the same name.
fn bus_name_for(identity: &str) -> String {
    let mut element: String = identity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if element.is_empty() || element.starts_with(|c: char| c.is_ascii_digit()) {
        element.insert(0, '_');
    }
    format!("org.singlelaunch.App.{}", element)
}

/// Serves close requests for `identity` on the session bus.
///
/// - `identity`: the identity this process owns
/// - `callback`: invoked when a challenger asks this process to close. It
///   should end up closing the view, which calls `will_close`.
pub fn listen_for_close_requests(
    identity: &str,
    callback: impl Fn() + Send + Sync + 'static,
) -> Result<JoinHandle<()>, Error> {
    let bus_name = bus_name_for(identity);

    // Fail early on a missing session bus, before spawning
    block_on(Connection::session())?;

    let handle = std::thread::spawn(move || {
        let served = block_on(async {
            let connection = Connection::session().await?;

            // A newer owner of the same identity takes the name over
            zbus::fdo::DBusProxy::new(&connection)
                .await?
                .request_name(
                    zbus::names::WellKnownName::from_string_unchecked(bus_name.clone()),
                    zbus::fdo::RequestNameFlags::AllowReplacement
                        | zbus::fdo::RequestNameFlags::ReplaceExisting,
                )
                .await?;

            let service = CloseRequestService {
                callback: Arc::new(Mutex::new(callback)),
            };
            connection.object_server().at(OBJECT_PATH, service).await?;
            log::debug!("Listening for close requests as {}", bus_name);

            // Keep the connection alive
            futures::future::pending::<()>().await;
            Ok::<(), Error>(())
        });
        if let Err(e) = served {
            log::warn!("Close request listener stopped: {}", e);
        }
    });

    Ok(handle)
}

/// Asks the owner of `identity` to close through its D-Bus listener
pub fn request_close(identity: &str) -> Result<(), Error> {
    let bus_name = bus_name_for(identity);

    block_on(async {
        let connection = Connection::session().await?;

        let proxy = zbus::Proxy::new(&connection, bus_name, OBJECT_PATH, INTERFACE_NAME).await?;

        proxy.call_method("RequestClose", &()).await?;

        Ok(())
    })
}

/// Sends the handoff close request over D-Bus in addition to the record flag
#[derive(Debug, Clone, Copy, Default)]
pub struct DbusNotifier;

impl HandoffNotifier for DbusNotifier {
    fn notify_close(&self, owner: &OwnershipRecord) {
        match request_close(&owner.owner_identity) {
            Ok(()) => log::debug!("Sent D-Bus close request to {}", owner.owner_identity),
            Err(e) => log::info!(
                "No D-Bus close listener for {} ({}), relying on polling",
                owner.owner_identity,
                e
            ),
        }
    }
}

struct CloseRequestService {
    callback: Arc<Mutex<dyn Fn() + Send + Sync + 'static>>,
}

#[interface(name = "org.singlelaunch.Owner")]
impl CloseRequestService {
    /// Called by a challenger that wants this process to close
    fn request_close(&self) {
        match self.callback.lock() {
            Ok(callback) => callback(),
            Err(_) => log::error!("Close request callback lock poisoned"),
        }
    }
}
