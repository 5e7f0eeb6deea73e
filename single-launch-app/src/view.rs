use crate::AppMessage;
use crate::print_record;
use single_launch::CoordinationStore;
use single_launch::SingleLaunchArbiter;

/// The application's main "view": a terminal session that stays open until
/// the user quits or another application takes over.
pub struct TerminalView<S: CoordinationStore> {
    arbiter: SingleLaunchArbiter<S>,
    closed: bool,
}

impl<S: CoordinationStore> TerminalView<S> {
    /// Declares the view to the arbiter and shows it
    pub fn present(mut arbiter: SingleLaunchArbiter<S>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Err(e) = arbiter.will_present() {
            if let Err(close_err) = arbiter.will_close() {
                log::warn!("Unable to release ownership after failed present: {}", close_err);
            }
            return Err(e.into());
        }
        println!("{} is now the active application.", arbiter.identity());
        Ok(Self {
            arbiter,
            closed: false,
        })
    }

    /// Closes the view. Releasing ownership is part of the view's teardown,
    /// so it runs exactly once whatever the reason.
    pub fn close(&mut self, reason: &str) -> Result<(), Box<dyn std::error::Error>> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::info!("Closing {}: {}", self.arbiter.identity(), reason);
        println!("Closing {} ({}).", self.arbiter.identity(), reason);
        self.arbiter.will_close()?;
        Ok(())
    }

    /// Handles one event. A failing event closes the view before the error
    /// is returned, so ownership is released on every exit path.
    pub fn dispatch(&mut self, event: &AppMessage) -> Result<bool, Box<dyn std::error::Error>> {
        match self.handle_app_events(event) {
            Ok(exit) => Ok(exit),
            Err(e) => {
                log::error!("Event {:?} failed: {}", event, e);
                if let Err(close_err) = self.close("error") {
                    log::warn!("Unable to release ownership: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Returns true when the application should exit
    fn handle_app_events(&mut self, event: &AppMessage) -> Result<bool, Box<dyn std::error::Error>> {
        match event {
            AppMessage::Tick => {
                if self.arbiter.should_close()? {
                    self.close("another application took over")?;
                    return Ok(true);
                }
                self.arbiter.keep_alive()?;
            }
            #[cfg(feature = "dbus")]
            AppMessage::CloseRequested => {
                log::debug!("Close request received over D-Bus");
                if self.arbiter.should_close()? {
                    self.close("another application took over")?;
                    return Ok(true);
                }
            }
            AppMessage::ShowStatus => {
                print_record(&self.arbiter.current_record()?);
            }
            AppMessage::Exit => {
                self.close("closed by user")?;
                return Ok(true);
            }
            AppMessage::Interrupted => {
                self.close("interrupted")?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use single_launch::Error;
    use single_launch::MemoryStore;
    use single_launch::OwnershipRecord;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    /// Fails the next `failing_reads` reads, then works again
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing_reads: Arc<AtomicUsize>,
    }

    impl CoordinationStore for FlakyStore {
        fn read(&self) -> Result<OwnershipRecord, Error> {
            let failing = self
                .failing_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(std::io::Error::other("store briefly unavailable").into());
            }
            self.inner.read()
        }

        fn write(&self, record: &OwnershipRecord) -> Result<(), Error> {
            self.inner.write(record)
        }
    }

    fn presented(store: &FlakyStore) -> Result<TerminalView<FlakyStore>, Box<dyn std::error::Error>> {
        let mut arbiter = SingleLaunchArbiter::new("Notes", store.clone());
        assert!(!arbiter.is_active()?);
        TerminalView::present(arbiter)
    }

    #[test]
    fn test_failed_tick_releases_ownership() -> Result<(), Box<dyn std::error::Error>> {
        let store = FlakyStore::default();
        let mut view = presented(&store)?;
        assert_eq!(store.inner.read()?.owner_identity, "Notes");

        store.failing_reads.store(1, Ordering::SeqCst);
        assert!(view.dispatch(&AppMessage::Tick).is_err());
        assert!(store.inner.read()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_exit_releases_ownership_once() -> Result<(), Box<dyn std::error::Error>> {
        let store = FlakyStore::default();
        let mut view = presented(&store)?;
        assert!(!view.dispatch(&AppMessage::Tick)?);
        assert!(view.dispatch(&AppMessage::Exit)?);
        assert!(store.inner.read()?.is_empty());

        // A later launch owns the record, the closed view leaves it alone
        let mut relaunch = SingleLaunchArbiter::new("Notes", store.clone());
        assert!(!relaunch.is_active()?);
        view.close("again")?;
        assert_eq!(store.inner.read()?.liveness_token.as_deref(), relaunch.liveness_token());
        Ok(())
    }

    #[test]
    fn test_displaced_view_exits_on_tick() -> Result<(), Box<dyn std::error::Error>> {
        let store = FlakyStore::default();
        let mut view = presented(&store)?;
        store.inner.write(&OwnershipRecord::claim(
            "Calc",
            "calc".into(),
            single_launch::ClaimState::Active,
            chrono::Utc::now(),
        ))?;

        assert!(view.dispatch(&AppMessage::Tick)?);
        assert_eq!(store.inner.read()?.owner_identity, "Calc");
        Ok(())
    }
}
