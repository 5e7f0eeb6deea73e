use crate::ClaimState;
use crate::CoordinationStore;
use crate::Error;
use crate::HandoffNotifier;
use crate::OwnershipRecord;
use crate::PollingOnly;
use chrono::Utc;
use std::time::Duration;
use std::time::Instant;
use uuid::Uuid;

/// Where a process is in the launch protocol.
///
/// `NotClaimed -> Claimed -> Active -> Released`, or
/// `NotClaimed -> Suppressed` for a duplicate launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotClaimed,
    Claimed,
    Active,
    Suppressed,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// How often a challenger re-reads the record while waiting for the
    /// previous owner to release it
    pub poll_interval: Duration,

    /// How long a challenger waits before force-claiming ownership
    pub handoff_timeout: Duration,

    /// An owner whose heartbeat is older than this is treated as crashed.
    ///
    /// `None` disables the check: only `will_close` releases ownership, and a
    /// crashed owner blocks relaunches of its application until the record
    /// is cleared by hand.
    pub stale_after: Option<Duration>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            poll_interval: Duration::from_millis(100),
            handoff_timeout: Duration::from_secs(2),
            stale_after: Some(Duration::from_secs(10)),
        }
    }
}

/// Per-process arbiter deciding whether this launch proceeds, and driving
/// the handoff from a different application that is currently active.
///
/// ```no_run
/// use single_launch::FileStore;
/// use single_launch::SingleLaunchArbiter;
///
/// # fn main() -> Result<(), single_launch::Error> {
/// let mut app = SingleLaunchArbiter::new("MyApp", FileStore::new("/tmp/single_launch.lock"));
/// if !app.is_active()? {
///     app.will_present()?;
///     // show the view, poll app.should_close() and app.keep_alive() on each tick,
///     // and call app.will_close() from the view's teardown
///     app.will_close()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct SingleLaunchArbiter<S> {
    identity: String,
    store: S,
    config: ArbiterConfig,
    notifier: Box<dyn HandoffNotifier + Send + Sync>,
    state: ProcessState,
    liveness_token: Option<String>,
}

impl<S: CoordinationStore> SingleLaunchArbiter<S> {
    /// - `identity`: application name, expected to be unique among the
    ///   participating applications (not enforced)
    /// - `store`: the host-wide coordination store
    pub fn new(identity: impl Into<String>, store: S) -> Self {
        SingleLaunchArbiter {
            identity: identity.into(),
            store,
            config: ArbiterConfig::default(),
            notifier: Box::new(PollingOnly),
            state: ProcessState::NotClaimed,
            liveness_token: None,
        }
    }

    pub fn with_config(mut self, config: ArbiterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: impl HandoffNotifier + Send + Sync + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Token of the claim this process holds, if any
    pub fn liveness_token(&self) -> Option<&str> {
        self.liveness_token.as_deref()
    }

    pub fn current_record(&self) -> Result<OwnershipRecord, Error> {
        self.store.read()
    }

    /// Tests if this application is already active.
    ///
    /// Returns `true` if a live process of the same application owns the
    /// record; the caller must exit without presenting anything. Returns
    /// `false` once this process has claimed ownership, after asking a
    /// different active application to close and waiting (bounded) for it to
    /// do so. The caller should then call [`will_present`](Self::will_present).
    pub fn is_active(&mut self) -> Result<bool, Error> {
        if self.state != ProcessState::NotClaimed {
            return Err(self.invalid_state("is_active"));
        }

        let record = self.store.read()?;
        let now = Utc::now();

        if record.is_empty() {
            log::info!("No active application, {} claims ownership", self.identity);
            self.claim(ClaimState::Claiming)?;
            return Ok(false);
        }

        let stale = record.is_stale(now, self.config.stale_after);

        if record.owner_identity == self.identity {
            if !stale {
                log::info!(
                    "App {} is already active (pid {:?}), suppressing this launch",
                    self.identity,
                    record.pid
                );
                self.state = ProcessState::Suppressed;
                return Ok(true);
            }
            log::warn!(
                "App {} owner (pid {:?}) is stale, last heartbeat {:?}, claiming over it",
                self.identity,
                record.pid,
                record.heartbeat_at
            );
            self.claim(ClaimState::Claiming)?;
            return Ok(false);
        }

        if stale {
            log::warn!(
                "App {} (pid {:?}) is stale, last heartbeat {:?}, {} claims without waiting",
                record.owner_identity,
                record.pid,
                record.heartbeat_at,
                self.identity
            );
        } else {
            self.hand_off(record)?;
        }
        self.claim(ClaimState::Claiming)?;
        Ok(false)
    }

    /// Declares that the application is about to present its main view.
    ///
    /// Confirms the claim made by `is_active`, or claims afresh if that claim
    /// was never made or the record has been cleared since. A claim taken
    /// over by a later launch is left alone; `should_close` is then true.
    pub fn will_present(&mut self) -> Result<(), Error> {
        match self.state {
            ProcessState::Suppressed | ProcessState::Released => {
                return Err(self.invalid_state("will_present"));
            }
            ProcessState::NotClaimed => {
                log::debug!("App {} presenting without is_active()", self.identity);
                return self.claim(ClaimState::Active);
            }
            ProcessState::Claimed | ProcessState::Active => {}
        }

        let mut record = self.store.read()?;
        let held = match self.liveness_token.as_deref() {
            Some(token) => record.is_held_by(&self.identity, token),
            None => false,
        };
        if !held {
            if record.is_empty() {
                log::warn!("App {} claim was cleared before presenting, claiming again", self.identity);
                return self.claim(ClaimState::Active);
            }
            // Taken over by a later launch; should_close() now reports it
            log::warn!(
                "App {} was displaced by {:?} before presenting",
                self.identity,
                record.owner_identity
            );
            self.state = ProcessState::Active;
            return Ok(());
        }

        record.state = ClaimState::Active;
        record.heartbeat_at = Some(Utc::now());
        self.store.write(&record)?;
        self.state = ProcessState::Active;
        log::info!("App {} is presenting", self.identity);
        Ok(())
    }

    /// Declares that the application's main view is closing.
    ///
    /// Clears the record if it still carries this process's claim. Safe to
    /// call when this process never claimed or has been displaced, and safe
    /// to call more than once.
    pub fn will_close(&mut self) -> Result<(), Error> {
        let Some(token) = self.liveness_token.clone() else {
            if self.state == ProcessState::NotClaimed {
                self.state = ProcessState::Released;
            }
            log::debug!("App {} never held ownership, nothing to release", self.identity);
            return Ok(());
        };

        let record = self.store.read()?;
        if record.is_held_by(&self.identity, &token) {
            self.store.write(&OwnershipRecord::default())?;
            log::info!("App {} released ownership", self.identity);
        } else {
            log::info!(
                "App {} closing, ownership already taken over by {:?}",
                self.identity,
                record.owner_identity
            );
        }

        self.liveness_token = None;
        self.state = ProcessState::Released;
        Ok(())
    }

    /// Whether the running application should close its view now.
    ///
    /// True when another application has requested the close, or when this
    /// process's claim has been replaced in the record. Meant to be polled
    /// from the application's own event loop.
    pub fn should_close(&self) -> Result<bool, Error> {
        let Some(token) = self.liveness_token.as_deref() else {
            return Ok(false);
        };

        let record = self.store.read()?;
        if !record.is_held_by(&self.identity, token) {
            log::debug!(
                "App {} no longer owns the record, owner is {:?}",
                self.identity,
                record.owner_identity
            );
            return Ok(true);
        }
        Ok(record.close_requested)
    }

    /// Refreshes the heartbeat on this process's claim.
    ///
    /// Must be called more often than `stale_after`, otherwise a relaunch
    /// treats this process as crashed. Returns `false` if the claim is no
    /// longer held.
    pub fn keep_alive(&self) -> Result<bool, Error> {
        let Some(token) = self.liveness_token.as_deref() else {
            return Ok(false);
        };

        let mut record = self.store.read()?;
        if !record.is_held_by(&self.identity, token) {
            return Ok(false);
        }
        record.heartbeat_at = Some(Utc::now());
        self.store.write(&record)?;
        log::trace!("App {} heartbeat", self.identity);
        Ok(true)
    }

    /// Asks `owner` to close and waits until it lets go of the record or the
    /// handoff timeout elapses.
    fn hand_off(&self, mut owner: OwnershipRecord) -> Result<(), Error> {
        log::info!(
            "App {} is active, requesting it to close for {}",
            owner.owner_identity,
            self.identity
        );
        owner.close_requested = true;
        if !self.request_close(&owner)? {
            log::info!("App {} released ownership before the request", owner.owner_identity);
            return Ok(());
        }
        self.notifier.notify_close(&owner);

        let deadline = Instant::now() + self.config.handoff_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "App {} (pid {:?}) did not release ownership within {:?}, {} force-claims",
                    owner.owner_identity,
                    owner.pid,
                    self.config.handoff_timeout,
                    self.identity
                );
                return Ok(());
            }
            std::thread::sleep(self.config.poll_interval.min(deadline - now));

            let current = self.store.read()?;
            if !same_claim(&current, &owner) {
                log::info!(
                    "App {} released ownership, now {:?}",
                    owner.owner_identity,
                    current.owner_identity
                );
                return Ok(());
            }

            if current.close_requested {
                log::trace!("Waiting for {} to close", owner.owner_identity);
                continue;
            }

            // A heartbeat from the owner overwrote the request
            log::debug!("Repeating close request to {}", owner.owner_identity);
            if !self.request_close(&owner)? {
                log::info!("App {} released ownership", owner.owner_identity);
                return Ok(());
            }
        }
    }

    /// Sets `close_requested` on `owner`'s claim, reading the record right
    /// before the write so a claim released in between is not written back.
    /// Returns `false` if the claim is already gone.
    fn request_close(&self, owner: &OwnershipRecord) -> Result<bool, Error> {
        let mut current = self.store.read()?;
        if !same_claim(&current, owner) {
            return Ok(false);
        }
        current.close_requested = true;
        self.store.write(&current)?;
        Ok(true)
    }

    fn claim(&mut self, state: ClaimState) -> Result<(), Error> {
        let token = Uuid::new_v4().to_string();
        let record = OwnershipRecord::claim(&self.identity, token.clone(), state, Utc::now());
        self.store.write(&record)?;
        log::debug!(
            "App {} claimed ownership as {:?} with token {}",
            self.identity,
            state,
            token
        );

        self.liveness_token = Some(token);
        self.state = match state {
            ClaimState::Claiming => ProcessState::Claimed,
            ClaimState::Active => ProcessState::Active,
        };
        Ok(())
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state,
        }
    }
}

fn same_claim(current: &OwnershipRecord, owner: &OwnershipRecord) -> bool {
    current.owner_identity == owner.owner_identity && current.liveness_token == owner.liveness_token
}
