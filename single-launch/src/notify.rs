use crate::OwnershipRecord;

/// Out-of-band nudge sent by a challenger after it has written
/// `close_requested` on the current owner's record.
///
/// The record flag stays the contract: owners must still poll
/// [`SingleLaunchArbiter::should_close`](crate::SingleLaunchArbiter::should_close).
/// A notifier only lets an owner react before its next poll. Implementations
/// must not fail the handoff; they log and return.
pub trait HandoffNotifier {
    fn notify_close(&self, owner: &OwnershipRecord);
}

/// Relies on the owner polling the record, sends nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct PollingOnly;

impl HandoffNotifier for PollingOnly {
    fn notify_close(&self, owner: &OwnershipRecord) {
        log::trace!(
            "Close request for {} left for the owner to poll",
            owner.owner_identity
        );
    }
}

impl<F> HandoffNotifier for F
where
    F: Fn(&OwnershipRecord),
{
    fn notify_close(&self, owner: &OwnershipRecord) {
        self(owner)
    }
}
