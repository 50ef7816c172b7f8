//! Durability marker fan-out to registered callbacks (§4.5).

use parking_lot::Mutex;

use crate::backend::DurabilityCallback;

/// Holds every callback registered via `Database::register_durability_callback`
/// and forwards each marker as the backend reports it becoming durable.
///
/// Backends own one of these and call [`DurabilityDispatcher::notify`] from
/// whatever thread observes the new marker; callback invocation order across
/// distinct callbacks is unspecified, matching the registration contract.
#[derive(Default)]
pub struct DurabilityDispatcher {
    callbacks: Mutex<Vec<DurabilityCallback>>,
}

impl DurabilityDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cb: DurabilityCallback) {
        self.callbacks.lock().push(cb);
    }

    /// Invokes every registered callback with `marker`. Markers must be
    /// delivered in non-decreasing order by the caller.
    pub fn notify(&self, marker: u64) {
        for cb in self.callbacks.lock().iter() {
            cb(marker);
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}
