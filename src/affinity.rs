//! Thread-pinning capability used by the receiver, dispatcher, and recorder
//! pools to place latency-sensitive workers on dedicated cores.
//!
//! Pinning is abstracted behind this small trait so the pools themselves
//! never touch `core_affinity` directly; a no-op backend is selected
//! automatically when the host lacks enough cores, per the pinning-disable
//! rule.

pub trait Affinity: Send + Sync {
    /// Attempts to pin the calling thread to logical core `core_id`.
    /// Failures are non-fatal: callers proceed and trust the OS scheduler.
    fn pin_current_thread(&self, core_id: usize);
}

/// Real pinning backend, used when the host has enough cores for every
/// worker the lifecycle controller intends to start.
#[cfg(feature = "affinity")]
pub struct CorePinningAffinity {
    cores: Vec<core_affinity::CoreId>,
}

#[cfg(feature = "affinity")]
impl CorePinningAffinity {
    pub fn new() -> Option<Self> {
        let cores = core_affinity::get_core_ids()?;
        Some(Self { cores })
    }
}

#[cfg(feature = "affinity")]
impl Affinity for CorePinningAffinity {
    fn pin_current_thread(&self, core_id: usize) {
        if let Some(core) = self.cores.get(core_id % self.cores.len().max(1)) {
            if !core_affinity::set_for_current(*core) {
                tracing::warn!(core_id, "failed to pin thread to requested core");
            }
        }
    }
}

/// No-op backend, selected when pinning is disabled or unavailable.
pub struct NoAffinity;

impl Affinity for NoAffinity {
    fn pin_current_thread(&self, _core_id: usize) {}
}

/// Picks the real pinning backend when `enabled` is true and enough cores
/// are present for `required_threads`, otherwise the no-op backend, per the
/// host-core rule: pinning is disabled automatically when
/// `cores < 1 + required_threads`.
pub fn select(enabled: bool, required_threads: usize) -> Box<dyn Affinity> {
    if !enabled {
        return Box::new(NoAffinity);
    }

    #[cfg(feature = "affinity")]
    {
        if let Some(backend) = CorePinningAffinity::new() {
            if backend.cores.len() >= 1 + required_threads {
                return Box::new(backend);
            }
            tracing::warn!(
                available_cores = backend.cores.len(),
                required_threads,
                "insufficient cores for pinning, falling back to OS scheduler"
            );
        }
    }
    #[cfg(not(feature = "affinity"))]
    {
        let _ = required_threads;
    }

    Box::new(NoAffinity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_affinity_backend_never_panics() {
        let affinity = NoAffinity;
        affinity.pin_current_thread(0);
        affinity.pin_current_thread(9999);
    }

    #[test]
    fn disabled_always_selects_noop() {
        let affinity = select(false, 64);
        affinity.pin_current_thread(0);
    }
}
