//! Optional capability objects owned by a client: `manager` and
//! `monitor`. Each is probed once during `init`; losing a capability later
//! is non-fatal, so these are a simple supported/unsupported flag rather
//! than anything that can itself fail.

use std::sync::atomic::{AtomicBool, Ordering};

/// One optional backend capability.
#[derive(Debug)]
pub struct Extension {
    name: &'static str,
    supported: AtomicBool,
}

impl Extension {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            supported: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Record the result of the init-time probe.
    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    pub fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    /// Tear down this capability. Idempotent; never fails, since losing a
    /// capability is non-fatal.
    pub fn destroy(&self) {
        self.supported.store(false, Ordering::SeqCst);
    }
}

/// The two optional capabilities a backend may advertise.
#[derive(Debug)]
pub struct Extensions {
    pub manager: Extension,
    pub monitor: Extension,
}

impl Extensions {
    pub fn new() -> Self {
        Self {
            manager: Extension::new("manager"),
            monitor: Extension::new("monitor"),
        }
    }

    pub fn destroy_all(&self) {
        self.manager.destroy();
        self.monitor.destroy();
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprobed_extension_is_unsupported() {
        let ext = Extension::new("manager");
        assert!(!ext.is_supported());
    }

    #[test]
    fn probe_result_is_recorded() {
        let ext = Extension::new("monitor");
        ext.set_supported(true);
        assert!(ext.is_supported());
    }

    #[test]
    fn destroy_all_clears_both_capabilities() {
        let extensions = Extensions::new();
        extensions.manager.set_supported(true);
        extensions.monitor.set_supported(true);
        extensions.destroy_all();
        assert!(!extensions.manager.is_supported());
        assert!(!extensions.monitor.is_supported());
    }
}
