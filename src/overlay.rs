use std::sync::atomic::{AtomicBool, Ordering};

static MOUNTED: AtomicBool = AtomicBool::new(false);

/// Proof that this process owns the one overlay instance. Dropping it
/// (or calling `unmount`) releases the marker so tests can mount and
/// tear down in isolation.
#[derive(Debug)]
pub struct OverlayHandle {
    released: bool,
}

/// Claim the overlay singleton. Idempotent: if an instance is already
/// live this returns None immediately, with no side effects and no
/// error.
pub fn mount() -> Option<OverlayHandle> {
    MOUNTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
        .then(|| OverlayHandle { released: false })
}

#[cfg(test)]
pub fn is_mounted() -> bool {
    MOUNTED.load(Ordering::SeqCst)
}

impl OverlayHandle {
    #[allow(dead_code)]
    pub fn unmount(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            MOUNTED.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for OverlayHandle {
    fn drop(&mut self) {
        self.release();
    }
}
