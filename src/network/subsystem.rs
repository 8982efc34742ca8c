//! Process-wide transport subsystem lifecycle
//!
//! Socket support is brought up once before any connection is attempted and
//! torn down when the last guard is released. Connections refuse to start
//! while no guard is alive.

use std::sync::atomic::{AtomicUsize, Ordering};

static ACTIVE_GUARDS: AtomicUsize = AtomicUsize::new(0);

/// Guard keeping the transport subsystem initialized
#[derive(Debug)]
pub struct TransportSubsystem {
    released: bool,
}

impl TransportSubsystem {
    /// Initialize the subsystem. Nested initializations are reference counted.
    pub fn init() -> Self {
        let previous = ACTIVE_GUARDS.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            tracing::info!("Transport subsystem initialized");
        }
        Self { released: false }
    }

    /// Whether any guard is currently alive
    pub fn is_initialized() -> bool {
        ACTIVE_GUARDS.load(Ordering::SeqCst) > 0
    }

    /// Release this guard explicitly
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if ACTIVE_GUARDS.fetch_sub(1, Ordering::SeqCst) == 1 {
            tracing::info!("Transport subsystem shut down");
        }
    }
}

impl Drop for TransportSubsystem {
    fn drop(&mut self) {
        self.release();
    }
}
