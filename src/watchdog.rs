//! Stop signals for batch runs.
//!
//! The batch driver asks its watchdog before starting each protocol. Work
//! already in flight is never interrupted, so protocols that were running when
//! the signal arrived still finish and report normally, and only those not yet
//! started are marked as cancelled.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// A watchdog shared by every worker of a batch.
pub type DynWatchdog = Arc<dyn Watchdog>;

/// Decides whether a batch should stop taking on new protocols.
///
/// Implementors are polled from worker threads, so the check should be cheap.
pub trait Watchdog
where
    Self: Debug + Send + Sync,
{
    /// Returns `true` once no further protocols should be started.
    #[must_use]
    fn should_stop(&self) -> bool;
}

/// Never signals a stop.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Signals a stop once a shared flag is raised, for example from a Ctrl-C
/// handler.
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    flag: Arc<AtomicBool>,
}

impl FlagWatchdog {
    /// Watches `flag`.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Shares the watchdog as a [`DynWatchdog`].
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use crate::watchdog::{FlagWatchdog, LazyWatchdog, Watchdog};

    #[test]
    fn flag_watchdog_follows_its_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let watchdog = FlagWatchdog::new(flag.clone()).in_arc();
        assert!(!watchdog.should_stop());

        flag.store(true, Ordering::Relaxed);
        assert!(watchdog.should_stop());
        assert!(!LazyWatchdog.in_arc().should_stop());
    }
}
