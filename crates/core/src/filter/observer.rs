//! Debug side channel for filtering passes.
//!
//! Observers are only called while `debug_mode` is on. They can never change
//! a decision, and a panicking observer is logged and otherwise ignored.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::filter::{FilteringDecision, FilteringResult};

pub trait FilterObserver: Send + Sync {
    fn on_decision(&self, _decision: &FilteringDecision) {}

    fn on_pass_complete(&self, _result: &FilteringResult) {}
}

pub(crate) fn notify(observer: &dyn FilterObserver, call: impl FnOnce(&dyn FilterObserver)) {
    if panic::catch_unwind(AssertUnwindSafe(|| call(observer))).is_err() {
        warn!("filter observer panicked; notification dropped");
    }
}
