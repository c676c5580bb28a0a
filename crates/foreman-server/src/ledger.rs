//! Argument ledger
//!
//! The server-side set of outstanding arguments - the source of truth
//! for "is there anything left to do". An argument enters on seeding and
//! leaves exactly once: on a successful fold, or at shutdown when the
//! leftovers are dumped. A failed argument stays in the ledger (the
//! failures dump accounts for it separately).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use foreman_core::Counters;
use foreman_wire::JobValue;

/// What happened on a discharge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discharge {
    /// The argument was outstanding and has been removed.
    Removed,
    /// The argument was not in the ledger - a duplicate or stray result.
    NotOutstanding,
}

#[derive(Debug)]
pub(crate) struct ArgumentLedger {
    outstanding: Mutex<HashSet<JobValue>>,
    counters: Arc<Counters>,
}

impl ArgumentLedger {
    pub(crate) fn new(counters: Arc<Counters>) -> Self {
        Self {
            outstanding: Mutex::new(HashSet::new()),
            counters,
        }
    }

    /// Add an argument and count it, atomically with respect to the
    /// `numjobs` increment. A re-registered argument is counted again
    /// (the caller owns uniqueness if at-most-once-send is wanted).
    pub(crate) fn register(&self, arg: &JobValue) -> u64 {
        let mut outstanding = self.outstanding.lock().expect("ledger mutex poisoned");
        outstanding.insert(arg.clone());
        self.counters.record_job()
    }

    /// Remove an argument after its result was received.
    pub(crate) fn discharge(&self, arg: &JobValue) -> Discharge {
        let removed = self
            .outstanding
            .lock()
            .expect("ledger mutex poisoned")
            .remove(arg);
        if removed {
            Discharge::Removed
        } else {
            Discharge::NotOutstanding
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.outstanding.lock().expect("ledger mutex poisoned").len()
    }

    /// Snapshot of the outstanding set, for the shutdown dumps.
    pub(crate) fn snapshot(&self) -> Vec<JobValue> {
        self.outstanding
            .lock()
            .expect("ledger mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
