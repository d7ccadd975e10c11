//! Diagnostic callbacks for patch application.
//!
//! The transform itself never logs. Callers that want counts, regions or
//! failures plug in a [`PatchObserver`]; [`TracingObserver`] forwards them
//! to `tracing`.

use crate::region::{Region, RegionError, Selector};

/// Receives events from a [`RegionPatcher`](crate::patch::RegionPatcher).
///
/// Every method has a no-op default.
pub trait PatchObserver {
    fn located(&mut self, _selector: &Selector, _region: Region) {}

    fn applied(&mut self, _region: Region, _lines_before: usize, _lines_after: usize) {}

    fn failed(&mut self, _error: &RegionError) {}
}

impl<O: PatchObserver + ?Sized> PatchObserver for &mut O {
    fn located(&mut self, selector: &Selector, region: Region) {
        (**self).located(selector, region);
    }

    fn applied(&mut self, region: Region, lines_before: usize, lines_after: usize) {
        (**self).applied(region, lines_before, lines_after);
    }

    fn failed(&mut self, error: &RegionError) {
        (**self).failed(error);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PatchObserver for NoopObserver {}

/// Emits one `tracing` event per callback, tagged with a context label
/// (usually the patch id).
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    context: String,
}

impl TracingObserver {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

impl PatchObserver for TracingObserver {
    fn located(&mut self, selector: &Selector, region: Region) {
        tracing::debug!(patch = %self.context, %selector, %region, "region located");
    }

    fn applied(&mut self, region: Region, lines_before: usize, lines_after: usize) {
        tracing::debug!(
            patch = %self.context,
            %region,
            lines_before,
            lines_after,
            "region replaced"
        );
    }

    fn failed(&mut self, error: &RegionError) {
        tracing::debug!(patch = %self.context, %error, "region patch failed");
    }
}

/// Records every event; handy for reporting and for tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingObserver {
    pub located: Vec<Region>,
    pub applied: Vec<(Region, usize, usize)>,
    pub failures: Vec<RegionError>,
}

impl PatchObserver for RecordingObserver {
    fn located(&mut self, _selector: &Selector, region: Region) {
        self.located.push(region);
    }

    fn applied(&mut self, region: Region, lines_before: usize, lines_after: usize) {
        self.applied.push((region, lines_before, lines_after));
    }

    fn failed(&mut self, error: &RegionError) {
        self.failures.push(error.clone());
    }
}
