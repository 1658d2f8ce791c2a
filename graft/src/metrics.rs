use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::ServiceId;

/// Registration and resolution counters of a container.
///
/// Pure bookkeeping: nothing here influences resolution. One collector is
/// shared by a container and every scope created from it.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    registrations: AtomicU64,
    resolutions: AtomicU64,
    failed_resolutions: AtomicU64,
    circular_dependencies: AtomicU64,
    resolution_nanos: AtomicU64,
    cached_instances: AtomicUsize,
}

/// Point-in-time copy of the collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_registrations: u64,
    pub total_resolutions: u64,
    pub average_resolution_time: Duration,
    pub failed_resolutions: u64,
    pub circular_dependencies: u64,
    /// Instances currently retained by the container and scope caches.
    pub cached_instances: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_registration(&self, identifier: &ServiceId) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(service = %identifier, "Registration recorded");
    }

    pub fn record_resolution(&self, identifier: &ServiceId, duration: Duration, success: bool) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.resolution_nanos.fetch_add(nanos, Ordering::Relaxed);
        if !success {
            self.failed_resolutions.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(service = %identifier, ?duration, success, "Resolution recorded");
    }

    pub fn record_circular_dependency(&self) {
        self.circular_dependencies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn instance_retained(&self) {
        self.cached_instances.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn instances_released(&self, count: usize) {
        let _ = self
            .cached_instances
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(count))
            });
    }

    pub fn snapshot(&self) -> Metrics {
        let total_resolutions = self.resolutions.load(Ordering::Relaxed);
        let average_resolution_time = match total_resolutions {
            0 => Duration::ZERO,
            n => Duration::from_nanos(self.resolution_nanos.load(Ordering::Relaxed) / n),
        };
        Metrics {
            total_registrations: self.registrations.load(Ordering::Relaxed),
            total_resolutions,
            average_resolution_time,
            failed_resolutions: self.failed_resolutions.load(Ordering::Relaxed),
            circular_dependencies: self.circular_dependencies.load(Ordering::Relaxed),
            cached_instances: self.cached_instances.load(Ordering::Relaxed),
        }
    }

    /// Zeroes every counter. The cached instance gauge mirrors live cache
    /// contents and is left untouched.
    pub fn reset(&self) {
        self.registrations.store(0, Ordering::Relaxed);
        self.resolutions.store(0, Ordering::Relaxed);
        self.failed_resolutions.store(0, Ordering::Relaxed);
        self.circular_dependencies.store(0, Ordering::Relaxed);
        self.resolution_nanos.store(0, Ordering::Relaxed);
    }
}
