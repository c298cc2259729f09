//! Metrics emission via the `metrics` facade.
//!
//! Events are structs implementing [`InternalEvent`]; whether anything
//! records them depends on the recorder the embedding application installs.
//! No exporter is wired in here.

pub mod events;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Emit an internal event.
pub fn emit(event: impl InternalEvent) {
    event.emit();
}
