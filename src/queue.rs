//! Logical queue kinds (spec glossary: "Queue kind").

/// One of the three logical queues a pass can be scheduled on. Async
/// compute is optional; when disabled, `Compute` is remapped to `Graphics`
/// by the caller before it ever reaches the scheduler (see
/// [`crate::settings::Settings::use_async_compute`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueKind {
    Graphics,
    Compute,
    Copy,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Graphics, QueueKind::Compute, QueueKind::Copy];

    /// Remap `Compute` to `Graphics` when async compute is disabled.
    pub fn resolve(self, async_compute_enabled: bool) -> QueueKind {
        if self == QueueKind::Compute && !async_compute_enabled {
            QueueKind::Graphics
        } else {
            self
        }
    }
}
