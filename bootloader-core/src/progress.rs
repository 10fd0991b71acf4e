//! Observer interface invoked at Driver state transitions.

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ProgressState {
    Waiting,
    Start,
    /// `progress` is the only state where the fraction argument is meaningful.
    InProgress,
    End,
    Error,
}

/// Implementations MUST NOT block the Driver's thread.
pub trait ProgressSink {
    fn report(&self, state: ProgressState, progress: f32);
}

/// Discards every report. Used in tests and as a default.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _state: ProgressState, _progress: f32) {}
}
