//! Contracts for the collaborators the scheduler drives but does not own.

use std::path::Path;

/// Type-erased error returned by collaborators without a dedicated error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An interruptible computation that advances in bounded steps.
///
/// Implementations must guarantee liveness: for any source, repeated calls to
/// [`Generator::step`] eventually make [`Generator::is_running`] return false.
pub trait Generator {
    type Source: ?Sized;
    type Output: ?Sized;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Begins a run against `source`. Fails if a run is already in flight.
    fn start(&mut self, source: &Self::Source) -> Result<(), Self::Error>;

    /// Advances the run by one unit and returns the cost it incurred.
    ///
    /// Work may be queued rather than executed; it becomes visible after the
    /// next flush.
    fn step(&mut self) -> f32;

    fn is_running(&self) -> bool;

    /// Extracts the finished artifact. Only valid right after the run stops.
    fn get_result(&mut self, output: &mut Self::Output) -> Result<(), Self::Error>;

    /// Releases backing resources. Must tolerate repeated calls.
    fn dispose(&mut self);
}

/// Provider of the model data a generator is built from.
pub trait WeightSource {
    type Table;
    type Error: std::error::Error + Send + Sync + 'static;

    fn load(&mut self, path: &Path) -> Result<Self::Table, Self::Error>;

    fn release(&mut self, table: Self::Table);
}

/// Submits every queued GPU command as one batch.
pub trait GpuFlush {
    fn flush(&mut self) -> Result<(), BoxError>;
}

impl<F> GpuFlush for F
where
    F: FnMut() -> Result<(), BoxError>,
{
    fn flush(&mut self) -> Result<(), BoxError> {
        self()
    }
}

/// Source of the previous frame's wall-clock duration.
pub trait FrameClock {
    fn last_frame_seconds(&self) -> f32;
}

/// Receives the output of every completed run.
pub trait Consumer<O: ?Sized> {
    fn consume(&mut self, output: &O);
}

impl<O, F> Consumer<O> for F
where
    O: ?Sized,
    F: FnMut(&O),
{
    fn consume(&mut self, output: &O) {
        self(output)
    }
}
