/// The session engine's persistence boundary. Implementations mark
/// completions wherever they live (SQLite, a remote API, nothing at all).
///
/// Calls are fire-and-forget from the engine's point of view: a failure
/// surfaces as a warning event on the session, never as an engine error,
/// and never blocks a state transition.
///
/// A session runs on a single logical thread, so implementations are not
/// required to be `Send` or `Sync`.
pub trait CompletionRecorder {
    /// Called the first time a step is completed within a session.
    fn record_step_completion(&self, step_id: &str) -> Result<(), Box<dyn std::error::Error>>;

    /// Called once when the final step completes and the routine is done.
    fn record_routine_completion(&self, routine_id: &str)
        -> Result<(), Box<dyn std::error::Error>>;
}

/// Recorder that drops everything. For dry runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl CompletionRecorder for NullRecorder {
    fn record_step_completion(&self, _step_id: &str) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }

    fn record_routine_completion(
        &self,
        _routine_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
