use crate::errors::PlayerError;

/// Transport operations every playback engine provides.
///
/// `load` only changes the media target; nothing is heard until `play`.
pub trait TransportControl {
    /// Sets the media the next `play` will start.
    fn load(&self, uri: &str) -> Result<(), PlayerError>;

    /// Starts playback of the loaded media, or resumes it when paused.
    fn play(&self) -> Result<(), PlayerError>;

    /// Pauses playback. Pausing an already paused engine does nothing.
    fn pause(&self) -> Result<(), PlayerError>;

    /// Stops playback.
    fn stop(&self) -> Result<(), PlayerError>;

    /// Moves the play head by `offset_seconds` (negative goes back).
    fn skip(&self, offset_seconds: i64) -> Result<(), PlayerError>;
}

/// Position reporting.
///
/// Unknown values are `None`, never errors: engines log their own failures
/// and fall back to the last value they saw.
pub trait PlaybackPosition {
    /// Elapsed seconds in the current media.
    fn position(&self) -> Option<u64>;

    /// Total seconds of the current media.
    fn duration(&self) -> Option<u64>;

    /// Media target set by the last `load`.
    fn current_uri(&self) -> Option<String>;
}
