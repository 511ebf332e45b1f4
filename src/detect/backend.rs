use anyhow::Result;

use crate::detect::result::Observation;
use crate::frame::Frame;

/// Occupancy evidence producer.
///
/// The detection worker owns its backend exclusively and only forwards the
/// boolean evidence of each `Observation` to the controller; frames and
/// regions never cross that boundary.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Observe one frame.
    fn observe(&mut self, frame: &Frame) -> Result<Observation>;

    /// Drop learned state so the next frame starts fresh.
    fn reset(&mut self) {}
}
