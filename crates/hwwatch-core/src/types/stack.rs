//! Captured call stacks.

use smallvec::SmallVec;

use super::Address;

/// Frames kept inline. Capturing up to this many frames never allocates, which
/// is what the trigger context needs.
pub const MAX_STACK_FRAMES: usize = 32;

/// Call stack captured when a watch triggered, innermost frame first.
///
/// Frames beyond [`MAX_STACK_FRAMES`] are dropped and the trace is flagged as
/// truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace
{
    frames: SmallVec<[Address; MAX_STACK_FRAMES]>,
    truncated: bool,
}

impl StackTrace
{
    /// Empty trace (the backend could not capture one).
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Build a trace from raw return addresses, keeping the first
    /// [`MAX_STACK_FRAMES`].
    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let mut trace = Self::new();
        for frame in frames {
            if !trace.push(Address::new(frame)) {
                break;
            }
        }
        trace
    }

    /// Append a frame. Returns `false` (and marks the trace truncated) once the
    /// inline capacity is used up.
    pub fn push(&mut self, frame: Address) -> bool
    {
        if self.frames.len() == MAX_STACK_FRAMES {
            self.truncated = true;
            return false;
        }
        self.frames.push(frame);
        true
    }

    /// Captured frames, innermost first.
    pub fn frames(&self) -> &[Address]
    {
        &self.frames
    }

    /// Number of captured frames.
    pub fn len(&self) -> usize
    {
        self.frames.len()
    }

    /// `true` if no frame was captured.
    pub fn is_empty(&self) -> bool
    {
        self.frames.is_empty()
    }

    /// `true` if frames were dropped.
    pub const fn is_truncated(&self) -> bool
    {
        self.truncated
    }
}
