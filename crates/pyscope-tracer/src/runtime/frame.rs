use crate::event::{Bindings, FrameId};
use crate::filter::CodeLocation;

/// Trait providing introspection over a frame of the host runtime.
///
/// The tracer and the filter policy only ever look at frames through this
/// trait, so each host runtime provides its own implementation.
pub trait FrameInspector {
    /// Returns the ID of the thread running this frame.
    fn thread_id(&self) -> u64;

    /// Returns the frame's ID.
    fn frame_id(&self) -> FrameId;

    /// Returns the qualified name of the function running in this frame.
    fn qualified_name(&self) -> &str;

    /// Returns the static location of the code running in this frame.
    fn location(&self) -> &CodeLocation;

    /// Returns the current line of the frame.
    fn line(&self) -> u32;

    /// Returns a snapshot of the bindings visible from this frame.
    ///
    /// On a call, these are the arguments. On a line step, these are the
    /// local variables.
    fn bindings(&self) -> Bindings;
}
