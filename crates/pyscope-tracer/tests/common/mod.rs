mod publisher;

pub use self::publisher::{RecordingPublisher, Recorded};
pub use self::runtime::{MockFrame, MockRuntime, ScriptedEvents};
