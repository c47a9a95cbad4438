use pyscope_tracer::event::{Bindings, FrameId};
use pyscope_tracer::filter::CodeLocation;
use pyscope_tracer::runtime::FrameInspector;

use crate::layout::InterpreterLayout;
use crate::protocol::FrameRecord;

/// Python frame, as reported by the agent.
#[derive(Debug, Clone)]
pub struct PythonFrame {
    thread_id: u64,
    frame_id: FrameId,
    qualified_name: String,
    location: CodeLocation,
    line: u32,
    bindings: Bindings,
}

impl PythonFrame {
    pub(crate) fn new(record: FrameRecord, layout: &InterpreterLayout) -> Self {
        let area = layout.classify(&record.file);

        Self {
            thread_id: record.thread,
            frame_id: FrameId(record.frame),
            qualified_name: format!("{}.{}", record.module, record.qualname),
            location: CodeLocation {
                module: record.module,
                file: record.file,
                area,
            },
            line: record.line,
            bindings: record.bindings,
        }
    }
}

impl FrameInspector for PythonFrame {
    fn thread_id(&self) -> u64 {
        self.thread_id
    }

    fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    fn location(&self) -> &CodeLocation {
        &self.location
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn bindings(&self) -> Bindings {
        self.bindings.clone()
    }
}
