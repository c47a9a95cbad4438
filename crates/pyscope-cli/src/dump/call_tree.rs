use indexmap::IndexMap;
use kdl::{KdlDocument, KdlEntry, KdlNode};
use pyscope_tracer::event::{Bindings, Event, EventKind, FrameId};

/// Dumps the events of a session as one call tree per thread.
pub fn dump_to_kdl(events: &[Event]) -> KdlDocument {
    let mut threads = IndexMap::<u64, CallTree>::new();

    for event in events {
        threads.entry(event.thread_id).or_default().push(event);
    }

    let mut kdl = KdlDocument::new();

    for (thread_id, tree) in threads {
        let mut node = KdlNode::new("thread");
        node.entries_mut().push(i128::from(thread_id).into());
        node.ensure_children().nodes_mut().extend(tree.finish());

        kdl.nodes_mut().push(node);
    }

    kdl
}

#[derive(Default)]
struct CallTree {
    roots: Vec<KdlNode>,
    stack: Vec<(FrameId, KdlNode)>,
}

impl CallTree {
    fn push(&mut self, event: &Event) {
        match &event.kind {
            EventKind::Call {
                function,
                file,
                line,
                arguments,
            } => {
                let mut node = KdlNode::new("call");

                node.entries_mut().extend([
                    KdlEntry::new(function.as_str()),
                    KdlEntry::new_prop("frame", event.frame_id.to_string()),
                    KdlEntry::new_prop("file", file.as_str()),
                    KdlEntry::new_prop("line", i128::from(*line)),
                    KdlEntry::new_prop("at_us", i128::from(event.timestamp_us)),
                ]);

                if !arguments.is_empty() {
                    node.ensure_children()
                        .nodes_mut()
                        .push(bindings_node("arguments", arguments));
                }

                self.stack.push((event.frame_id, node));
            }
            EventKind::Line { line, locals, .. } => {
                let mut node = KdlNode::new("line");
                node.entries_mut().push(i128::from(*line).into());

                if !locals.is_empty() {
                    node.ensure_children()
                        .nodes_mut()
                        .push(bindings_node("locals", locals));
                }

                match self.stack.last_mut() {
                    Some((frame_id, parent)) if *frame_id == event.frame_id => {
                        parent.ensure_children().nodes_mut().push(node);
                    }
                    _ => self.roots.push(node),
                }
            }
            EventKind::Return { value } => {
                let mut node = KdlNode::new("return");
                node.entries_mut().push(value.as_str().into());

                self.terminate(event.frame_id, node);
            }
            EventKind::Exception { type_name, message } => {
                let mut node = KdlNode::new("raise");
                node.entries_mut()
                    .extend([KdlEntry::new(type_name.as_str()), KdlEntry::new(message.as_str())]);

                self.terminate(event.frame_id, node);
            }
        }
    }

    fn terminate(&mut self, frame_id: FrameId, terminal: KdlNode) {
        if !self.stack.iter().any(|(id, _)| *id == frame_id) {
            self.roots.push(terminal);
            return;
        }

        while let Some((id, mut node)) = self.stack.pop() {
            if id == frame_id {
                node.ensure_children().nodes_mut().push(terminal);
                self.attach(node);
                return;
            }
            self.attach(node);
        }
    }

    fn attach(&mut self, node: KdlNode) {
        match self.stack.last_mut() {
            Some((_, parent)) => parent.ensure_children().nodes_mut().push(node),
            None => self.roots.push(node),
        }
    }

    /// Calls still running (e.g., on detach) are kept unterminated.
    fn finish(mut self) -> Vec<KdlNode> {
        while let Some((_, node)) = self.stack.pop() {
            self.attach(node);
        }
        self.roots
    }
}

fn bindings_node(name: &str, bindings: &Bindings) -> KdlNode {
    let mut node = KdlNode::new(name);

    node.entries_mut().extend(
        bindings
            .iter()
            .map(|(name, value)| KdlEntry::new_prop(name.as_str(), value.as_str())),
    );

    node
}
