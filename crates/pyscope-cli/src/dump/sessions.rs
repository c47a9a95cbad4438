use kdl::{KdlDocument, KdlEntry, KdlNode};
use pyscope_publisher::StoredSession;

pub fn dump_to_kdl(sessions: &[StoredSession]) -> KdlDocument {
    let mut kdl = KdlDocument::new();

    for session in sessions {
        let mut node = KdlNode::new("session");

        node.entries_mut().extend([
            KdlEntry::new(session.id.as_str()),
            KdlEntry::new_prop("target", session.target.as_str()),
            KdlEntry::new_prop("mode", session.mode.as_str()),
            KdlEntry::new_prop("started_at_us", i128::from(session.started_at_us)),
            KdlEntry::new_prop("events", i128::from(session.events)),
        ]);

        kdl.nodes_mut().push(node);
    }

    kdl
}
