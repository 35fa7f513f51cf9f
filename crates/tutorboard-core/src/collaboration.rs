//! Collaboration management for real-time multi-user editing.
//!
//! The controller is the only place that both turns local mutations into
//! outbound change events and applies inbound ones. Remote changes are
//! applied without ever being queued for publishing again.

use crate::document::{DocumentError, ShapeDocument, ShapeOp};
use crate::event::{ChangeEvent, RemoteChange};
use crate::report::{ErrorReporter, Incident, LogReporter, Origin};
use crate::shapes::{Shape, ShapeId};

/// Mirrors local edits outward and applies remote edits locally.
pub struct CollaborationController {
    local_user_id: String,
    /// Events waiting to be published, oldest first.
    outgoing: Vec<ChangeEvent>,
    reporter: Box<dyn ErrorReporter>,
}

impl CollaborationController {
    /// Create a controller that reports through the `log` facade.
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self::with_reporter(local_user_id, Box::new(LogReporter))
    }

    pub fn with_reporter(local_user_id: impl Into<String>, reporter: Box<dyn ErrorReporter>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            outgoing: Vec::new(),
            reporter,
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn report(&self, incident: &Incident) {
        self.reporter.report(incident);
    }

    /// Apply a user-driven mutation and queue exactly one event for it.
    ///
    /// A rejected mutation is reported and publishes nothing. Removing an
    /// absent shape changes nothing and publishes nothing.
    pub fn on_local_mutation(&mut self, doc: &mut ShapeDocument, op: ShapeOp) -> Result<(), DocumentError> {
        match op {
            ShapeOp::Insert(shape) => {
                let id = shape.id().clone();
                doc.insert(shape).inspect_err(|e| self.report_local(e))?;
                self.queue_shape(doc, &id, ChangeEvent::add);
            }
            ShapeOp::Update { id, patch } => {
                doc.update(&id, &patch).inspect_err(|e| self.report_local(e))?;
                self.queue_shape(doc, &id, ChangeEvent::modify);
            }
            ShapeOp::Remove(id) => {
                if doc.remove(&id).is_some() {
                    self.outgoing.push(ChangeEvent::remove(id, &self.local_user_id));
                }
            }
            ShapeOp::Clear => {
                doc.clear();
                self.outgoing.push(ChangeEvent::clear(&self.local_user_id));
            }
        }
        Ok(())
    }

    /// Apply one inbound event. Returns whether the document changed.
    ///
    /// Our own events are dropped. Bad or stale events are reported and
    /// dropped; nothing here ever queues an outbound event.
    pub fn on_remote_event(&mut self, doc: &mut ShapeDocument, event: &ChangeEvent) -> bool {
        if event.origin_user_id == self.local_user_id {
            log::trace!("Dropping echo of our own {:?} event", event.kind);
            return false;
        }

        let change = match event.decode() {
            Ok(change) => change,
            Err(e) => {
                self.reporter.report(&Incident::MalformedEvent {
                    reason: e.to_string(),
                });
                return false;
            }
        };

        let result = match change {
            RemoteChange::Add(shape) => doc.insert(shape),
            RemoteChange::Modify(shape) => doc.replace(shape),
            RemoteChange::Remove(id) => return doc.remove(&id).is_some(),
            RemoteChange::Clear => {
                doc.clear();
                return true;
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.reporter.report(&incident_for(&e, Origin::Remote));
                false
            }
        }
    }

    /// Drain the pending outbound events.
    pub fn take_outgoing(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue_shape(
        &mut self,
        doc: &ShapeDocument,
        id: &ShapeId,
        build: fn(&Shape, &str) -> Result<ChangeEvent, serde_json::Error>,
    ) {
        let Some(shape) = doc.get(id) else {
            return;
        };
        match build(shape, &self.local_user_id) {
            Ok(event) => self.outgoing.push(event),
            Err(e) => self.reporter.report(&Incident::PublishFailed {
                reason: format!("could not encode shape {id}: {e}"),
            }),
        }
    }

    fn report_local(&self, error: &DocumentError) {
        self.reporter.report(&incident_for(error, Origin::Local));
    }
}

fn incident_for(error: &DocumentError, origin: Origin) -> Incident {
    match error {
        DocumentError::DuplicateId(id) => Incident::DuplicateId {
            id: id.clone(),
            origin,
        },
        DocumentError::NotFound(id) => Incident::MissingTarget {
            id: id.clone(),
            origin,
        },
        DocumentError::PatchMismatch { id, kind } => Incident::InvalidPatch {
            id: id.clone(),
            kind: *kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use crate::report::RecordingReporter;
    use crate::shapes::{Circle, GeometryPatch, Rectangle, ShapePatch};
    use kurbo::{Point, Rect};
    use serde_json::json;

    fn controller(user: &str) -> (CollaborationController, RecordingReporter) {
        let reporter = RecordingReporter::new();
        let controller = CollaborationController::with_reporter(user, Box::new(reporter.clone()));
        (controller, reporter)
    }

    fn square(id: &str) -> Shape {
        Shape::Rectangle(Rectangle::with_id(id.into(), Point::new(10.0, 10.0), 40.0, 40.0))
    }

    #[test]
    fn test_local_insert_publishes_one_add() {
        let (mut collab, _) = controller("u1");
        let mut doc = ShapeDocument::new();
        collab
            .on_local_mutation(&mut doc, ShapeOp::Insert(square("s1")))
            .unwrap();

        let events = collab.take_outgoing();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Add);
        assert_eq!(events[0].id, Some("s1".into()));
        assert_eq!(events[0].origin_user_id, "u1");
        assert!(collab.take_outgoing().is_empty());
    }

    #[test]
    fn test_local_duplicate_is_reported_not_published() {
        let (mut collab, reporter) = controller("u1");
        let mut doc = ShapeDocument::new();
        collab.on_local_mutation(&mut doc, ShapeOp::Insert(square("s1"))).unwrap();
        collab.take_outgoing();

        let err = collab
            .on_local_mutation(&mut doc, ShapeOp::Insert(square("s1")))
            .unwrap_err();
        assert_eq!(err, DocumentError::DuplicateId("s1".into()));
        assert!(!collab.has_outgoing());
        assert_eq!(
            reporter.incidents(),
            vec![Incident::DuplicateId {
                id: "s1".into(),
                origin: Origin::Local
            }]
        );
    }

    #[test]
    fn test_local_update_publishes_full_shape() {
        let (mut collab, _) = controller("u1");
        let mut doc = ShapeDocument::new();
        collab.on_local_mutation(&mut doc, ShapeOp::Insert(square("s1"))).unwrap();
        collab.take_outgoing();

        let patch = ShapePatch::from_geometry(GeometryPatch::Frame(Rect::new(0.0, 0.0, 5.0, 5.0)));
        collab
            .on_local_mutation(&mut doc, ShapeOp::Update { id: "s1".into(), patch })
            .unwrap();
        let events = collab.take_outgoing();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Modify);
        assert_eq!(events[0].payload.as_ref().unwrap()["width"], 5.0);
    }

    #[test]
    fn test_local_remove_of_absent_publishes_nothing() {
        let (mut collab, _) = controller("u1");
        let mut doc = ShapeDocument::new();
        collab.on_local_mutation(&mut doc, ShapeOp::Remove("ghost".into())).unwrap();
        assert!(!collab.has_outgoing());
    }

    #[test]
    fn test_echo_is_suppressed() {
        let (mut sender, _) = controller("u1");
        let mut doc = ShapeDocument::new();
        sender.on_local_mutation(&mut doc, ShapeOp::Insert(square("s1"))).unwrap();
        let add = sender.take_outgoing().remove(0);

        let mut other = ShapeDocument::new();
        other.insert(square("keep")).unwrap();
        let before: Vec<_> = other.list().cloned().collect();
        for event in [add, ChangeEvent::remove("keep".into(), "u1"), ChangeEvent::clear("u1")] {
            assert!(!sender.on_remote_event(&mut other, &event));
        }
        let after: Vec<_> = other.list().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_remote_modify_of_missing_is_noop() {
        let (mut collab, reporter) = controller("u1");
        let mut doc = ShapeDocument::new();
        let event = ChangeEvent::modify(&square("s1"), "u2").unwrap();

        assert!(!collab.on_remote_event(&mut doc, &event));
        assert!(doc.is_empty());
        assert_eq!(
            reporter.incidents(),
            vec![Incident::MissingTarget {
                id: "s1".into(),
                origin: Origin::Remote
            }]
        );
    }

    #[test]
    fn test_remote_events_never_republished() {
        let (mut collab, _) = controller("u1");
        let mut doc = ShapeDocument::new();
        collab.on_remote_event(&mut doc, &ChangeEvent::add(&square("s1"), "u2").unwrap());
        collab.on_remote_event(&mut doc, &ChangeEvent::modify(&square("s1"), "u2").unwrap());
        collab.on_remote_event(&mut doc, &ChangeEvent::remove("s1".into(), "u2"));
        collab.on_remote_event(&mut doc, &ChangeEvent::clear("u2"));
        assert!(!collab.has_outgoing());
    }

    #[test]
    fn test_last_writer_wins() {
        let (mut collab, _) = controller("u1");
        let mut doc = ShapeDocument::new();
        collab.on_remote_event(&mut doc, &ChangeEvent::add(&square("s1"), "u2").unwrap());

        let x = Shape::Circle(Circle::with_id("s1".into(), Point::new(1.0, 1.0), 1.0));
        let y = Shape::Rectangle(Rectangle::with_id("s1".into(), Point::new(70.0, 80.0), 5.0, 6.0));
        collab.on_remote_event(&mut doc, &ChangeEvent::modify(&x, "u2").unwrap());
        collab.on_remote_event(&mut doc, &ChangeEvent::modify(&y, "u3").unwrap());

        assert_eq!(doc.get(&"s1".into()), Some(&y));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_malformed_event_dropped_and_stream_continues() {
        let (mut collab, reporter) = controller("u1");
        let mut doc = ShapeDocument::new();
        let bad: ChangeEvent = serde_json::from_value(json!({
            "type": "add",
            "id": "h1",
            "payload": {"kind": "hexagon", "id": "h1"},
            "originUserId": "u2"
        }))
        .unwrap();

        assert!(!collab.on_remote_event(&mut doc, &bad));
        assert!(collab.on_remote_event(&mut doc, &ChangeEvent::add(&square("s1"), "u2").unwrap()));
        assert_eq!(doc.len(), 1);
        assert!(matches!(
            reporter.incidents().as_slice(),
            [Incident::MalformedEvent { .. }]
        ));
    }

    #[test]
    fn test_remote_duplicate_add_keeps_existing() {
        let (mut collab, reporter) = controller("u1");
        let mut doc = ShapeDocument::new();
        doc.insert(square("s1")).unwrap();
        let other = Shape::Circle(Circle::with_id("s1".into(), Point::ZERO, 3.0));

        assert!(!collab.on_remote_event(&mut doc, &ChangeEvent::add(&other, "u2").unwrap()));
        assert_eq!(doc.get(&"s1".into()), Some(&square("s1")));
        assert_eq!(reporter.incidents().len(), 1);
    }
}
