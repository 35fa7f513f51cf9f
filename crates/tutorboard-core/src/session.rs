//! A whiteboard session: one document, one channel, one apply loop.
//!
//! Every input, local gesture or inbound channel event, goes through a
//! single queue and is applied in arrival order by [`WhiteboardSession::pump`].
//! Nothing else mutates the document.

use crate::collaboration::CollaborationController;
use crate::document::{ShapeDocument, ShapeOp};
use crate::report::{ErrorReporter, Incident, LogReporter};
use crate::settings::SessionSettings;
use crate::shapes::{Image, ImageFormat, SerializableColor, Shape, ShapeId, Text};
use crate::sync::{ChannelEvent, ChannelState, SyncChannel};
use crate::tools::{ToolController, ToolError, ToolKind, ToolStyle};
use kurbo::Point;
use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};

/// Where inserted LaTeX source lands.
const LATEX_ORIGIN: Point = Point::new(100.0, 100.0);
const LATEX_FONT_SIZE: f64 = 24.0;
const LATEX_FONT_FAMILY: &str = "Courier New";
/// Where inserted graphs land.
const GRAPH_ORIGIN: Point = Point::new(50.0, 50.0);

/// Inputs accepted by the apply loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    CancelGesture,
    SetTool(ToolKind),
    SetColor(SerializableColor),
    SetWidth(f64),
    SetFontSize(f64),
    /// Remove the topmost shape.
    Undo,
    /// Remove every shape.
    Clear,
    /// Place LaTeX source on the canvas as text.
    InsertLatex(String),
    /// Place a rendered graph (PNG or JPEG bytes) on the canvas.
    InsertGraph { data: Vec<u8>, width: u32, height: u32 },
    /// Inbound event from the sync channel.
    Channel(ChannelEvent),
}

/// Notifications for the embedding view.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected { peer_count: usize },
    Disconnected,
    ParticipantJoined { user_id: String },
    ParticipantLeft { user_id: String },
    ToolRejected(ToolError),
    ChannelError { message: String },
}

/// Cloneable sender for posting inputs from callbacks.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: Sender<SessionInput>,
}

impl SessionHandle {
    /// Queue an input. Returns false once the session has been left.
    pub fn post(&self, input: SessionInput) -> bool {
        self.tx.send(input).is_ok()
    }
}

/// Owns a session's document and everything allowed to change it.
pub struct WhiteboardSession {
    session_id: String,
    settings: SessionSettings,
    document: ShapeDocument,
    tools: ToolController,
    collab: CollaborationController,
    channel: Box<dyn SyncChannel>,
    tx: Sender<SessionInput>,
    /// `None` once the session has been left.
    rx: Option<Receiver<SessionInput>>,
    events: Vec<SessionEvent>,
    participants: BTreeSet<String>,
}

impl WhiteboardSession {
    pub fn new(
        session_id: &str,
        user_id: &str,
        settings: SessionSettings,
        channel: Box<dyn SyncChannel>,
    ) -> Self {
        Self::with_reporter(session_id, user_id, settings, channel, Box::new(LogReporter))
    }

    pub fn with_reporter(
        session_id: &str,
        user_id: &str,
        settings: SessionSettings,
        channel: Box<dyn SyncChannel>,
        reporter: Box<dyn ErrorReporter>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        log::info!("Joining session {} as {}", session_id, user_id);
        Self {
            session_id: session_id.to_string(),
            tools: ToolController::new(ToolStyle::from_settings(&settings)),
            settings,
            document: ShapeDocument::new(),
            collab: CollaborationController::with_reporter(user_id, reporter),
            channel,
            tx,
            rx: Some(rx),
            events: Vec::new(),
            participants: BTreeSet::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        self.collab.local_user_id()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn document(&self) -> &ShapeDocument {
        &self.document
    }

    pub fn tools(&self) -> &ToolController {
        &self.tools
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle { tx: self.tx.clone() }
    }

    /// Queue an input on this session's own queue.
    pub fn post(&self, input: SessionInput) -> bool {
        self.rx.is_some() && self.tx.send(input).is_ok()
    }

    /// Other participants currently known to be in the session.
    pub fn participants(&self) -> impl Iterator<Item = &str> + '_ {
        self.participants.iter().map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Whether the view should repaint; resets the flag.
    pub fn take_redraw(&mut self) -> bool {
        self.document.take_redraw()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pull channel events into the queue, then apply everything queued in
    /// order. Returns the number of inputs applied.
    pub fn pump(&mut self) -> usize {
        if self.rx.is_none() {
            return 0;
        }
        for event in self.channel.poll() {
            let _ = self.tx.send(SessionInput::Channel(event));
        }

        let mut applied = 0;
        while let Some(input) = self.rx.as_ref().and_then(|rx| rx.try_recv().ok()) {
            self.apply(input);
            self.flush_outgoing();
            applied += 1;
        }
        applied
    }

    /// Tear down: unsubscribe first, then discard whatever is still queued.
    pub fn leave(&mut self) {
        if self.rx.is_none() {
            return;
        }
        self.channel.unsubscribe();
        if let Some(rx) = self.rx.take() {
            let discarded = rx.try_iter().count();
            if discarded > 0 {
                log::debug!("Discarded {} queued inputs on leave", discarded);
            }
        }
        self.participants.clear();
        log::info!("Left session {}", self.session_id);
    }

    fn apply(&mut self, input: SessionInput) {
        match input {
            SessionInput::PointerDown(point) => {
                let op = self.tools.pointer_down(&self.document, point);
                self.mutate(op);
            }
            SessionInput::PointerMove(point) => {
                let op = self.tools.pointer_move(point);
                self.mutate(op);
            }
            SessionInput::PointerUp(point) => {
                // Land the final position before disarming
                let last = self.tools.pointer_move(point);
                self.mutate(last);
                let op = self.tools.pointer_up(&self.document);
                self.mutate(op);
            }
            SessionInput::CancelGesture => {
                let op = self.tools.cancel();
                self.mutate(op);
            }
            SessionInput::SetTool(tool) => {
                if let Err(e) = self.tools.set_tool(tool) {
                    log::debug!("{}", e);
                    self.events.push(SessionEvent::ToolRejected(e));
                }
            }
            SessionInput::SetColor(color) => self.tools.set_color(color),
            SessionInput::SetWidth(width) => self.tools.set_width(width),
            SessionInput::SetFontSize(size) => self.tools.set_font_size(size),
            SessionInput::Undo => {
                if !self.tools.is_idle() {
                    log::debug!("Ignoring undo during a gesture");
                    return;
                }
                let top: Option<ShapeId> = self.document.last().map(|s| s.id().clone());
                self.mutate(top.map(ShapeOp::Remove));
            }
            SessionInput::Clear => {
                // A provisional shape is wiped with everything else
                self.tools.cancel();
                self.mutate(Some(ShapeOp::Clear));
            }
            SessionInput::InsertLatex(source) => {
                let mut text = Text::new(LATEX_ORIGIN, source);
                text.font_size = LATEX_FONT_SIZE;
                text.font_family = LATEX_FONT_FAMILY.to_string();
                text.style.stroke_color = self.tools.style().color;
                self.mutate(Some(ShapeOp::Insert(Shape::Text(text))));
            }
            SessionInput::InsertGraph { data, width, height } => {
                let Some(format) = ImageFormat::from_magic_bytes(&data) else {
                    log::warn!("Ignoring graph image in an unsupported format");
                    return;
                };
                let image = Image::new(GRAPH_ORIGIN, &data, width, height, format);
                self.mutate(Some(ShapeOp::Insert(Shape::Image(image))));
            }
            SessionInput::Channel(event) => self.apply_channel_event(event),
        }
    }

    fn apply_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Change(change) => {
                self.collab.on_remote_event(&mut self.document, &change);
            }
            ChannelEvent::Connected { peer_count } => {
                self.events.push(SessionEvent::Connected { peer_count });
            }
            ChannelEvent::Disconnected => {
                log::warn!("Session {} lost its channel; editing continues locally", self.session_id);
                self.participants.clear();
                self.events.push(SessionEvent::Disconnected);
            }
            ChannelEvent::PeerJoined { user_id } => {
                self.participants.insert(user_id.clone());
                self.events.push(SessionEvent::ParticipantJoined { user_id });
            }
            ChannelEvent::PeerLeft { user_id } => {
                self.participants.remove(&user_id);
                self.events.push(SessionEvent::ParticipantLeft { user_id });
            }
            ChannelEvent::Error { message } => {
                log::warn!("Channel error: {}", message);
                self.events.push(SessionEvent::ChannelError { message });
            }
        }
    }

    fn mutate(&mut self, op: Option<ShapeOp>) {
        if let Some(op) = op {
            // Failures are reported by the controller
            let _ = self.collab.on_local_mutation(&mut self.document, op);
        }
    }

    fn flush_outgoing(&mut self) {
        for event in self.collab.take_outgoing() {
            if let Err(e) = self.channel.publish(&event) {
                self.collab.report(&Incident::PublishFailed {
                    reason: format!("{:?} event: {}", event.kind, e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeEvent, ChangeKind};
    use crate::report::RecordingReporter;
    use crate::shapes::ShapeKind;
    use crate::sync::{ChannelError, MemoryHub};
    use kurbo::Rect;

    fn session(hub: &MemoryHub, user: &str) -> WhiteboardSession {
        WhiteboardSession::new(
            "math-101",
            user,
            SessionSettings::default(),
            Box::new(hub.subscribe("math-101", user)),
        )
    }

    fn draw_rect(session: &WhiteboardSession, from: Point, to: Point) {
        session.post(SessionInput::SetTool(ToolKind::Rectangle));
        session.post(SessionInput::PointerDown(from));
        session.post(SessionInput::PointerMove(to));
        session.post(SessionInput::PointerUp(to));
    }

    fn snapshot(session: &WhiteboardSession) -> Vec<Shape> {
        session.document().list().cloned().collect()
    }

    /// Channel that accepts nothing.
    struct OfflineChannel;

    impl SyncChannel for OfflineChannel {
        fn publish(&mut self, _event: &ChangeEvent) -> Result<(), ChannelError> {
            Err(ChannelError::NotConnected)
        }

        fn poll(&mut self) -> Vec<ChannelEvent> {
            Vec::new()
        }

        fn unsubscribe(&mut self) {}

        fn state(&self) -> ChannelState {
            ChannelState::Disconnected
        }
    }

    #[test]
    fn test_two_sessions_converge() {
        let hub = MemoryHub::new();
        let mut alice = session(&hub, "alice");
        let mut bob = session(&hub, "bob");
        alice.pump();
        bob.pump();

        draw_rect(&alice, Point::new(10.0, 10.0), Point::new(50.0, 50.0));
        alice.pump();
        bob.pump();

        assert_eq!(snapshot(&alice), snapshot(&bob));
        assert_eq!(bob.document().len(), 1);
        assert_eq!(
            bob.document().last().unwrap().bounds(),
            Rect::new(10.0, 10.0, 50.0, 50.0)
        );

        bob.post(SessionInput::Undo);
        bob.pump();
        alice.pump();
        assert!(alice.document().is_empty());
        assert!(bob.document().is_empty());
    }

    #[test]
    fn test_echoing_channel_does_not_duplicate() {
        let hub = MemoryHub::new();
        let mut alice = WhiteboardSession::new(
            "math-101",
            "alice",
            SessionSettings::default(),
            Box::new(hub.subscribe_with_echo("math-101", "alice")),
        );
        draw_rect(&alice, Point::ZERO, Point::new(20.0, 20.0));
        alice.pump();
        let before = snapshot(&alice);
        // Our own events come back on the next pump and must be dropped
        alice.pump();
        assert_eq!(snapshot(&alice), before);
        assert_eq!(alice.document().len(), 1);
    }

    #[test]
    fn test_leave_discards_queued_inputs() {
        let hub = MemoryHub::new();
        let mut alice = session(&hub, "alice");
        let mut bob = session(&hub, "bob");
        alice.pump();

        let handle = alice.handle();
        draw_rect(&bob, Point::ZERO, Point::new(20.0, 20.0));
        bob.pump();
        assert!(handle.post(SessionInput::InsertLatex("x^2".to_string())));

        alice.leave();
        assert_eq!(alice.pump(), 0);
        assert!(alice.document().is_empty());
        assert!(!handle.post(SessionInput::Clear));
        assert!(!alice.is_active());
        assert_eq!(hub.subscriber_count("math-101"), 1);
    }

    #[test]
    fn test_switching_tool_mid_gesture_is_rejected() {
        let hub = MemoryHub::new();
        let mut alice = session(&hub, "alice");
        alice.post(SessionInput::SetTool(ToolKind::Line));
        alice.post(SessionInput::PointerDown(Point::ZERO));
        alice.post(SessionInput::SetTool(ToolKind::Pen));
        alice.pump();

        assert!(alice
            .take_events()
            .contains(&SessionEvent::ToolRejected(ToolError::GestureInProgress(ToolKind::Line))));
        assert_eq!(alice.tools().current_tool(), ToolKind::Line);
    }

    #[test]
    fn test_insert_latex_and_graph() {
        let hub = MemoryHub::new();
        let mut alice = session(&hub, "alice");
        alice.post(SessionInput::InsertLatex("\\frac{a}{b}".to_string()));
        alice.post(SessionInput::InsertGraph {
            data: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            width: 400,
            height: 300,
        });
        alice.post(SessionInput::InsertGraph {
            data: b"not an image".to_vec(),
            width: 1,
            height: 1,
        });
        alice.pump();

        let shapes = snapshot(&alice);
        assert_eq!(shapes.len(), 2);
        let Shape::Text(text) = &shapes[0] else {
            panic!("expected text");
        };
        assert_eq!(text.position, LATEX_ORIGIN);
        assert_eq!(text.font_size, 24.0);
        assert_eq!(text.font_family, "Courier New");
        assert_eq!(shapes[1].kind(), ShapeKind::Image);
        assert_eq!(shapes[1].bounds().origin(), GRAPH_ORIGIN);
    }

    #[test]
    fn test_clear_publishes_clear() {
        let hub = MemoryHub::new();
        let mut alice = session(&hub, "alice");
        let mut watcher = hub.subscribe("math-101", "watcher");
        draw_rect(&alice, Point::ZERO, Point::new(5.0, 5.0));
        alice.post(SessionInput::Clear);
        alice.pump();

        let kinds: Vec<ChangeKind> = watcher
            .poll()
            .into_iter()
            .filter_map(|e| match e {
                ChannelEvent::Change(change) => Some(change.kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds.first(), Some(&ChangeKind::Add));
        assert_eq!(kinds.last(), Some(&ChangeKind::Clear));
        assert!(alice.document().is_empty());
    }

    #[test]
    fn test_participants_tracked() {
        let hub = MemoryHub::new();
        let mut alice = session(&hub, "alice");
        let bob = session(&hub, "bob");
        alice.pump();
        assert_eq!(alice.participants().collect::<Vec<_>>(), vec!["bob"]);

        drop(bob);
        alice.pump();
        assert_eq!(alice.participants().count(), 0);
        let events = alice.take_events();
        assert!(events.contains(&SessionEvent::ParticipantLeft {
            user_id: "bob".to_string()
        }));
    }

    #[test]
    fn test_offline_editing_continues_and_reports() {
        let reporter = RecordingReporter::new();
        let mut alice = WhiteboardSession::with_reporter(
            "math-101",
            "alice",
            SessionSettings::default(),
            Box::new(OfflineChannel),
            Box::new(reporter.clone()),
        );
        draw_rect(&alice, Point::ZERO, Point::new(5.0, 5.0));
        alice.pump();

        assert_eq!(alice.document().len(), 1);
        let incidents = reporter.incidents();
        assert!(!incidents.is_empty());
        assert!(incidents
            .iter()
            .all(|i| matches!(i, Incident::PublishFailed { .. })));
    }

    #[test]
    fn test_pen_uses_session_settings() {
        let hub = MemoryHub::new();
        let settings = SessionSettings {
            background: SerializableColor::new(10, 20, 30, 255),
            ..SessionSettings::default()
        };
        let mut alice = WhiteboardSession::new(
            "math-101",
            "alice",
            settings,
            Box::new(hub.subscribe("math-101", "alice")),
        );
        alice.post(SessionInput::SetTool(ToolKind::Eraser));
        alice.post(SessionInput::PointerDown(Point::ZERO));
        alice.post(SessionInput::PointerUp(Point::new(3.0, 3.0)));
        alice.pump();

        let shape = alice.document().last().unwrap();
        assert_eq!(shape.style().stroke_color, SerializableColor::new(10, 20, 30, 255));
    }
}
