//! Tutorboard Core Library
//!
//! Shape document, drawing tools and the canvas synchronization protocol for
//! the Tutorboard collaborative whiteboard. Rendering lives in
//! `tutorboard-render`; the relay server in `tutorboard-server`.

pub mod collaboration;
pub mod document;
pub mod event;
pub mod report;
pub mod session;
pub mod settings;
pub mod shapes;
pub mod sync;
pub mod tools;

pub use collaboration::CollaborationController;
pub use document::{DocumentError, ShapeDocument, ShapeOp, SnapshotError};
pub use event::{ChangeEvent, ChangeKind, EventError, RemoteChange};
pub use report::{ErrorReporter, Incident, LogReporter, Origin, RecordingReporter};
pub use session::{SessionEvent, SessionHandle, SessionInput, WhiteboardSession};
pub use settings::SessionSettings;
pub use shapes::{Shape, ShapeId, ShapeKind, ShapeStyle};
pub use sync::{ChannelError, ChannelEvent, ChannelState, MemoryHub, RelayChannel, SyncChannel};
pub use tools::{Gesture, ToolController, ToolError, ToolKind, ToolStyle};
