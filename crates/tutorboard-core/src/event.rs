//! Wire-level change events exchanged between collaborators.

use crate::shapes::{Shape, ShapeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What an event does to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Modify,
    Remove,
    Clear,
}

/// One shape-level mutation as carried on the sync channel.
///
/// The payload stays raw JSON until it is applied, so one bad event can be
/// rejected without affecting the rest of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ShapeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub origin_user_id: String,
}

/// Why an inbound event could not be applied.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{0:?} event has no id")]
    MissingId(ChangeKind),
    #[error("{0:?} event has no payload")]
    MissingPayload(ChangeKind),
    #[error("Invalid shape payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Payload id {payload} does not match event id {event}")]
    IdMismatch { event: ShapeId, payload: ShapeId },
}

/// A decoded, validated change ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    Add(Shape),
    Modify(Shape),
    Remove(ShapeId),
    Clear,
}

impl ChangeEvent {
    pub fn add(shape: &Shape, origin_user_id: &str) -> Result<Self, serde_json::Error> {
        Self::with_shape(ChangeKind::Add, shape, origin_user_id)
    }

    pub fn modify(shape: &Shape, origin_user_id: &str) -> Result<Self, serde_json::Error> {
        Self::with_shape(ChangeKind::Modify, shape, origin_user_id)
    }

    pub fn remove(id: ShapeId, origin_user_id: &str) -> Self {
        Self {
            kind: ChangeKind::Remove,
            id: Some(id),
            payload: None,
            origin_user_id: origin_user_id.to_string(),
        }
    }

    pub fn clear(origin_user_id: &str) -> Self {
        Self {
            kind: ChangeKind::Clear,
            id: None,
            payload: None,
            origin_user_id: origin_user_id.to_string(),
        }
    }

    fn with_shape(kind: ChangeKind, shape: &Shape, origin_user_id: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind,
            id: Some(shape.id().clone()),
            payload: Some(serde_json::to_value(shape)?),
            origin_user_id: origin_user_id.to_string(),
        })
    }

    /// Validate the event and decode its payload.
    pub fn decode(&self) -> Result<RemoteChange, EventError> {
        match self.kind {
            ChangeKind::Add => self.decode_shape().map(RemoteChange::Add),
            ChangeKind::Modify => self.decode_shape().map(RemoteChange::Modify),
            ChangeKind::Remove => self
                .id
                .clone()
                .map(RemoteChange::Remove)
                .ok_or(EventError::MissingId(self.kind)),
            ChangeKind::Clear => Ok(RemoteChange::Clear),
        }
    }

    fn decode_shape(&self) -> Result<Shape, EventError> {
        let id = self.id.as_ref().ok_or(EventError::MissingId(self.kind))?;
        let payload = self
            .payload
            .as_ref()
            .ok_or(EventError::MissingPayload(self.kind))?;
        let shape = Shape::deserialize(payload)?;
        if shape.id() != id {
            return Err(EventError::IdMismatch {
                event: id.clone(),
                payload: shape.id().clone(),
            });
        }
        Ok(shape)
    }
}
