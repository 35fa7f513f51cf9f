//! The shape document: ordered, uniquely identified shapes for one session.

use crate::shapes::{Shape, ShapeId, ShapeKind, ShapePatch};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from document mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("Shape already exists: {0}")]
    DuplicateId(ShapeId),
    #[error("Shape not found: {0}")]
    NotFound(ShapeId),
    #[error("Patch does not fit {kind} shape {id}")]
    PatchMismatch { id: ShapeId, kind: ShapeKind },
}

/// Errors loading or saving a JSON snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Snapshot contains shape {0} more than once")]
    DuplicateId(ShapeId),
}

/// A single document mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeOp {
    Insert(Shape),
    Update { id: ShapeId, patch: ShapePatch },
    Remove(ShapeId),
    Clear,
}

/// On-disk form: shapes in paint order.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    shapes: Vec<Shape>,
}

/// Ordered collection of shapes with an id index.
///
/// `order` and `index` always hold exactly the same ids, each once.
/// Paint order is insertion order, later shapes on top.
#[derive(Debug, Clone, Default)]
pub struct ShapeDocument {
    order: Vec<ShapeId>,
    index: HashMap<ShapeId, Shape>,
    needs_redraw: bool,
}

impl ShapeDocument {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shape on top of the others.
    pub fn insert(&mut self, shape: Shape) -> Result<(), DocumentError> {
        let id = shape.id().clone();
        if self.index.contains_key(&id) {
            return Err(DocumentError::DuplicateId(id));
        }
        self.order.push(id.clone());
        self.index.insert(id, shape);
        self.needs_redraw = true;
        Ok(())
    }

    /// Merge a partial change into an existing shape, keeping its id and place.
    pub fn update(&mut self, id: &ShapeId, patch: &ShapePatch) -> Result<(), DocumentError> {
        let shape = self
            .index
            .get_mut(id)
            .ok_or_else(|| DocumentError::NotFound(id.clone()))?;
        shape
            .apply_patch(patch)
            .map_err(|kind| DocumentError::PatchMismatch {
                id: id.clone(),
                kind,
            })?;
        self.needs_redraw = true;
        Ok(())
    }

    /// Overwrite an existing shape wholesale, keeping its place.
    pub fn replace(&mut self, shape: Shape) -> Result<(), DocumentError> {
        let slot = self
            .index
            .get_mut(shape.id())
            .ok_or_else(|| DocumentError::NotFound(shape.id().clone()))?;
        *slot = shape;
        self.needs_redraw = true;
        Ok(())
    }

    /// Remove a shape. Absent ids are ignored.
    pub fn remove(&mut self, id: &ShapeId) -> Option<Shape> {
        let removed = self.index.remove(id)?;
        self.order.retain(|shape_id| shape_id != id);
        self.needs_redraw = true;
        Some(removed)
    }

    /// Remove every shape.
    pub fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
        self.needs_redraw = true;
    }

    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.index.get(id)
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.index.contains_key(id)
    }

    /// Shapes in insertion order (back to front).
    pub fn list(&self) -> impl Iterator<Item = &Shape> + '_ {
        self.order.iter().filter_map(|id| self.index.get(id))
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> &[ShapeId] {
        &self.order
    }

    /// Topmost shape.
    pub fn last(&self) -> Option<&Shape> {
        self.order.last().and_then(|id| self.index.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Find shapes at a point, front to back.
    pub fn shapes_at_point(&self, point: Point, tolerance: f64) -> Vec<ShapeId> {
        self.order
            .iter()
            .rev()
            .filter(|id| {
                self.index
                    .get(*id)
                    .is_some_and(|s| s.hit_test(point, tolerance))
            })
            .cloned()
            .collect()
    }

    /// Get the bounding box of all shapes.
    pub fn bounds(&self) -> Option<Rect> {
        self.list()
            .map(Shape::bounds)
            .reduce(|acc, bounds| acc.union(bounds))
    }

    /// Whether anything changed since the last call; resets the flag.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        let snapshot = Snapshot {
            shapes: self.list().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Deserialize a document from JSON, rebuilding the index.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        let mut doc = Self::new();
        for shape in snapshot.shapes {
            let id = shape.id().clone();
            if doc.index.contains_key(&id) {
                return Err(SnapshotError::DuplicateId(id));
            }
            doc.order.push(id.clone());
            doc.index.insert(id, shape);
        }
        doc.needs_redraw = true;
        Ok(doc)
    }
}
