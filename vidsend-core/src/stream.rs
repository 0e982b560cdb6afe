//! Stream identifiers and per-stream state tables

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SendPathError, SendPathResult};

/// Identifier of one independently-rated encoded output (an SSRC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(ssrc: u32) -> Self {
        Self(ssrc)
    }
}

/// Fixed-capacity table holding one value per stream
///
/// The key set is fixed when the table is built and never grows or shrinks.
/// Entries keep declaration order, which is also the simulcast layer order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTable<T> {
    entries: Box<[(StreamId, T)]>,
}

impl<T> StreamTable<T> {
    /// Build a table for `ids`, initialising each slot with `init`
    ///
    /// Fails when `ids` is empty or contains duplicates.
    pub fn new<F>(ids: &[StreamId], mut init: F) -> SendPathResult<Self>
    where
        F: FnMut(StreamId) -> T,
    {
        if ids.is_empty() {
            return Err(SendPathError::Initialization {
                reason: "at least one stream id is required".to_string(),
            });
        }
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(SendPathError::Initialization {
                    reason: format!("duplicate stream id {}", id),
                });
            }
        }

        let entries = ids.iter().map(|&id| (id, init(id))).collect();
        Ok(Self { entries })
    }

    /// Number of streams
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; tables hold at least one stream
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Layer index of a stream
    pub fn index_of(&self, id: StreamId) -> Option<usize> {
        self.entries.iter().position(|(entry_id, _)| *entry_id == id)
    }

    /// Value for a stream
    pub fn get(&self, id: StreamId) -> SendPathResult<&T> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, value)| value)
            .ok_or(SendPathError::UnknownStream { stream_id: id })
    }

    /// Mutable value for a stream
    pub fn get_mut(&mut self, id: StreamId) -> SendPathResult<&mut T> {
        self.entries
            .iter_mut()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, value)| value)
            .ok_or(SendPathError::UnknownStream { stream_id: id })
    }

    /// Stream ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &T)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Mutable entries in declaration order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (StreamId, &mut T)> {
        self.entries.iter_mut().map(|(id, value)| (*id, value))
    }

    /// Map every value, keeping the key set
    pub fn map<U, F>(&self, mut f: F) -> StreamTable<U>
    where
        F: FnMut(StreamId, &T) -> U,
    {
        StreamTable {
            entries: self.entries.iter().map(|(id, value)| (*id, f(*id, value))).collect(),
        }
    }
}
