// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types.
//!
//! Most of what could go wrong in this crate is a programmer error (using a
//! dead entity, relating something to itself in a tree relation, asking for
//! a component an entity doesn't have via an infallible getter) and panics
//! rather than returning a `Result` — there's no caller that could
//! meaningfully recover from those short of not having made the mistake.
//! `EcsError` is reserved for the handful of genuinely recoverable outcomes:
//! a command replayed from a [`crate::command::CommandBuffer`] failing on
//! its own terms, and capacity exhaustion.

use std::fmt;

/// Recoverable failure modes. Structural queries that can legitimately come
/// back empty (`remove` of an absent component, `unrelate` of an absent
/// edge) return `bool`/`Option` instead of this type — they aren't errors.
#[derive(Debug, Clone)]
pub enum EcsError {
    /// A command replayed by [`crate::command::CommandBuffer::commit`]
    /// targeted an entity that was dead by the time the buffer was applied.
    DeadEntity,

    /// A command replayed by `CommandBuffer::commit` referenced a
    /// `DataTypeId` never registered with the world it was applied to.
    UnregisteredType,

    /// Entity index space exhausted (would require more than `u32::MAX`
    /// live entities at once).
    EntityCapacityExhausted { attempted: usize, capacity: usize },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::DeadEntity => write!(f, "command targeted a dead entity"),
            EcsError::UnregisteredType => write!(f, "command referenced an unregistered type"),
            EcsError::EntityCapacityExhausted { attempted, capacity } => {
                write!(f, "entity capacity exhausted: attempted {attempted}, max is {capacity}")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias.
pub type Result<T> = std::result::Result<T, EcsError>;
