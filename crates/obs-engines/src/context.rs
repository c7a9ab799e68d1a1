//! Explicitly constructed engine context.
//!
//! The context owns identifier generation for engine instances and backend
//! objects. There is no process-wide state: every factory receives its
//! context, and identifiers from different contexts never collide because
//! each context draws a fresh session UUID.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineId {
    session: Uuid,
    serial: u64,
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.serial)
    }
}

/// Identity of one backend object (group, variable or attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    engine: EngineId,
    serial: u64,
}

impl ObjectId {
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.engine, self.serial)
    }
}

/// Identifier generator shared by every engine built from one factory.
#[derive(Debug)]
pub struct EngineContext {
    session: Uuid,
    counter: AtomicU64,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineContext {
    pub fn new() -> Self {
        Self {
            session: Uuid::new_v4(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn next_engine_id(&self) -> EngineId {
        EngineId {
            session: self.session,
            serial: self.counter.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn next_object_id(&self, engine: EngineId) -> ObjectId {
        ObjectId {
            engine,
            serial: self.counter.fetch_add(1, Ordering::Relaxed),
        }
    }
}
