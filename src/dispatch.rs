//! Worker-thread → main-loop command queue.
//!
//! Producers (UDP receivers, TCP tasks) push typed commands; the main loop
//! drains the queue once per tick. A drain takes a snapshot of everything
//! queued at that moment, anything enqueued afterwards waits for the next tick.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use nalgebra::UnitQuaternion;

use crate::skeleton::Joint;

pub type ParticipantId = u32;

/// Everything a background thread may ask the main loop to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ParticipantJoined { id: ParticipantId },
    NameEntered { id: ParticipantId, name: String },
    AgeEntered { id: ParticipantId, age: u32 },
    HeightEntered { id: ParticipantId, height_m: f32 },
    HeartRate { id: ParticipantId, bpm: u32 },
    HeartRateBaseline { id: ParticipantId, bpm: f32 },
    ImuStreamOpened { id: ParticipantId, port: u16 },
    ImuRotations {
        id: ParticipantId,
        rotations: BTreeMap<Joint, UnitQuaternion<f32>>,
    },
    ParticipantLeft { id: ParticipantId },
}

impl Command {
    pub fn participant(&self) -> ParticipantId {
        match self {
            Command::ParticipantJoined { id }
            | Command::NameEntered { id, .. }
            | Command::AgeEntered { id, .. }
            | Command::HeightEntered { id, .. }
            | Command::HeartRate { id, .. }
            | Command::HeartRateBaseline { id, .. }
            | Command::ImuStreamOpened { id, .. }
            | Command::ImuRotations { id, .. }
            | Command::ParticipantLeft { id } => *id,
        }
    }
}

/// Cloneable handle to one shared FIFO.
pub struct Dispatcher<T = Command> {
    queue: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn dispatch(&self, item: T) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    /// Takes everything queued so far, in enqueue order.
    pub fn drain(&self) -> Vec<T> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
