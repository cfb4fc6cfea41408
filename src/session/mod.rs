pub mod codec;
pub mod connection;
pub mod heart_rate;
pub mod manager;
pub mod observer;
pub mod participant;
pub mod protocol;

pub use connection::ParticipantLink;
pub use heart_rate::HeartRateMonitor;
pub use manager::{SessionManager, SessionPhase};
pub use observer::{LogObserver, SessionObserver};
pub use participant::Participant;
pub use protocol::{ControlMessage, MessageType, ProtocolError};
