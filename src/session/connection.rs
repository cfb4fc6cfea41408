//! Per-participant TCP control connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{ControlLineCodec, InboundLine};
use super::protocol::{encode_line, ControlMessage, MessageType, ProtocolError};
use crate::dispatch::{Command, Dispatcher, ParticipantId};
use crate::imu::{ImuReceiver, Sensor};

const MAX_LINE_LENGTH: usize = 4096;

/// Main-thread handle for writing to a participant and tearing it down.
#[derive(Clone)]
pub struct ParticipantLink {
    id: ParticipantId,
    out_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl ParticipantLink {
    pub fn new(
        id: ParticipantId,
        out_tx: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            out_tx,
            cancel,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Queues `<TYPE>:<payload>\n`. Silently dropped once closed.
    pub fn send(&self, kind: MessageType, payload: &str) {
        if self.is_closed() {
            return;
        }
        if self.out_tx.send(encode_line(kind, payload)).is_err() {
            debug!(participant = self.id, "[tcp] {kind} not sent, connection gone");
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Per-connection state that lives on the read task.
struct ConnectionState {
    id: ParticipantId,
    dispatcher: Dispatcher,
    imu: Arc<Mutex<ImuReceiver>>,
    imu_streaming: bool,
}

impl ConnectionState {
    fn handle_line(&mut self, line: &str) {
        let msg = match ControlMessage::parse(line) {
            Ok(msg) => msg,
            Err(ProtocolError::Empty) => return,
            Err(e) => {
                debug!(participant = self.id, "[tcp] dropped line: {e}");
                return;
            }
        };

        let id = self.id;
        let kind = msg.message_type();
        match msg {
            ControlMessage::Name(name) => self.dispatcher.dispatch(Command::NameEntered { id, name }),
            ControlMessage::Age(age) => self.dispatcher.dispatch(Command::AgeEntered { id, age }),
            ControlMessage::Height(height_m) => {
                self.dispatcher.dispatch(Command::HeightEntered { id, height_m })
            }
            ControlMessage::HeartRate(bpm) => self.dispatcher.dispatch(Command::HeartRate { id, bpm }),
            ControlMessage::HeartRateBaseline(bpm) => {
                self.dispatcher.dispatch(Command::HeartRateBaseline { id, bpm })
            }
            ControlMessage::ImuConfig(port) => self.open_imu(port),
            ControlMessage::SessionStart | ControlMessage::SessionEnd => {
                debug!(participant = id, "[tcp] ignoring outbound-only {kind}");
            }
        }
    }

    fn open_imu(&mut self, port: u16) {
        if self.imu_streaming {
            debug!(participant = self.id, "[tcp] IMU already streaming, IMU_CONFIG:{port} ignored");
            return;
        }
        let mut imu = self.imu.lock().unwrap_or_else(PoisonError::into_inner);
        match imu.connect(port) {
            Ok(_) => self.imu_streaming = true,
            Err(e) => warn!(participant = self.id, "[imu] {e:#}"),
        }
    }
}

/// Reads control lines until EOF, a transport error or `cancel`, while
/// forwarding queued outbound lines. Malformed lines are dropped. Always ends
/// with a `ParticipantLeft` dispatch.
pub async fn connection_loop(
    id: ParticipantId,
    stream: TcpStream,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
    imu: Arc<Mutex<ImuReceiver>>,
) {
    let framed = Framed::new(stream, ControlLineCodec::new(MAX_LINE_LENGTH));
    let (mut sink, mut reader) = framed.split();
    let mut state = ConnectionState {
        id,
        dispatcher: dispatcher.clone(),
        imu,
        imu_streaming: false,
    };

    loop {
        tokio::select! {
            biased;
            Some(line) = out_rx.recv() => {
                if let Err(e) = sink.send(line).await {
                    warn!(participant = id, "[tcp] send failed: {e}");
                    break;
                }
            }
            _ = cancel.cancelled() => break,
            result = reader.next() => match result {
                Some(Ok(InboundLine::Text(line))) => state.handle_line(&line),
                Some(Ok(InboundLine::Rejected(defect))) => {
                    debug!(participant = id, "[tcp] dropped line: {defect:?}");
                }
                Some(Err(e)) => {
                    warn!(participant = id, "[tcp] read failed: {e}");
                    break;
                }
                None => {
                    info!(participant = id, "[tcp] peer closed connection");
                    break;
                }
            },
        }
    }

    // lines queued just before close (SESSION_END) still go out
    while let Ok(line) = out_rx.try_recv() {
        if sink.send(line).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
    dispatcher.dispatch(Command::ParticipantLeft { id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_after_close_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = ParticipantLink::new(1, tx, CancellationToken::new());
        link.send(MessageType::SessionStart, "");
        link.close();
        link.send(MessageType::SessionEnd, "");
        assert_eq!(rx.try_recv().unwrap(), "SESSION_START:");
        assert!(rx.try_recv().is_err());
        assert!(link.is_closed());
    }

    #[test]
    fn test_handle_line_dispatches_and_ignores() {
        let dispatcher = Dispatcher::new();
        let imu = ImuReceiver::new(0, Default::default(), Duration::from_millis(50), dispatcher.clone());
        let mut state = ConnectionState {
            id: 4,
            dispatcher: dispatcher.clone(),
            imu: Arc::new(Mutex::new(imu)),
            imu_streaming: false,
        };
        for line in ["", "junk", "SESSION_START:", "HEIGHT_ENTERED:x", "AGE_ENTERED:29", "HR_BASELINE:58"] {
            state.handle_line(line);
        }
        assert_eq!(
            dispatcher.drain(),
            vec![
                Command::AgeEntered { id: 4, age: 29 },
                Command::HeartRateBaseline { id: 4, bpm: 58.0 },
            ]
        );
    }
}
