use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::frame::{read_frame, write_frame, Frame, FrameKind};
use super::messages::{decode_message, encode_message, event_from_message, new_request_id, Message};
use crate::error::SynthesisError;
use crate::pipeline::{EventSender, SynthesisResult};
use crate::settings::SynthesisOptions;
use crate::voice::SynthesisVoice;

type Listeners = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>>;

fn connection_closed() -> SynthesisError {
    SynthesisError::Internal(anyhow!("worker connection closed"))
}

/// Client side of the worker protocol. One reader task routes incoming
/// messages to the listener registered for their request id; one writer task
/// serializes outgoing frames.
pub struct WorkerClient {
    outgoing: mpsc::UnboundedSender<Frame>,
    listeners: Listeners,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerClient {
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));

        let tasks = vec![
            tokio::spawn(write_outgoing(writer, outgoing_rx)),
            tokio::spawn(route_incoming(reader, listeners.clone())),
        ];

        Self {
            outgoing,
            listeners,
            tasks,
        }
    }

    /// Starts `command` with piped stdio and connects to it. The child is
    /// killed when the returned handle is dropped.
    pub fn spawn(command: &mut Command) -> anyhow::Result<(Self, Child)> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start synthesis worker")?;

        let stdin = child.stdin.take().context("Worker stdin is not piped")?;
        let stdout = child.stdout.take().context("Worker stdout is not piped")?;
        Ok((Self::connect(stdout, stdin), child))
    }

    /// Number of requests still waiting for their terminal response.
    pub async fn pending_requests(&self) -> usize {
        self.listeners.lock().await.len()
    }

    async fn request(
        &self,
        message: Message,
    ) -> Result<(String, mpsc::UnboundedReceiver<Message>), SynthesisError> {
        let request_id = new_request_id();
        let payload = encode_message(&request_id, &message)?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().await.insert(request_id.clone(), tx);

        if self.outgoing.send(Frame::binary(payload)).is_err() {
            self.listeners.lock().await.remove(&request_id);
            return Err(connection_closed());
        }
        debug!(%request_id, message_type = message.message_type(), "Sent request");
        Ok((request_id, rx))
    }

    pub async fn start_synthesis(
        &self,
        segments: Vec<String>,
        options: SynthesisOptions,
    ) -> Result<PendingSynthesis, SynthesisError> {
        let (request_id, receiver) = self
            .request(Message::SynthesizeSegmentsRequest { segments, options })
            .await?;
        Ok(PendingSynthesis {
            request_id,
            receiver,
            outgoing: self.outgoing.clone(),
        })
    }

    pub async fn synthesize_segments(
        &self,
        segments: Vec<String>,
        options: SynthesisOptions,
        events: Option<&EventSender>,
    ) -> Result<SynthesisResult, SynthesisError> {
        self.start_synthesis(segments, options)
            .await?
            .finish(events)
            .await
    }

    pub async fn list_voices(
        &self,
        options: SynthesisOptions,
    ) -> Result<Vec<SynthesisVoice>, SynthesisError> {
        let (request_id, mut receiver) = self.request(Message::VoiceListRequest { options }).await?;
        while let Some(message) = receiver.recv().await {
            match message {
                Message::VoiceListResponse { voices } => return Ok(voices),
                Message::ErrorResponse { error } => return Err(error.into()),
                other => warn!(
                    %request_id,
                    message_type = other.message_type(),
                    "Unexpected message for voice list request"
                ),
            }
        }
        Err(connection_closed())
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A synthesis request in flight.
pub struct PendingSynthesis {
    request_id: String,
    receiver: mpsc::UnboundedReceiver<Message>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl PendingSynthesis {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Asks the worker to cancel this request. The request still ends with
    /// its terminal response, normally a `canceled` error.
    pub fn cancel(&self) -> Result<(), SynthesisError> {
        let message = Message::CancelRequest {
            target_request_id: self.request_id.clone(),
        };
        let payload = encode_message(&new_request_id(), &message)?;
        self.outgoing
            .send(Frame::binary(payload))
            .map_err(|_| connection_closed())
    }

    /// Waits for the terminal response, forwarding events on the way.
    pub async fn finish(
        mut self,
        events: Option<&EventSender>,
    ) -> Result<SynthesisResult, SynthesisError> {
        while let Some(message) = self.receiver.recv().await {
            match message {
                Message::SynthesizeSegmentsResponse { result } => {
                    return SynthesisResult::try_from(result)
                        .map_err(|e| SynthesisError::Internal(anyhow!(e)));
                }
                Message::ErrorResponse { error } => return Err(error.into()),
                event => match event_from_message(event) {
                    Ok(Some(event)) => {
                        if let Some(events) = events {
                            let _ = events.send(event);
                        }
                    }
                    Ok(None) => warn!(
                        request_id = %self.request_id,
                        "Unexpected message for synthesis request"
                    ),
                    Err(e) => warn!(request_id = %self.request_id, ?e, "Dropping malformed event"),
                },
            }
        }
        Err(connection_closed())
    }
}

async fn write_outgoing<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outgoing.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            error!(?e, "Failed to write to worker");
            break;
        }
    }
}

async fn route_incoming<R>(mut reader: R, listeners: Listeners)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(None) => {
                debug!("Worker closed its output");
                break;
            }
            Ok(Some(frame)) if frame.kind == FrameKind::Text => {
                debug!(text = %String::from_utf8_lossy(&frame.payload), "Ignoring text frame");
            }
            Ok(Some(frame)) => match decode_message(&frame.payload) {
                Ok((request_id, message)) => deliver(&listeners, request_id, message).await,
                Err(e) => warn!(?e, "Dropping undecodable message"),
            },
            Err(e) if e.is_fatal() => {
                error!(?e, "Worker stream failed");
                break;
            }
            Err(e) => warn!(?e, "Skipping frame"),
        }
    }

    // Dropping the senders wakes every pending call with a closed channel
    listeners.lock().await.clear();
}

async fn deliver(listeners: &Listeners, request_id: String, message: Message) {
    let listener = {
        let mut listeners = listeners.lock().await;
        if message.is_terminal() {
            listeners.remove(&request_id)
        } else {
            listeners.get(&request_id).cloned()
        }
    };

    match listener {
        Some(listener) => {
            let _ = listener.send(message);
        }
        None => warn!(
            %request_id,
            message_type = message.message_type(),
            "No listener for message, dropping"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RawAudio;
    use crate::pipeline::{event_channel, SentenceEvent, SynthesisEvent};
    use crate::protocol::messages::{WireError, WireSynthesisResult};
    use crate::timeline::TimelineEntry;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    struct FakeWorker {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeWorker {
        async fn next(&mut self) -> (String, Message) {
            let frame = read_frame(&mut self.reader).await.unwrap().unwrap();
            decode_message(&frame.payload).unwrap()
        }

        async fn send(&mut self, request_id: &str, message: &Message) {
            let payload = encode_message(request_id, message).unwrap();
            write_frame(&mut self.writer, &Frame::binary(payload)).await.unwrap();
        }
    }

    fn connect() -> (WorkerClient, FakeWorker) {
        let (client_io, worker_io) = duplex(1 << 20);
        let (client_reader, client_writer) = split(client_io);
        let (reader, writer) = split(worker_io);
        (
            WorkerClient::connect(client_reader, client_writer),
            FakeWorker { reader, writer },
        )
    }

    fn result() -> SynthesisResult {
        SynthesisResult {
            audio: RawAudio::mono(vec![0.1; 10], 24000),
            timeline: vec![TimelineEntry::word("Hi", 0.0, 0.2)],
            language: "en".to_string(),
            voice: None,
            engine: Some("mock".to_string()),
            segments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn routes_events_and_response_to_their_request() {
        let (client, mut worker) = connect();
        let (events, mut received) = event_channel();

        let pending = client
            .start_synthesis(vec!["Hi".to_string()], SynthesisOptions::default())
            .await
            .unwrap();
        assert_eq!(client.pending_requests().await, 1);

        let (request_id, message) = worker.next().await;
        assert_eq!(request_id, pending.request_id());
        assert!(matches!(message, Message::SynthesizeSegmentsRequest { .. }));

        write_frame(&mut worker.writer, &Frame::text("worker ready")).await.unwrap();
        worker
            .send("someone-else", &Message::VoiceListResponse { voices: Vec::new() })
            .await;
        let event = SynthesisEvent::Sentence(SentenceEvent {
            segment_index: 0,
            index: 0,
            total: 1,
            text: "Hi".to_string(),
            audio: RawAudio::mono(vec![0.1; 10], 24000),
            timeline: Vec::new(),
            language: "en".to_string(),
            peak_decibels_so_far: -20.0,
        });
        worker.send(&request_id, &Message::from(&event)).await;
        worker
            .send(
                &request_id,
                &Message::SynthesizeSegmentsResponse {
                    result: WireSynthesisResult::from(&result()),
                },
            )
            .await;

        let result = pending.finish(Some(&events)).await.unwrap();
        assert_eq!(result.audio.len(), 10);
        assert_eq!(result.engine.as_deref(), Some("mock"));
        assert!(matches!(received.try_recv(), Ok(SynthesisEvent::Sentence(e)) if e.text == "Hi"));
        assert_eq!(client.pending_requests().await, 0);
    }

    #[tokio::test]
    async fn error_response_keeps_its_kind() {
        let (client, mut worker) = connect();
        let responder = tokio::spawn(async move {
            let (request_id, message) = worker.next().await;
            assert!(matches!(message, Message::VoiceListRequest { .. }));
            worker
                .send(
                    &request_id,
                    &Message::ErrorResponse {
                        error: WireError {
                            kind: "configuration".to_string(),
                            message: "missing api key".to_string(),
                        },
                    },
                )
                .await;
            worker
        });

        let err = client.list_voices(SynthesisOptions::default()).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Configuration(m) if m == "missing api key"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_names_the_target_request() {
        let (client, mut worker) = connect();
        let pending = client
            .start_synthesis(vec!["One. Two.".to_string()], SynthesisOptions::default())
            .await
            .unwrap();
        let (request_id, _) = worker.next().await;

        pending.cancel().unwrap();
        let (cancel_id, message) = worker.next().await;
        assert_ne!(cancel_id, request_id);
        assert!(matches!(
            message,
            Message::CancelRequest { target_request_id } if target_request_id == request_id
        ));

        worker
            .send(&request_id, &Message::error(&SynthesisError::Canceled))
            .await;
        assert!(matches!(pending.finish(None).await, Err(SynthesisError::Canceled)));
    }

    #[tokio::test]
    async fn closed_connection_fails_pending_calls() {
        let (client, mut worker) = connect();
        let pending = client
            .start_synthesis(vec!["Hi".to_string()], SynthesisOptions::default())
            .await
            .unwrap();
        worker.next().await;
        drop(worker);

        assert!(matches!(
            pending.finish(None).await,
            Err(SynthesisError::Internal(_))
        ));
    }
}
