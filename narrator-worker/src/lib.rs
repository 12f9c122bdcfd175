use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use narrator_core::pipeline::event_channel;
use narrator_core::protocol::{
    decode_message, encode_message, read_frame, write_frame, Frame, FrameKind, Message,
    WireSynthesisResult,
};
use narrator_core::{CancellationToken, SynthesisOptions, Synthesizer};

mod args;
pub use args::WorkerArgs;

type Outgoing = mpsc::UnboundedSender<Frame>;
type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Serves synthesis requests read from `reader`, writing events and
/// responses to `writer`. Each request runs in its own task with its own
/// cancellation token; all output funnels through a single writer task.
///
/// Returns once the input is closed and every in-flight request has sent its
/// terminal response.
pub async fn run_worker<R, W>(reader: R, writer: W, synthesizer: Arc<Synthesizer>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Frame>();
    let mut join_set: JoinSet<anyhow::Result<()>> = JoinSet::new();

    // Finishes when every sender is gone: the reader and all request tasks
    join_set.spawn(async move {
        let mut writer = writer;
        while let Some(frame) = outgoing_rx.recv().await {
            write_frame(&mut writer, &frame).await?;
        }
        Ok(())
    });

    join_set.spawn(read_requests(reader, outgoing, synthesizer));

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(panic) => return Err(anyhow!(panic)),
        }
    }
    Ok(())
}

async fn read_requests<R>(mut reader: R, outgoing: Outgoing, synthesizer: Arc<Synthesizer>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(?e, "Skipping frame");
                continue;
            }
        };
        if frame.kind == FrameKind::Text {
            debug!(text = %String::from_utf8_lossy(&frame.payload), "Ignoring text frame");
            continue;
        }
        let (request_id, message) = match decode_message(&frame.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(?e, "Dropping undecodable message");
                continue;
            }
        };

        match message {
            Message::SynthesizeSegmentsRequest { segments, options } => {
                let cancel = CancellationToken::new();
                in_flight.lock().await.insert(request_id.clone(), cancel.clone());
                let request = Request {
                    id: request_id,
                    outgoing: outgoing.clone(),
                    synthesizer: synthesizer.clone(),
                };
                tokio::spawn(request.synthesize(segments, options, cancel, in_flight.clone()));
            }
            Message::VoiceListRequest { options } => {
                let request = Request {
                    id: request_id,
                    outgoing: outgoing.clone(),
                    synthesizer: synthesizer.clone(),
                };
                tokio::spawn(request.list_voices(options));
            }
            Message::CancelRequest { target_request_id } => {
                match in_flight.lock().await.get(&target_request_id) {
                    Some(token) => {
                        info!(request_id = %target_request_id, "Cancelling request");
                        token.cancel();
                    }
                    None => debug!(request_id = %target_request_id, "Cancel for unknown request"),
                }
            }
            other => warn!(
                %request_id,
                message_type = other.message_type(),
                "Unexpected message from client"
            ),
        }
    }

    debug!("Input closed, waiting for in-flight requests");
    Ok(())
}

struct Request {
    id: String,
    outgoing: Outgoing,
    synthesizer: Arc<Synthesizer>,
}

impl Request {
    fn send(&self, message: &Message) {
        match encode_message(&self.id, message) {
            Ok(payload) => {
                if self.outgoing.send(Frame::binary(payload)).is_err() {
                    warn!(request_id = %self.id, "Output closed, dropping message");
                }
            }
            Err(e) => error!(request_id = %self.id, ?e, "Failed to encode message"),
        }
    }

    async fn synthesize(
        self,
        segments: Vec<String>,
        options: SynthesisOptions,
        cancel: CancellationToken,
        in_flight: InFlight,
    ) {
        info!(request_id = %self.id, segments = segments.len(), "Synthesis request");
        let (events, mut received) = event_channel();

        let synthesizer = self.synthesizer.clone();
        let run = async move {
            let result = synthesizer
                .synthesize_segments(&segments, options, &cancel, Some(&events))
                .await;
            drop(events);
            result
        };
        // Events go out before the terminal response
        let forward = async {
            while let Some(event) = received.recv().await {
                self.send(&Message::from(&event));
            }
        };
        let (result, ()) = tokio::join!(run, forward);

        in_flight.lock().await.remove(&self.id);
        let response = match result {
            Ok(result) => Message::SynthesizeSegmentsResponse {
                result: WireSynthesisResult::from(&result),
            },
            Err(e) => {
                warn!(request_id = %self.id, kind = e.kind(), "Synthesis failed: {e:?}");
                Message::error(&e)
            }
        };
        self.send(&response);
    }

    async fn list_voices(self, options: SynthesisOptions) {
        let response = match self.synthesizer.list_voices(&options).await {
            Ok(voices) => Message::VoiceListResponse { voices },
            Err(e) => {
                warn!(request_id = %self.id, kind = e.kind(), "Voice listing failed: {e:?}");
                Message::error(&e)
            }
        };
        self.send(&response);
    }
}
