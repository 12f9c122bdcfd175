use std::sync::Arc;
use std::time::Duration;

use narrator_core::engine::mock::MockEngine;
use narrator_core::pipeline::event_channel;
use narrator_core::protocol::{
    decode_message, encode_message, read_frame, write_frame, Frame, Message, WorkerClient,
};
use narrator_core::voice::VoiceListCache;
use narrator_core::{EngineRegistry, SynthesisError, SynthesisEvent, SynthesisOptions, Synthesizer};
use narrator_worker::run_worker;
use tempfile::TempDir;
use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

struct Fixture {
    engine: MockEngine,
    worker: JoinHandle<anyhow::Result<()>>,
    _cache_dir: TempDir,
}

/// Starts a worker over an in-memory pipe and returns the client end.
fn start_worker() -> (Fixture, DuplexStream) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let cache_dir = TempDir::new().unwrap();
    let engine = MockEngine::named("mock");
    let synthesizer = Synthesizer::builder()
        .registry(EngineRegistry::new(vec![Arc::new(engine.clone())]))
        .voice_cache(VoiceListCache::new(cache_dir.path(), Duration::from_secs(3600)))
        .build();

    let (client_io, worker_io) = duplex(1 << 22);
    let (reader, writer) = split(worker_io);
    let worker = tokio::spawn(run_worker(reader, writer, Arc::new(synthesizer)));

    (
        Fixture {
            engine,
            worker,
            _cache_dir: cache_dir,
        },
        client_io,
    )
}

/// Mock engine, all languages.
fn any_language() -> SynthesisOptions {
    SynthesisOptions {
        engine: Some("mock".to_string()),
        ..Default::default()
    }
}

fn options() -> SynthesisOptions {
    SynthesisOptions {
        engine: Some("mock".to_string()),
        language: Some("en".to_string()),
        ..Default::default()
    }
}

async fn send(stream: &mut DuplexStream, request_id: &str, message: &Message) {
    let payload = encode_message(request_id, message).unwrap();
    write_frame(stream, &Frame::binary(payload)).await.unwrap();
}

async fn receive(stream: &mut DuplexStream) -> (String, Message) {
    let frame = read_frame(stream).await.unwrap().unwrap();
    decode_message(&frame.payload).unwrap()
}

#[tokio::test]
async fn synthesis_streams_events_then_result() {
    let (fixture, client_io) = start_worker();
    let (reader, writer) = split(client_io);
    let client = WorkerClient::connect(reader, writer);
    let (events, mut received) = event_channel();

    let result = client
        .synthesize_segments(
            vec!["Hello there. How are you?".to_string(), "Fine.".to_string()],
            options(),
            Some(&events),
        )
        .await
        .unwrap();

    assert_eq!(result.segments.len(), 2);
    assert_eq!(result.engine.as_deref(), Some("mock"));
    assert_eq!(result.voice.unwrap().name, "mock-amy");
    assert_eq!(fixture.engine.call_count(), 3);

    let mut sentences = 0;
    let mut segments = 0;
    while let Ok(event) = received.try_recv() {
        match event {
            SynthesisEvent::Sentence(_) => sentences += 1,
            SynthesisEvent::Segment(_) => segments += 1,
        }
    }
    assert_eq!((sentences, segments), (3, 2));
    assert_eq!(client.pending_requests().await, 0);
}

#[tokio::test]
async fn errors_travel_with_their_kind() {
    let (_fixture, client_io) = start_worker();
    let (reader, writer) = split(client_io);
    let client = WorkerClient::connect(reader, writer);

    let mut bad = options();
    bad.engine = Some("nonexistent".to_string());
    let err = client
        .synthesize_segments(vec!["Hello".to_string()], bad, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SynthesisError::Configuration(_)));

    let voices = client.list_voices(any_language()).await.unwrap();
    assert_eq!(voices.len(), 3);
    let english = client.list_voices(options()).await.unwrap();
    assert_eq!(english.len(), 2);
}

#[tokio::test]
async fn cancel_request_stops_the_target() {
    let (fixture, client_io) = start_worker();
    let (reader, writer) = split(client_io);
    let client = WorkerClient::connect(reader, writer);

    let text = (1..=20).map(|i| format!("Sentence number {i}.")).collect::<Vec<_>>().join(" ");
    let pending = client.start_synthesis(vec![text], options()).await.unwrap();
    pending.cancel().unwrap();

    assert!(matches!(pending.finish(None).await, Err(SynthesisError::Canceled)));
    assert!(fixture.engine.call_count() < 20);
}

#[tokio::test]
async fn concurrent_requests_are_routed_by_id() {
    let (_fixture, client_io) = start_worker();
    let (reader, writer) = split(client_io);
    let client = WorkerClient::connect(reader, writer);

    let german = SynthesisOptions {
        language: Some("de".to_string()),
        ..options()
    };
    let (english, german) = tokio::join!(
        client.synthesize_segments(vec!["Good morning.".to_string()], options(), None),
        client.synthesize_segments(vec!["Guten Morgen.".to_string()], german, None),
    );
    assert_eq!(english.unwrap().voice.unwrap().name, "mock-amy");
    assert_eq!(german.unwrap().voice.unwrap().name, "mock-hans");
}

#[tokio::test]
async fn malformed_input_is_skipped() {
    let (_fixture, mut stream) = start_worker();

    write_frame(&mut stream, &Frame::text("hello")).await.unwrap();
    write_frame(&mut stream, &Frame::binary(b"not json".to_vec())).await.unwrap();
    write_frame(
        &mut stream,
        &Frame::binary(br#"{"messageType":"VoiceListRequest","options":{}}"#.to_vec()),
    )
    .await
    .unwrap();
    send(
        &mut stream,
        "voices-1",
        &Message::VoiceListRequest {
            options: any_language(),
        },
    )
    .await;

    let (request_id, message) = receive(&mut stream).await;
    assert_eq!(request_id, "voices-1");
    assert!(matches!(message, Message::VoiceListResponse { voices } if voices.len() == 3));
}

#[tokio::test]
async fn closing_input_finishes_in_flight_work() {
    let (fixture, stream) = start_worker();
    let (mut reader, mut writer) = split(stream);

    let payload = encode_message(
        "last",
        &Message::SynthesizeSegmentsRequest {
            segments: vec!["One. Two.".to_string()],
            options: options(),
        },
    )
    .unwrap();
    write_frame(&mut writer, &Frame::binary(payload)).await.unwrap();
    writer.shutdown().await.unwrap();

    let mut terminal = None;
    while let Some(frame) = read_frame(&mut reader).await.unwrap() {
        let (request_id, message) = decode_message(&frame.payload).unwrap();
        assert_eq!(request_id, "last");
        if message.is_terminal() {
            terminal = Some(message);
            break;
        }
    }
    assert!(matches!(terminal, Some(Message::SynthesizeSegmentsResponse { .. })));

    fixture.worker.await.unwrap().unwrap();
}
