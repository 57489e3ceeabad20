mod common;

use anyhow::Result;
use common::{eventually, partial, terminal, Script, ScriptedFactory};
use device_gateway::asr::RecognitionState;
use device_gateway::{AudioParams, GatewayError, StreamingRecognizer};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEVICE_ID: &str = "AA:BB:CC:DD:EE:FF";

fn recognizer(script: Script) -> (StreamingRecognizer, Arc<ScriptedFactory>) {
    let factory = ScriptedFactory::new(script);
    (StreamingRecognizer::new(factory.clone(), 10), factory)
}

#[tokio::test]
async fn test_connect_failure_does_not_close() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        fail_open: true,
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);

    let err = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), CancellationToken::new(), audio_rx)
        .await
        .err()
        .expect("Connect failure should be returned");

    assert!(matches!(err, GatewayError::Connect(_)));
    assert_eq!(factory.probe.inits.load(Ordering::SeqCst), 0, "Init must not be attempted");
    assert_eq!(factory.probe.closes(), 0, "Nothing was opened, nothing to close");

    Ok(())
}

#[tokio::test]
async fn test_init_failure_closes_once() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        fail_init: true,
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);

    let err = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), CancellationToken::new(), audio_rx)
        .await
        .err()
        .expect("Init failure should be returned");

    assert!(matches!(err, GatewayError::Initialize(_)));
    assert_eq!(factory.probe.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_empty_responses_then_terminal() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        responses: vec![partial(""), partial(""), terminal("hello")],
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);

    let mut stream = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), CancellationToken::new(), audio_rx)
        .await?;

    let first = stream.recv().await.expect("One transcript expected");
    assert_eq!(first.text, "hello");
    assert!(first.is_final);

    let next = tokio::time::timeout(Duration::from_secs(2), stream.recv()).await?;
    assert!(next.is_none(), "Output should close after the terminal result");

    tokio::time::timeout(Duration::from_secs(2), stream.closed()).await?;
    assert_eq!(stream.state(), RecognitionState::Closed);
    assert_eq!(factory.probe.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_undecodable_frames_are_skipped() -> Result<()> {
    let (recognizer, _factory) = recognizer(Script {
        responses: vec![
            Err("bad frame".to_string()),
            partial("lights"),
            Err("bad frame".to_string()),
            terminal("lights on"),
        ],
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);

    let mut stream = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), CancellationToken::new(), audio_rx)
        .await?;

    let mut texts = Vec::new();
    while let Some(transcript) = stream.recv().await {
        texts.push(transcript.text);
    }

    assert_eq!(texts, vec!["lights".to_string(), "lights on".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_audio_is_forwarded_until_input_ends() -> Result<()> {
    let (recognizer, factory) = recognizer(Script::default());
    let (audio_tx, audio_rx) = mpsc::channel(4);

    let mut stream = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), CancellationToken::new(), audio_rx)
        .await?;
    assert_eq!(stream.state(), RecognitionState::Streaming);

    audio_tx.send(vec![1; 60]).await?;
    audio_tx.send(vec![2; 60]).await?;
    drop(audio_tx);

    let next = tokio::time::timeout(Duration::from_secs(2), stream.recv()).await?;
    assert!(next.is_none(), "Backend finishing should end the output");
    assert_eq!(factory.probe.frames(), 2);

    let probe = Arc::clone(&factory.probe);
    assert!(eventually(|| probe.closes() == 1).await);

    Ok(())
}

#[tokio::test]
async fn test_cancel_and_close_race_closes_once() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        hold_open: true,
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();

    let mut stream = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), cancel.clone(), audio_rx)
        .await?;

    tokio::join!(stream.close(), async { cancel.cancel() }, stream.close());

    let next = tokio::time::timeout(Duration::from_secs(2), stream.recv()).await?;
    assert!(next.is_none());
    assert_eq!(stream.state(), RecognitionState::Closed);

    // Give the receiver time to observe the cancellation too
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.probe.closes(), 1, "Close must run exactly once");

    Ok(())
}

#[tokio::test]
async fn test_parent_cancellation_ends_request() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        hold_open: true,
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);
    let parent = CancellationToken::new();

    let mut stream = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), parent.child_token(), audio_rx)
        .await?;

    parent.cancel();

    let next = tokio::time::timeout(Duration::from_secs(2), stream.recv()).await?;
    assert!(next.is_none());
    tokio::time::timeout(Duration::from_secs(2), stream.closed()).await?;
    assert_eq!(factory.probe.closes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_dropping_stream_cancels_request() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        hold_open: true,
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);

    let stream = recognizer
        .recognize(DEVICE_ID, &AudioParams::default(), CancellationToken::new(), audio_rx)
        .await?;
    drop(stream);

    let probe = Arc::clone(&factory.probe);
    assert!(eventually(|| probe.closes() == 1).await, "Dropped request should be torn down");

    Ok(())
}

#[tokio::test]
async fn test_cancel_during_init_closes_once() -> Result<()> {
    let (recognizer, factory) = recognizer(Script {
        stall_init: true,
        ..Script::default()
    });
    let (_audio_tx, audio_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();

    let pending = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            recognizer
                .recognize(DEVICE_ID, &AudioParams::default(), cancel, audio_rx)
                .await
                .err()
        }
    });

    let probe = Arc::clone(&factory.probe);
    assert!(eventually(|| probe.inits.load(Ordering::SeqCst) == 1).await);
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(2), pending)
        .await??
        .expect("Cancelled init should fail the request");
    assert!(matches!(err, GatewayError::Initialize(_)));
    assert_eq!(factory.probe.closes(), 1, "Opened connection must be closed");

    Ok(())
}
