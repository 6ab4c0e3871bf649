//! Prompt round-trip tests: dispatcher → proxy → log + speech

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use voice_prompt::conversation::ConversationLog;
use voice_prompt::dispatch::{PromptDispatcher, LOAD_FAILED};
use voice_prompt::session::{ChatSession, Command};
use voice_prompt::speech::{ListeningState, SpeechController, SpeechEvent};

mod common;
use common::{spawn_proxy, wait_for_utterances, FixedRecognizer, RecordingSynth, StubGenerator};

struct Harness {
    log: Arc<ConversationLog>,
    synth: Arc<RecordingSynth>,
    speech: Arc<SpeechController>,
    dispatcher: PromptDispatcher,
    transcripts: mpsc::Receiver<String>,
}

fn harness(endpoint: String, transcript: Option<&str>) -> Harness {
    let log = Arc::new(ConversationLog::new());
    let synth = Arc::new(RecordingSynth::default());
    let (tx, transcripts) = mpsc::channel(4);
    let speech = Arc::new(SpeechController::new(
        synth.clone(),
        Arc::new(FixedRecognizer(transcript.map(String::from))),
        "en-US",
        tx,
    ));
    let dispatcher = PromptDispatcher::new(
        endpoint,
        Duration::from_secs(5),
        log.clone(),
        speech.clone(),
    )
    .unwrap();
    Harness {
        log,
        synth,
        speech,
        dispatcher,
        transcripts,
    }
}

#[tokio::test]
async fn success_appends_normalized_entry_and_speaks_it() {
    let generator = Arc::new(StubGenerator::replying("**Hello**\n\nWorld"));
    let addr = spawn_proxy(generator.clone(), "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);
    let mut events = h.speech.subscribe();

    let entry = h.dispatcher.dispatch("greet me").await;

    assert_eq!(entry.prompt, "greet me");
    assert_eq!(entry.response, "1. Hello\n2. World");
    assert_eq!(h.log.all(), vec![entry]);
    assert_eq!(generator.prompts(), vec!["greet me".to_string()]);

    wait_for_utterances(&mut events, 1).await;
    assert_eq!(h.synth.texts(), vec!["1. Hello. 2. World".to_string()]);
}

#[tokio::test]
async fn upstream_failure_appends_and_speaks_fixed_message() {
    let addr = spawn_proxy(Arc::new(StubGenerator::failing()), "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);
    let mut events = h.speech.subscribe();

    let entry = h.dispatcher.dispatch("test").await;

    assert_eq!(entry.prompt, "test");
    assert_eq!(entry.response, LOAD_FAILED);
    assert_eq!(h.log.len(), 1);

    wait_for_utterances(&mut events, 1).await;
    assert_eq!(h.synth.texts(), vec![LOAD_FAILED.to_string()]);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_load_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let h = harness(format!("http://{addr}/generate-text"), None);
    let entry = h.dispatcher.dispatch("anyone there?").await;

    assert_eq!(entry.response, LOAD_FAILED);
    assert_eq!(h.log.len(), 1);
}

#[tokio::test]
async fn wrong_route_is_a_load_failure() {
    let addr = spawn_proxy(Arc::new(StubGenerator::replying("hi")), "/").await;
    let h = harness(format!("http://{addr}/generate-text"), None);

    let entry = h.dispatcher.dispatch("hello").await;

    assert_eq!(entry.response, LOAD_FAILED);
}

#[tokio::test]
async fn concurrent_dispatches_each_append_once() {
    let generator = Arc::new(StubGenerator::replying("reply"));
    let addr = spawn_proxy(generator, "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);

    let (a, b, c) = tokio::join!(
        h.dispatcher.dispatch("one"),
        h.dispatcher.dispatch("two"),
        h.dispatcher.dispatch("three"),
    );

    assert_eq!(h.log.len(), 3);
    let mut prompts: Vec<String> = h.log.all().into_iter().map(|e| e.prompt).collect();
    prompts.sort();
    assert_eq!(prompts, vec!["one", "three", "two"]);
    for entry in [a, b, c] {
        assert_eq!(entry.response, "1. reply");
    }
}

#[tokio::test]
async fn session_rejects_blank_input() {
    let addr = spawn_proxy(Arc::new(StubGenerator::replying("x")), "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());

    assert!(!session.submit(""));
    assert!(!session.submit("   \t"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.log.is_empty());
}

#[tokio::test]
async fn recognized_speech_is_dispatched_verbatim() {
    let generator = Arc::new(StubGenerator::replying("It is noon"));
    let addr = spawn_proxy(generator.clone(), "/generate-text").await;
    let mut h = harness(format!("http://{addr}/generate-text"), Some("what time is it"));
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());
    let mut entries = h.log.subscribe();

    assert!(h.speech.start_listening());
    let transcript = h.transcripts.recv().await.unwrap();
    assert!(session.submit(&transcript));

    let entry = entries.recv().await.unwrap();
    assert_eq!(entry.prompt, "what time is it");
    assert_eq!(entry.response, "1. It is noon");
    assert_eq!(generator.prompts(), vec!["what time is it".to_string()]);
}

#[tokio::test]
async fn closed_input_waits_for_pending_prompts() {
    let generator = Arc::new(StubGenerator::replying("piped reply"));
    let addr = spawn_proxy(generator.clone(), "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());

    let (line_tx, line_rx) = mpsc::channel(4);
    let (_transcript_tx, transcript_rx) = mpsc::channel(1);
    line_tx.send("hello".to_string()).await.unwrap();
    drop(line_tx);

    session.run(line_rx, transcript_rx).await;

    assert_eq!(h.log.len(), 1);
    assert_eq!(h.log.all()[0].prompt, "hello");
    assert_eq!(h.log.all()[0].response, "1. piped reply");
    assert_eq!(h.synth.texts(), vec!["1. piped reply".to_string()]);
    assert_eq!(session.pending(), 0);
}

#[tokio::test]
async fn slash_lines_that_are_not_commands_are_prompts() {
    let generator = Arc::new(StubGenerator::replying("ok"));
    let addr = spawn_proxy(generator.clone(), "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());

    let (line_tx, line_rx) = mpsc::channel(4);
    let (_transcript_tx, transcript_rx) = mpsc::channel(1);
    line_tx.send("/usr/bin is for what?".to_string()).await.unwrap();
    line_tx.send("//quit".to_string()).await.unwrap();
    drop(line_tx);

    session.run(line_rx, transcript_rx).await;

    let mut prompts = generator.prompts();
    prompts.sort();
    assert_eq!(prompts, vec!["/quit".to_string(), "/usr/bin is for what?".to_string()]);
    assert_eq!(h.log.len(), 2);
}

#[tokio::test]
async fn listening_without_result_submits_nothing() {
    let generator = Arc::new(StubGenerator::replying("x"));
    let addr = spawn_proxy(generator.clone(), "/generate-text").await;
    let mut h = harness(format!("http://{addr}/generate-text"), None);
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());
    let mut events = h.speech.subscribe();

    assert!(session.handle_command(Command::Listen));
    loop {
        if events.recv().await.unwrap() == SpeechEvent::ListeningEnded {
            break;
        }
    }
    assert_eq!(h.speech.listening_state(), ListeningState::Idle);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.transcripts.try_recv().is_err());
    assert_eq!(session.pending(), 0);
    assert!(h.log.is_empty());
    assert!(generator.prompts().is_empty());

    // The next session starts normally
    assert!(h.speech.start_listening());
}

#[tokio::test]
async fn voice_commands_update_selection_and_listing() {
    let h = harness("http://127.0.0.1:9/generate-text".to_string(), None);
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());

    assert_eq!(session.voice_listing(), "No voices available.");

    h.speech.load_voices().await;
    assert_eq!(session.voice_listing(), "* test-voice (en-US)");

    assert!(session.handle_command(Command::Voice("missing".into())));
    assert_eq!(h.speech.selected_voice().as_deref(), Some("missing"));
    assert_eq!(session.voice_listing(), "  test-voice (en-US)");

    assert!(session.handle_command(Command::Voice("test-voice".into())));
    assert_eq!(session.voice_listing(), "* test-voice (en-US)");
}

#[tokio::test]
async fn commands_keep_the_session_alive_until_quit() {
    let generator = Arc::new(StubGenerator::replying("answer"));
    let addr = spawn_proxy(generator.clone(), "/generate-text").await;
    let h = harness(format!("http://{addr}/generate-text"), None);
    let session = ChatSession::new(h.log.clone(), h.speech.clone(), h.dispatcher.clone());

    assert!(session.handle_command(Command::History));
    assert!(session.handle_command(Command::Help));
    assert!(session.handle_command(Command::Voices));

    assert!(session.handle_command(Command::Prompt("   ".into())));
    assert!(session.handle_command(Command::Prompt("question".into())));
    session.drain().await;
    assert_eq!(h.log.len(), 1);
    assert_eq!(generator.prompts(), vec!["question".to_string()]);
    assert!(session.handle_command(Command::History));

    h.speech.speak("long answer");
    assert!(session.handle_command(Command::Stop));
    assert!(!h.speech.is_speaking());

    assert!(!session.handle_command(Command::Quit));
}
