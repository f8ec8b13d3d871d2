//! Per-connection session handler (C11, §4.11): parses the metadata frame,
//! drives VAD + the pipeline engine over the binary-frame read loop, and
//! serializes outbound events back to the peer in order.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use voice_agent_core::{AudioFrame, Error, Event, PcmSegment, PipelineEvent, SynthesizeOpts};
use voice_agent_pipeline::{decode, resample, EnergyVad, PipelineEngine};

use crate::state::AppState;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful call center agent. Keep responses concise and conversational.";

fn default_sample_rate() -> u32 {
    16_000
}
fn default_tts_engine() -> String {
    "fast".to_string()
}
fn default_stt_engine() -> String {
    "whisper-server".to_string()
}
fn default_llm_engine() -> String {
    "ollama".to_string()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// The first text frame of a session, with every field defaulted (§4.11).
#[derive(Debug, Deserialize)]
#[serde(default)]
struct SessionMetadata {
    codec: voice_agent_core::AudioCodec,
    sample_rate: u32,
    tts_engine: String,
    stt_engine: String,
    system_prompt: String,
    llm_model: Option<String>,
    llm_engine: String,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            codec: voice_agent_core::AudioCodec::Pcm,
            sample_rate: default_sample_rate(),
            tts_engine: default_tts_engine(),
            stt_engine: default_stt_engine(),
            system_prompt: default_system_prompt(),
            llm_model: None,
            llm_engine: default_llm_engine(),
        }
    }
}

type WsSink = SplitSink<WebSocket, Message>;

/// Entry point called from the upgrade handler once the admission-control
/// permit has been acquired. Owns the connection until it closes.
pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("session", session_id = %session_id);
    run(socket, state, session_id).instrument(span).await
}

async fn run(socket: WebSocket, state: AppState, session_id: String) {
    let (ws_tx, mut ws_rx) = socket.split();
    let ws_tx = Arc::new(Mutex::new(ws_tx));

    let metadata = match ws_rx.next().await {
        Some(Ok(Message::Text(raw))) => serde_json::from_str::<SessionMetadata>(&raw).unwrap_or_default(),
        _ => {
            tracing::debug!("session closed before a metadata frame arrived");
            return;
        }
    };

    let (stt, llm, tts) = match resolve_backends(&state, &metadata) {
        Ok(backends) => backends,
        Err(err) => {
            send_error(&ws_tx, &err).await;
            return;
        }
    };

    let llm_model = metadata
        .llm_model
        .clone()
        .unwrap_or_else(|| state.default_llm_model(&metadata.llm_engine));

    let pipeline_config = state.settings.read().pipeline.clone();

    let mut engine = PipelineEngine::new(
        session_id.clone(),
        stt,
        llm,
        tts,
        state.retriever.clone(),
        state.tracer.clone(),
        metadata.system_prompt.clone(),
        llm_model,
        pipeline_config.no_speech_prob_threshold,
        pipeline_config.sentence_channel_capacity,
        pipeline_config.inter_sentence_pause_ms,
        SynthesizeOpts::default(),
    );

    let mut vad = EnergyVad::new(pipeline_config.vad.clone());
    let vad_rate_hz = pipeline_config.vad.sample_rate_hz;
    let cancel = CancellationToken::new();

    // Frames read off the peer connection while a turn was in flight (see
    // below); replayed in order once that turn returns.
    let mut pending: std::collections::VecDeque<Message> = std::collections::VecDeque::new();

    'outer: loop {
        let next = if let Some(msg) = pending.pop_front() {
            Some(Ok(msg))
        } else {
            tokio::select! {
                biased;
                _ = state.shutdown.cancelled() => {
                    cancel.cancel();
                    break;
                }
                next = ws_rx.next() => next,
            }
        };

        match next {
            Some(Ok(Message::Binary(bytes))) => {
                let frame = AudioFrame {
                    bytes,
                    codec: metadata.codec,
                    sample_rate_hz: metadata.sample_rate,
                };
                let segment = match decode(&frame) {
                    Ok(segment) => segment,
                    Err(err) => {
                        send_error(&ws_tx, &err).await;
                        continue;
                    }
                };
                let resampled = resample(&segment, vad_rate_hz);
                if let Some(speech) = vad.process_chunk(&resampled.samples) {
                    // Race the turn against the peer connection rather than
                    // simply awaiting it: a mid-turn disconnect must cancel
                    // `cancel` immediately so the ASR/LLM/TTS `select!`
                    // arms in the engine abort in-flight calls instead of
                    // running the turn to completion after the peer is gone
                    // (§4.10 cancellation, §8 scenario 6).
                    let turn = run_pipeline_turn(
                        &mut engine,
                        speech,
                        &cancel,
                        &ws_tx,
                        &session_id,
                        state.call_history.as_ref(),
                    );
                    tokio::pin!(turn);
                    let mut peer_gone = false;
                    let mut shutdown_seen = false;
                    loop {
                        tokio::select! {
                            biased;
                            // `if` guards keep these branches from going
                            // permanently-ready and starving the `turn`
                            // branch of polls once a disconnect is observed.
                            _ = state.shutdown.cancelled(), if !shutdown_seen => {
                                shutdown_seen = true;
                                cancel.cancel();
                            }
                            next_during_turn = ws_rx.next(), if !peer_gone => match next_during_turn {
                                Some(Ok(Message::Binary(bytes))) => pending.push_back(Message::Binary(bytes)),
                                Some(Ok(Message::Close(_))) | None => {
                                    cancel.cancel();
                                    peer_gone = true;
                                }
                                Some(Ok(_)) => {
                                    tracing::debug!("non-binary frame mid-turn, closing session");
                                    cancel.cancel();
                                    peer_gone = true;
                                }
                                Some(Err(err)) => {
                                    tracing::warn!(error = %err, "read error mid-turn, cancelling run");
                                    cancel.cancel();
                                    peer_gone = true;
                                }
                            },
                            _ = &mut turn => break,
                        }
                    }
                    if peer_gone {
                        pending.clear();
                        break 'outer;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {
                tracing::debug!("non-binary frame after metadata, closing session");
                break;
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "read error, flushing pipeline before close");
                break;
            }
        }
    }

    if let Some(speech) = vad.flush() {
        run_pipeline_turn(&mut engine, speech, &cancel, &ws_tx, &session_id, state.call_history.as_ref()).await;
    }

    tracing::info!(turns = engine.history().len(), "session closed");
}

fn resolve_backends(
    state: &AppState,
    metadata: &SessionMetadata,
) -> voice_agent_core::Result<(
    Arc<dyn voice_agent_core::SpeechToText>,
    Arc<dyn voice_agent_core::LanguageModel>,
    Arc<dyn voice_agent_core::TextToSpeech>,
)> {
    let stt = state.asr_router.route(&metadata.stt_engine)?.clone();
    let llm = state.llm_router.route(&metadata.llm_engine)?.clone();
    let tts = state.tts_router.route(&metadata.tts_engine)?.clone();
    Ok((stt, llm, tts))
}

/// Runs one ASR->LLM->TTS turn, forwarding every event to the peer in the
/// order the engine produces them (§4.11 event serialization, §5 ordering).
async fn run_pipeline_turn(
    engine: &mut PipelineEngine,
    speech: PcmSegment,
    cancel: &CancellationToken,
    ws_tx: &Arc<Mutex<WsSink>>,
    session_id: &str,
    call_history: Option<&Arc<voice_agent_rag::CallHistoryStore>>,
) {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PipelineEvent>();

    let writer = tokio::spawn({
        let ws_tx = ws_tx.clone();
        async move {
            while let Some(pipeline_event) = event_rx.recv().await {
                send_event(&ws_tx, pipeline_event).await;
            }
        }
    });

    let on_event = move |pe: PipelineEvent| {
        let _ = event_tx.send(pe);
    };

    let turns_before = engine.history().len();

    if let Err(err) = engine.run_full_pipeline(&speech, cancel, on_event).await {
        if !matches!(err, Error::Cancelled) {
            tracing::warn!(session_id = %session_id, error = %err, "pipeline run failed");
        }
    }

    let _ = writer.await;

    if let Some(store) = call_history {
        if engine.history().len() > turns_before {
            if let Some(turn) = engine.history().last() {
                store.store_async(session_id.to_string(), turn.user.clone(), turn.assistant.clone());
            }
        }
    }
}

/// A single outbound event: audio first (if any), then the JSON envelope,
/// both under one lock acquisition so they land as an atomic pair (§5).
async fn send_event(ws_tx: &Arc<Mutex<WsSink>>, pe: PipelineEvent) {
    let mut sink = ws_tx.lock().await;
    if let Some(audio) = pe.audio {
        if sink.send(Message::Binary(audio)).await.is_err() {
            return;
        }
    }
    match serde_json::to_string(&pe.event) {
        Ok(json) => {
            let _ = sink.send(Message::Text(json)).await;
        }
        Err(err) => tracing::warn!(error = %err, "failed to serialize event"),
    }
}

async fn send_error(ws_tx: &Arc<Mutex<WsSink>>, err: &Error) {
    let event = Event::Error { message: err.to_string() };
    if let Ok(json) = serde_json::to_string(&event) {
        let mut sink = ws_tx.lock().await;
        let _ = sink.send(Message::Text(json)).await;
    }
}
