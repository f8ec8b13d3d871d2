//! The sentence-pipelined concurrency core (§4.10): one pipeline instance
//! owns exclusively per-session state — conversation history, the sentence
//! buffer and the code-fence filter — and drives one ASR call followed by a
//! concurrent LLM/TTS stream for every completed utterance.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use voice_agent_core::{
    filter_reason, render_history, ChatMessage, ConversationTurn, Delta, Error, Event,
    LanguageModel, PcmSegment, PipelineEvent, Result, Retriever, RunStatus, SpeechToText,
    SynthesizeOpts, TextToSpeech, TraceRun, TraceSpan, Tracer,
};
use voice_agent_text_processing::{prepare_for_synthesis, CodeFenceFilter, SentenceBuffer};

use crate::audio::samples_to_wav;

/// Sample rate used for the synthesized inter-sentence silence pad (§4.10).
const SILENCE_SAMPLE_RATE_HZ: u32 = 24_000;

/// Everything one session's pipeline run needs to reach its backends. All
/// fields besides `history`, `sentence_buffer` and `code_fence` are shared,
/// immutable collaborators; the rest is per-session state owned exclusively
/// by this instance (§5 shared-resource policy).
pub struct PipelineEngine {
    pub session_id: String,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub tracer: Arc<dyn Tracer>,
    pub system_prompt: String,
    pub llm_model: String,
    pub no_speech_prob_threshold: f32,
    pub sentence_channel_capacity: usize,
    pub inter_sentence_pause_ms: Option<u64>,
    pub tts_opts: SynthesizeOpts,
    history: Vec<ConversationTurn>,
}

/// Outcome of `streamLLMWithTTS`, folded back into the pipeline run.
struct StreamResult {
    text: String,
    thinking: Option<String>,
    time_to_first_token_ms: u64,
    tts_ms: u64,
}

impl PipelineEngine {
    pub fn new(
        session_id: String,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
        retriever: Option<Arc<dyn Retriever>>,
        tracer: Arc<dyn Tracer>,
        system_prompt: String,
        llm_model: String,
        no_speech_prob_threshold: f32,
        sentence_channel_capacity: usize,
        inter_sentence_pause_ms: Option<u64>,
        tts_opts: SynthesizeOpts,
    ) -> Self {
        Self {
            session_id,
            stt,
            llm,
            tts,
            retriever,
            tracer,
            system_prompt,
            llm_model,
            no_speech_prob_threshold,
            sentence_channel_capacity,
            inter_sentence_pause_ms,
            tts_opts,
            history: Vec::new(),
        }
    }

    /// Runs ASR → (optional) RAG → LLM/TTS for one completed utterance,
    /// invoking `on_event` for every event the run produces (§4.10 step 1-5).
    pub async fn run_full_pipeline(
        &mut self,
        speech: &PcmSegment,
        cancel: &CancellationToken,
        on_event: impl Fn(PipelineEvent) + Send + Sync + Clone + 'static,
    ) -> Result<()> {
        let run_id = Uuid::new_v4().to_string();
        let run_started_at = Utc::now();
        let run_start = Instant::now();

        let asr_start = Instant::now();
        let transcript = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.stt.transcribe(speech, None) => result?,
        };
        let asr_ms = asr_start.elapsed().as_millis() as u64;

        if let Some(reason) = filter_reason(&transcript, self.no_speech_prob_threshold) {
            tracing::debug!(session_id = %self.session_id, reason, "transcript filtered, ending run");
            self.tracer.record_run(TraceRun {
                id: run_id,
                session_id: self.session_id.clone(),
                started_at: run_started_at,
                duration_ms: run_start.elapsed().as_millis() as u64,
                transcript: transcript.text,
                response: String::new(),
                status: RunStatus::Filtered,
            });
            return Ok(());
        }

        on_event(PipelineEvent::new(Event::Transcript {
            text: transcript.text.clone(),
            latency_ms: asr_ms,
        }));

        let rag_context = match &self.retriever {
            Some(retriever) => retriever.retrieve_context(&transcript.text).await,
            None => String::new(),
        };

        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        if !rag_context.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Relevant context from knowledge base:\n{rag_context}"
            )));
        }
        let user_line = format!("{}{}", render_history(&self.history), transcript.text);
        messages.push(ChatMessage::user(user_line));

        let llm_start = Instant::now();
        let stream_result = match tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.stream_llm_with_tts(&messages, on_event.clone()) => result,
        } {
            Ok(result) => result,
            Err(err) => {
                on_event(PipelineEvent::new(Event::Error { message: err.to_string() }));
                self.tracer.record_run(TraceRun {
                    id: run_id,
                    session_id: self.session_id.clone(),
                    started_at: run_started_at,
                    duration_ms: run_start.elapsed().as_millis() as u64,
                    transcript: transcript.text,
                    response: String::new(),
                    status: RunStatus::Error,
                });
                return Err(err);
            }
        };
        let llm_ms = llm_start.elapsed().as_millis() as u64;

        self.history.push(ConversationTurn {
            user: transcript.text.clone(),
            assistant: stream_result.text.clone(),
        });

        if let Some(thinking) = stream_result.thinking {
            on_event(PipelineEvent::new(Event::ThinkingDone { thinking }));
        }

        let total_ms = run_start.elapsed().as_millis() as u64;
        on_event(PipelineEvent::new(Event::Metrics {
            asr_ms,
            llm_ms,
            tts_ms: stream_result.tts_ms,
            total_ms,
        }));

        self.tracer.record_run(TraceRun {
            id: run_id.clone(),
            session_id: self.session_id.clone(),
            started_at: run_started_at,
            duration_ms: total_ms,
            transcript: transcript.text,
            response: stream_result.text,
            status: RunStatus::Ok,
        });
        self.tracer.record_span(TraceSpan {
            id: Uuid::new_v4().to_string(),
            run_id,
            name: "llm".to_string(),
            started_at: run_started_at,
            duration_ms: llm_ms,
            input: String::new(),
            output: String::new(),
            status: RunStatus::Ok,
            error_msg: None,
        });

        Ok(())
    }

    /// The concurrency core: one consumer task turns sentences into audio
    /// while the current task drains LLM deltas into the sentence buffer,
    /// sending completed sentences into a bounded channel that provides the
    /// backpressure between them (§4.10, §5).
    async fn stream_llm_with_tts(
        &self,
        messages: &[ChatMessage],
        on_event: impl Fn(PipelineEvent) + Send + Sync + Clone + 'static,
    ) -> Result<StreamResult> {
        let (sentence_tx, sentence_rx) = mpsc::channel::<String>(self.sentence_channel_capacity);
        let tts_ms = Arc::new(Mutex::new(0u64));

        let consumer = tokio::spawn(Self::run_tts_consumer(
            sentence_rx,
            self.tts.clone(),
            self.tts_opts,
            self.inter_sentence_pause_ms,
            tts_ms.clone(),
            on_event.clone(),
        ));

        let (delta_tx, mut delta_rx) = mpsc::channel::<Delta>(32);
        let llm_call = tokio::spawn({
            let llm = self.llm.clone();
            let messages = messages.to_vec();
            let model = self.llm_model.clone();
            async move { llm.chat(&messages, &model, delta_tx).await }
        });

        let mut code_fence = CodeFenceFilter::new();
        let mut sentence_buffer = SentenceBuffer::new();
        let mut thinking = String::new();
        let mut saw_content = false;
        let mut time_to_first_token_ms = 0u64;
        let producer_start = Instant::now();

        while let Some(delta) = delta_rx.recv().await {
            match delta {
                Delta::Content(text) => {
                    if !saw_content {
                        saw_content = true;
                        time_to_first_token_ms = producer_start.elapsed().as_millis() as u64;
                    }
                    on_event(PipelineEvent::new(Event::LlmToken { text: text.clone() }));

                    let filtered = code_fence.push(&text);
                    if filtered.is_empty() {
                        continue;
                    }
                    if let Some(sentence) = sentence_buffer.add(&filtered) {
                        if sentence_tx.send(sentence).await.is_err() {
                            break;
                        }
                    }
                }
                Delta::Thinking(text) => thinking.push_str(&text),
            }
        }

        let llm_result = llm_call
            .await
            .map_err(|e| Error::Transport(format!("llm task join error: {e}")))??;

        if let Some(remainder) = sentence_buffer.flush() {
            let _ = sentence_tx.send(remainder).await;
        }
        drop(sentence_tx);

        // Marks the end of token streaming, not of audio streaming: emitted
        // before the consumer drains, so `tts_ready` may still follow this
        // event for sentences already in flight (§4.10 ordering guarantees).
        on_event(PipelineEvent::new(Event::LlmDone {
            text: llm_result.text.clone(),
            latency_ms: llm_result.latency_ms,
            time_to_first_token_ms,
        }));

        consumer
            .await
            .map_err(|e| Error::Transport(format!("tts consumer join error: {e}")))??;

        let tts_ms = *tts_ms.lock().await;
        Ok(StreamResult {
            text: llm_result.text,
            thinking: if thinking.is_empty() { None } else { Some(thinking) },
            time_to_first_token_ms,
            tts_ms,
        })
    }

    async fn run_tts_consumer(
        mut sentence_rx: mpsc::Receiver<String>,
        tts: Arc<dyn TextToSpeech>,
        opts: SynthesizeOpts,
        inter_sentence_pause_ms: Option<u64>,
        tts_ms: Arc<Mutex<u64>>,
        on_event: impl Fn(PipelineEvent) + Send + Sync,
    ) -> Result<()> {
        while let Some(sentence) = sentence_rx.recv().await {
            let speakable = prepare_for_synthesis(&sentence);
            if speakable.is_empty() {
                continue;
            }

            let synth_start = Instant::now();
            // Propagated, not emitted here: the caller surfaces exactly one
            // `error` event per failed run once this `Err` reaches
            // `run_full_pipeline`'s top-level error arm (§7).
            let result = tts.synthesize(&speakable, opts).await?;
            let elapsed = synth_start.elapsed().as_millis() as u64;
            *tts_ms.lock().await += elapsed;

            on_event(PipelineEvent::with_audio(
                Event::TtsReady { latency_ms: result.latency_ms },
                result.audio,
            ));

            if let Some(pause_ms) = inter_sentence_pause_ms {
                if pause_ms > 0 {
                    let samples = vec![0f32; (pause_ms as u64 * SILENCE_SAMPLE_RATE_HZ as u64 / 1000) as usize];
                    let segment = PcmSegment::with_samples(samples, SILENCE_SAMPLE_RATE_HZ);
                    if let Ok(wav) = samples_to_wav(&segment) {
                        on_event(PipelineEvent::with_audio(Event::TtsReady { latency_ms: 0 }, wav));
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns any buffered speech still owned by VAD and the pipeline on
    /// connection teardown; the session handler calls this once on read
    /// error or peer disconnect (§4.10 cancellation).
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_agent_core::{LlmResult, Transcript, TtsResult};

    struct StubStt;
    #[async_trait]
    impl SpeechToText for StubStt {
        async fn transcribe(&self, _segment: &PcmSegment, _initial_prompt: Option<&str>) -> Result<Transcript> {
            Ok(Transcript { text: "hello there".to_string(), latency_ms: 5, no_speech_prob: 0.0 })
        }
    }

    struct StubLlm;
    #[async_trait]
    impl LanguageModel for StubLlm {
        async fn chat(&self, _messages: &[ChatMessage], _model: &str, tx: mpsc::Sender<Delta>) -> Result<LlmResult> {
            tx.send(Delta::Content("Hi there. ".to_string())).await.ok();
            tx.send(Delta::Content("How can I help?".to_string())).await.ok();
            Ok(LlmResult {
                text: "Hi there. How can I help?".to_string(),
                thinking: None,
                latency_ms: 10,
                time_to_first_token_ms: 1,
            })
        }
    }

    struct StubTts;
    #[async_trait]
    impl TextToSpeech for StubTts {
        async fn synthesize(&self, _text: &str, _opts: SynthesizeOpts) -> Result<TtsResult> {
            Ok(TtsResult { audio: vec![1, 2, 3], latency_ms: 7 })
        }
        fn supports_ssml(&self) -> bool {
            false
        }
    }

    fn test_engine(events: Arc<Mutex<Vec<Event>>>) -> (PipelineEngine, impl Fn(PipelineEvent) + Send + Sync + Clone + 'static) {
        let engine = PipelineEngine::new(
            "session-1".to_string(),
            Arc::new(StubStt),
            Arc::new(StubLlm),
            Arc::new(StubTts),
            None,
            Arc::new(voice_agent_core::NoopTracer),
            "You are helpful.".to_string(),
            "test-model".to_string(),
            0.6,
            4,
            None,
            SynthesizeOpts::default(),
        );
        let on_event = move |pe: PipelineEvent| {
            let events = events.clone();
            tokio::spawn(async move {
                events.lock().await.push(pe.event);
            });
        };
        (engine, on_event)
    }

    #[tokio::test]
    async fn run_full_pipeline_emits_transcript_then_metrics() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (mut engine, on_event) = test_engine(events.clone());
        let segment = PcmSegment::with_samples(vec![0.0; 16], 16_000);
        let cancel = CancellationToken::new();

        engine.run_full_pipeline(&segment, &cancel, on_event).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let recorded = events.lock().await;
        assert!(matches!(recorded[0], Event::Transcript { .. }));
        assert!(recorded.iter().any(|e| matches!(e, Event::LlmDone { .. })));
        assert!(recorded.iter().any(|e| matches!(e, Event::TtsReady { .. })));
        assert!(recorded.iter().any(|e| matches!(e, Event::Metrics { .. })));
        assert_eq!(engine.history().len(), 1);

        let llm_done_idx = recorded.iter().position(|e| matches!(e, Event::LlmDone { .. })).unwrap();
        let metrics_idx = recorded.iter().position(|e| matches!(e, Event::Metrics { .. })).unwrap();
        assert!(llm_done_idx < metrics_idx, "llm_done must precede the end-of-run metrics event");
    }
}
