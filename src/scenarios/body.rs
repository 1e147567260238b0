//! The iteration body shared by every preset.
//!
//! One iteration picks a prompt or text, sends one request, checks the
//! response and records what the preset asks for. All randomness comes from
//! an RNG seeded with the run seed and the iteration's sequence number, so
//! no state is shared between workers except the sink and the detector.

use super::prompts::{self, AnswerLength, LongContext, TieredTexts};
use crate::client::decode::{parse_json, preview};
use crate::client::payload::{self, Message};
use crate::client::{millis, ClientResponse, RequestClient};
use crate::executor::{IterationBody, IterationContext};
use crate::phase::{Phase, PhaseClassifier};
use crate::recovery::{LatencyObservation, SharedDetector};
use crate::scenario::Scenario;
use crate::sink::{Labels, MetricSink};
use crate::HarnessError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ── Pacing ───────────────────────────────────────────────────────────────

/// Uniform random pause between two bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseRange {
    /// Lower bound.
    pub min: Duration,
    /// Upper bound.
    pub max: Duration,
}

impl PauseRange {
    /// Pause between `min_ms` and `max_ms` milliseconds.
    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// No pause.
    pub const ZERO: Self = Self::millis(0, 0);

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        self.min + (self.max - self.min).mul_f64(rng.gen::<f64>())
    }
}

/// Pauses after successful and failed iterations, optionally different
/// during the STRESS phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after a success.
    pub pause: PauseRange,
    /// Pause after a success during STRESS.
    pub stress_pause: Option<PauseRange>,
    /// Pause after a failure.
    pub backoff: Duration,
    /// Pause after a failure during STRESS.
    pub stress_backoff: Option<Duration>,
}

impl Pacing {
    /// Same pause and backoff in every phase.
    pub const fn uniform(pause: PauseRange, backoff: Duration) -> Self {
        Self {
            pause,
            stress_pause: None,
            backoff,
            stress_backoff: None,
        }
    }

    /// Back-to-back iterations, one second backoff.
    pub const fn none() -> Self {
        Self::uniform(PauseRange::ZERO, Duration::from_secs(1))
    }

    /// Pause after a success in `phase`.
    pub fn pause<R: Rng + ?Sized>(&self, phase: Option<Phase>, rng: &mut R) -> Duration {
        match (phase, self.stress_pause) {
            (Some(Phase::Stress), Some(range)) => range.sample(rng),
            _ => self.pause.sample(rng),
        }
    }

    /// Pause after a failure in `phase`.
    pub fn backoff(&self, phase: Option<Phase>) -> Duration {
        match (phase, self.stress_backoff) {
            (Some(Phase::Stress), Some(backoff)) => backoff,
            _ => self.backoff,
        }
    }
}

// ── Workloads ────────────────────────────────────────────────────────────

/// Where chat prompts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    /// The worker's iteration number, modulo the pool length.
    Cycle(&'static [&'static str]),
    /// Uniformly random.
    Random(&'static [&'static str]),
    /// A long generated prompt.
    Synthetic,
}

/// Chat completion requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatWorkload {
    /// Prompt selection.
    pub prompts: PromptSource,
    /// `max_tokens` override; `None` keeps the payload default.
    pub max_tokens: Option<u64>,
    /// `max_tokens` during STRESS.
    pub stress_max_tokens: Option<u64>,
    /// `temperature` override.
    pub temperature: Option<f64>,
}

/// Where embedding inputs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// The worker's iteration number, modulo the pool length.
    Cycle(&'static [&'static str]),
    /// Uniformly random.
    Random(&'static [&'static str]),
    /// Tier by worker slot: slots 1–5 short, 6–10 medium, above long.
    ByWorker(TieredTexts),
    /// Tier by run time: under 5 minutes short, under 15 medium, then long.
    ByElapsed(TieredTexts),
}

/// Batch request sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSizes {
    /// One of the listed sizes.
    OneOf(&'static [usize]),
    /// Inclusive range.
    Between(usize, usize),
}

impl BatchSizes {
    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match *self {
            Self::OneOf(sizes) => sizes.choose(rng).copied().unwrap_or(1),
            Self::Between(lo, hi) if hi > lo => rng.gen_range(lo..=hi),
            Self::Between(lo, _) => lo,
        }
    }
}

/// How often embedding requests are batched, and how batches are recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchPolicy {
    /// Chance of a batch request, 0–1.
    pub probability: f64,
    /// Inputs per batch.
    pub sizes: BatchSizes,
    /// Trend series for batch latencies.
    pub latency_series: &'static str,
    /// Add `batch=yes|no` to latency observations.
    pub tag: bool,
}

/// Embedding requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbedWorkload {
    /// Input selection.
    pub texts: TextSource,
    /// Batching, if any.
    pub batch: Option<BatchPolicy>,
}

/// Editor-style code completion: each worker keeps a prefix, sends it as a
/// fill-in-the-middle prompt and appends what comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FimWorkload {
    /// Starting prefixes; one is drawn at start and after an empty completion.
    pub prefixes: &'static [&'static str],
    /// `max_tokens` per request.
    pub max_tokens: u64,
    /// A prefix longer than this many characters is cut back.
    pub max_prefix_chars: usize,
    /// Characters kept from the front of an over-long prefix.
    pub keep_chars: usize,
}

/// A long document and multi-turn history in, a short answer out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefillWorkload {
    /// Documents to ask about.
    pub contexts: &'static [LongContext],
    /// Follow-up questions for extra turns.
    pub follow_ups: &'static [&'static str],
    /// Conversation turns, drawn from `1..=max_turns`.
    pub max_turns: u32,
    /// `max_tokens` per request.
    pub max_tokens: u64,
    /// `temperature` per request.
    pub temperature: f64,
}

/// A short prompt in, a long answer out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeWorkload {
    /// Prompts and how long an answer each asks for.
    pub prompts: &'static [(&'static str, AnswerLength)],
    /// Audience phrases appended to the prompt.
    pub audiences: &'static [&'static str],
    /// Angle phrases appended to the prompt.
    pub angles: &'static [&'static str],
    /// Fixed `max_tokens`; `None` sizes it from the prompt's [`AnswerLength`].
    pub max_tokens: Option<u64>,
    /// `temperature` per request.
    pub temperature: f64,
    /// Extra pause per requested token after a success.
    pub pause_per_token: Duration,
}

/// Every iteration sends one batch; the size cycles through `sizes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWorkload {
    /// Input pool; each batch is a consecutive window of it.
    pub texts: &'static [&'static str],
    /// Batch sizes, cycled by iteration.
    pub sizes: &'static [usize],
}

impl BatchWorkload {
    /// Inputs for a worker's `iteration`-th batch.
    pub fn inputs(&self, iteration: u64) -> Result<Vec<&'static str>, HarnessError> {
        if self.texts.is_empty() || self.sizes.is_empty() {
            return Err(HarnessError::Config("empty batch pool".into()));
        }
        let index = iteration.wrapping_add(1);
        let size = self.sizes[(index % self.sizes.len() as u64) as usize];
        Ok((0..size as u64)
            .map(|i| self.texts[((index + i) % self.texts.len() as u64) as usize])
            .collect())
    }
}

/// What one iteration sends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Workload {
    /// `POST /v1/chat/completions`.
    Chat(ChatWorkload),
    /// `POST /v1/embeddings`.
    Embed(EmbedWorkload),
    /// `POST /v1/completions` with a growing fill-in-the-middle prefix.
    Fim(FimWorkload),
    /// `POST /v1/chat/completions` with large inputs.
    Prefill(PrefillWorkload),
    /// `POST /v1/chat/completions` with large outputs.
    Decode(DecodeWorkload),
    /// `POST /v1/embeddings` with one batch per iteration.
    Batch(BatchWorkload),
}

/// Series the body records into beyond what the client records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recording {
    /// Trend series for request latency.
    pub latency_series: &'static str,
    /// Count requests per hour of run time in `hourly_requests`.
    pub hourly: bool,
    /// Label latency observations with the stage's worker target (`vus`).
    pub by_workers: bool,
}

impl Default for Recording {
    fn default() -> Self {
        Self {
            latency_series: "response_time",
            hourly: false,
            by_workers: false,
        }
    }
}

// ── Body ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Sent {
    batched: Option<bool>,
    dimension: Option<usize>,
    /// Recorded as-is.
    values: Vec<(&'static str, f64)>,
    /// Recorded as count per second of latency.
    per_second: Vec<(&'static str, f64)>,
    /// Recorded as latency per item.
    per_item: Vec<(&'static str, f64)>,
    /// Added to the pause after this iteration.
    extra_pause: Duration,
}

/// [`IterationBody`] for the preset workloads.
pub struct WorkloadBody {
    client: RequestClient,
    sink: Arc<MetricSink>,
    workload: Workload,
    pacing: Pacing,
    recording: Recording,
    phases: Option<PhaseClassifier>,
    detector: Option<SharedDetector>,
    levels: Option<Scenario>,
    /// Fill-in-the-middle prefix per worker slot.
    prefixes: Mutex<HashMap<u32, String>>,
    seed: u64,
}

impl WorkloadBody {
    /// Body that sends `workload` through `client` and records into the
    /// client's sink.
    pub fn new(client: RequestClient, workload: Workload, pacing: Pacing, recording: Recording) -> Self {
        let sink = Arc::clone(client.sink());
        Self {
            client,
            sink,
            workload,
            pacing,
            recording,
            phases: None,
            detector: None,
            levels: None,
            prefixes: Mutex::new(HashMap::new()),
            seed: rand::random(),
        }
    }

    /// Label observations with their phase and, if given, feed the detector.
    pub fn with_phases(mut self, phases: PhaseClassifier, detector: Option<SharedDetector>) -> Self {
        self.phases = Some(phases);
        self.detector = detector;
        self
    }

    /// Read the worker target for `vus` labels from `scenario`.
    pub fn with_levels(mut self, scenario: Scenario) -> Self {
        self.levels = Some(scenario);
        self
    }

    /// Fix the run seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn rng(&self, ctx: &IterationContext) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ ctx.sequence.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    fn phase_at(&self, elapsed: Duration) -> Option<Phase> {
        self.phases.as_ref().map(|p| p.classify(elapsed))
    }

    async fn send_chat(
        &self,
        w: &ChatWorkload,
        ctx: &IterationContext,
        phase: Option<Phase>,
        rng: &mut StdRng,
    ) -> Result<Sent, HarnessError> {
        let prompt = match w.prompts {
            PromptSource::Cycle(pool) => cycle(pool, ctx.iteration)?.to_string(),
            PromptSource::Random(pool) => random(pool, rng)?.to_string(),
            PromptSource::Synthetic => prompts::synthetic_prompt(rng),
        };

        let mut overrides = Map::new();
        let max_tokens = match phase {
            Some(Phase::Stress) => w.stress_max_tokens.or(w.max_tokens),
            _ => w.max_tokens,
        };
        if let Some(max_tokens) = max_tokens {
            overrides.insert("max_tokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = w.temperature {
            overrides.insert("temperature".into(), json!(temperature));
        }

        let payload = payload::chat_completion(&[Message::user(prompt)], Value::Object(overrides));
        let reply = self.client.chat_complete(payload).await?;
        ensure_success(&reply)?;
        let content = reply.content()?;
        if content.is_empty() {
            warn!(worker = ctx.worker_id, "empty completion received");
        }
        Ok(Sent::default())
    }

    async fn send_fim(
        &self,
        w: &FimWorkload,
        ctx: &IterationContext,
        rng: &mut StdRng,
    ) -> Result<Sent, HarnessError> {
        let prefix = match self.prefixes.lock().get(&ctx.worker_id) {
            Some(prefix) => prefix.clone(),
            None => random(w.prefixes, rng)?.to_string(),
        };

        let payload = payload::fim_completion(&prefix, "", json!({ "max_tokens": w.max_tokens }));
        let reply = self.client.complete(payload).await?;
        ensure_success(&reply)?;
        let text = completion_text(&reply)?;

        let next = next_prefix(&prefix, &text, w, || random(w.prefixes, rng))?;
        debug!(worker = ctx.worker_id, chars = next.chars().count(), "prefix updated");
        let chars = next.chars().count() as f64;
        self.prefixes.lock().insert(ctx.worker_id, next);

        Ok(Sent {
            values: vec![("prefix_chars", chars)],
            ..Sent::default()
        })
    }

    async fn send_prefill(
        &self,
        w: &PrefillWorkload,
        ctx: &IterationContext,
        rng: &mut StdRng,
    ) -> Result<Sent, HarnessError> {
        let request_id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let doc = w
            .contexts
            .choose(rng)
            .ok_or_else(|| HarnessError::Config("empty context pool".into()))?;
        let question = random(doc.questions, rng)?;
        let context = doc.context.replace("## ", &format!("## [RequestID: {request_id}] "));

        let mut messages = vec![
            Message::system(format!(
                "You are a helpful, knowledgeable assistant. Request ID: {request_id}"
            )),
            Message::user(format!(
                "{context}\n\n[RequestID: {request_id}] Based on the above information, {question}"
            )),
        ];
        let turns = rng.gen_range(1..=w.max_turns.max(1));
        for i in 1..turns {
            messages.push(Message::assistant(format!(
                "[Simulated response {i} for request {request_id}] A previous answer kept to grow the conversation history."
            )));
            messages.push(Message::user(format!(
                "[Follow-up {i} for request {request_id}] {}",
                random(w.follow_ups, rng)?
            )));
        }

        let context_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        self.sink
            .add_trend("context_size_chars", context_chars as f64, Labels::new());
        debug!(worker = ctx.worker_id, %request_id, context_chars, turns, "prefill request");

        let payload = payload::chat_completion(
            &messages,
            json!({ "max_tokens": w.max_tokens, "temperature": w.temperature }),
        );
        let reply = self.client.chat_complete(payload).await?;
        ensure_success(&reply)?;
        reply.content()?;

        Ok(Sent {
            per_second: reply
                .usage
                .map(|u| vec![("token_processing_rate", u.prompt_tokens as f64)])
                .unwrap_or_default(),
            ..Sent::default()
        })
    }

    async fn send_decode(
        &self,
        w: &DecodeWorkload,
        ctx: &IterationContext,
        rng: &mut StdRng,
    ) -> Result<Sent, HarnessError> {
        let request_id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let (prompt, length) = w
            .prompts
            .choose(rng)
            .copied()
            .ok_or_else(|| HarnessError::Config("empty prompt pool".into()))?;
        let audience = random(w.audiences, rng)?;
        let angle = random(w.angles, rng)?;
        let max_tokens = w.max_tokens.unwrap_or_else(|| length.max_tokens());

        let messages = [
            Message::system(format!(
                "You are a helpful, thorough, and detailed assistant. When asked for information, provide comprehensive, well-structured responses. [Session: {request_id}]"
            )),
            Message::user(format!(
                "[RequestID: {request_id}] {prompt} Please prepare this {audience} {angle}."
            )),
        ];
        debug!(worker = ctx.worker_id, %request_id, max_tokens, "decode request");

        let payload = payload::chat_completion(
            &messages,
            json!({ "max_tokens": max_tokens, "temperature": w.temperature }),
        );
        let reply = self.client.chat_complete(payload).await?;
        ensure_success(&reply)?;
        reply.content()?;

        let mut sent = Sent {
            extra_pause: w.pause_per_token * u32::try_from(max_tokens).unwrap_or(u32::MAX),
            ..Sent::default()
        };
        if let Some(usage) = reply.usage {
            let tokens = usage.completion_tokens as f64;
            sent.values.push(("output_size_tokens", tokens));
            sent.per_second.push(("token_generation_rate", tokens));
        }
        Ok(sent)
    }

    async fn send_batch(&self, w: &BatchWorkload, ctx: &IterationContext) -> Result<Sent, HarnessError> {
        let inputs = w.inputs(ctx.iteration)?;
        let reply = self
            .client
            .embed(payload::multi_text_embedding(&inputs, Value::Null))
            .await?;
        ensure_success(&reply)?;
        let vectors = reply.embeddings()?;
        if vectors.len() != inputs.len() {
            warn!(
                worker = ctx.worker_id,
                sent = inputs.len(),
                received = vectors.len(),
                "batch size mismatch"
            );
        }

        let size = inputs.len() as f64;
        Ok(Sent {
            dimension: vectors.first().map(Vec::len),
            values: vec![("batch_size", size)],
            per_item: vec![("batch_embedding_latency_per_text", size)],
            ..Sent::default()
        })
    }

    async fn send_embedding(
        &self,
        w: &EmbedWorkload,
        ctx: &IterationContext,
        rng: &mut StdRng,
    ) -> Result<Sent, HarnessError> {
        let batch_size = match w.batch {
            Some(policy) if rng.gen_bool(policy.probability.clamp(0.0, 1.0)) => {
                Some(policy.sizes.pick(rng))
            }
            _ => None,
        };

        let (pool, cycled) = match w.texts {
            TextSource::Cycle(pool) => (pool, true),
            TextSource::Random(pool) => (pool, false),
            TextSource::ByWorker(tiers) => {
                let slot = ctx.worker_id + 1;
                let pool = if slot <= 5 {
                    tiers.short
                } else if slot <= 10 {
                    tiers.medium
                } else {
                    tiers.long
                };
                (pool, false)
            }
            TextSource::ByElapsed(tiers) => {
                let minutes = ctx.elapsed.as_secs_f64() / 60.0;
                let pool = if minutes < 5.0 {
                    tiers.short
                } else if minutes < 15.0 {
                    tiers.medium
                } else {
                    tiers.long
                };
                (pool, false)
            }
        };

        let dimension = match batch_size {
            Some(size) => {
                let inputs = (0..size)
                    .map(|_| random(pool, rng))
                    .collect::<Result<Vec<&str>, _>>()?;
                let reply = self
                    .client
                    .embed(payload::multi_text_embedding(&inputs, Value::Null))
                    .await?;
                ensure_success(&reply)?;
                reply.embeddings()?.first().map(Vec::len)
            }
            None => {
                let text = if cycled {
                    cycle(pool, ctx.iteration)?
                } else {
                    random(pool, rng)?
                };
                let reply = self
                    .client
                    .embed(payload::single_text_embedding(text, Value::Null))
                    .await?;
                ensure_success(&reply)?;
                Some(reply.content()?.len())
            }
        };

        if let Some(d) = dimension.filter(|d| *d < 10) {
            warn!(worker = ctx.worker_id, dimension = d, "unexpected embedding dimension");
        }

        Ok(Sent {
            batched: w.batch.map(|_| batch_size.is_some()),
            dimension,
            ..Sent::default()
        })
    }

    fn record_success(&self, ctx: &IterationContext, phase: Option<Phase>, sent: &Sent, latency_ms: f64) {
        let mut phase_labels = Labels::new();
        if let Some(phase) = phase {
            phase_labels.insert("phase".into(), phase.as_str().into());
        }

        let mut latency_labels = phase_labels.clone();
        let mut series = self.recording.latency_series;
        if let (Workload::Embed(EmbedWorkload { batch: Some(policy), .. }), Some(batched)) =
            (&self.workload, sent.batched)
        {
            if policy.tag {
                latency_labels.insert("batch".into(), if batched { "yes" } else { "no" }.into());
            }
            if batched {
                series = policy.latency_series;
            }
        }
        if let Some(levels) = &self.levels {
            latency_labels.insert(
                "vus".into(),
                levels.target_concurrency(ctx.elapsed).to_string(),
            );
        }
        self.sink.add_trend(series, latency_ms, latency_labels);

        for (name, value) in &sent.values {
            self.sink.add_trend(name, *value, Labels::new());
        }
        let secs = latency_ms / 1000.0;
        for (name, count) in &sent.per_second {
            if secs > 0.0 {
                self.sink.add_trend(name, count / secs, Labels::new());
            }
        }
        for (name, count) in &sent.per_item {
            if *count > 0.0 {
                self.sink.add_trend(name, latency_ms / count, Labels::new());
            }
        }

        if let Some(dimension) = sent.dimension {
            self.sink
                .add_trend("embedding_dimension", dimension as f64, Labels::new());
        }
        self.sink.add_counter("api_success", 1.0, phase_labels);

        if self.recording.hourly {
            let hour = (ctx.elapsed.as_secs() / 3600).to_string();
            let mut hourly = Labels::new();
            hourly.insert("hour".into(), hour);
            if let Some(batched) = sent.batched {
                hourly.insert("type".into(), if batched { "batch" } else { "single" }.into());
            }
            self.sink.add_counter("hourly_requests", 1.0, hourly);
        }

        if let (Some(phase), Some(detector)) = (phase, &self.detector) {
            let outcome =
                detector.observe(LatencyObservation::new(ctx.run_elapsed(), latency_ms, phase));
            if let Some(since) = outcome.since_recovery {
                self.sink
                    .add_trend("recovery_time", millis(since), Labels::new());
            }
        }
    }
}

#[async_trait]
impl IterationBody for WorkloadBody {
    async fn run(&self, ctx: &IterationContext) -> Result<Duration, HarnessError> {
        let phase = self.phase_at(ctx.elapsed);
        let mut rng = self.rng(ctx);
        let started = Instant::now();

        let sent = match &self.workload {
            Workload::Chat(w) => self.send_chat(w, ctx, phase, &mut rng).await,
            Workload::Embed(w) => self.send_embedding(w, ctx, &mut rng).await,
            Workload::Fim(w) => self.send_fim(w, ctx, &mut rng).await,
            Workload::Prefill(w) => self.send_prefill(w, ctx, &mut rng).await,
            Workload::Decode(w) => self.send_decode(w, ctx, &mut rng).await,
            Workload::Batch(w) => self.send_batch(w, ctx).await,
        };

        match sent {
            Ok(sent) => {
                let latency_ms = millis(started.elapsed());
                self.record_success(ctx, phase, &sent, latency_ms);
                debug!(
                    worker = ctx.worker_id,
                    iteration = ctx.iteration,
                    phase = phase.map_or("none", Phase::as_str),
                    latency_ms,
                    "iteration complete"
                );
                Ok(self.pacing.pause(phase, &mut rng) + sent.extra_pause)
            }
            Err(e) => {
                let mut labels = Labels::new();
                labels.insert("type".into(), e.kind().into());
                self.sink.add_counter("api_errors", 1.0, labels);
                Err(e)
            }
        }
    }

    fn backoff(&self, ctx: &IterationContext, _err: &HarnessError) -> Duration {
        self.pacing.backoff(self.phase_at(ctx.elapsed))
    }
}

fn ensure_success(reply: &ClientResponse) -> Result<(), HarnessError> {
    if reply.response.is_success() {
        Ok(())
    } else {
        Err(HarnessError::Status {
            status: reply.response.status,
            preview: preview(&reply.response.body),
        })
    }
}

/// `choices[0].text` of a plain completion, empty string included.
fn completion_text(reply: &ClientResponse) -> Result<String, HarnessError> {
    parse_json(&reply.response.body)
        .and_then(|body| body.pointer("/choices/0/text")?.as_str().map(str::to_string))
        .ok_or_else(|| {
            HarnessError::Decode(format!(
                "not a completion response: {}",
                preview(&reply.response.body)
            ))
        })
}

/// The prefix after `completion` came back for `current`.
///
/// An empty completion restarts from `fresh()`. A prefix over
/// `max_prefix_chars` keeps its first `keep_chars` characters.
fn next_prefix<F>(
    current: &str,
    completion: &str,
    w: &FimWorkload,
    fresh: F,
) -> Result<String, HarnessError>
where
    F: FnOnce() -> Result<&'static str, HarnessError>,
{
    let next = if completion.is_empty() {
        fresh()?.to_string()
    } else {
        format!("{current}{completion}")
    };
    if next.chars().count() > w.max_prefix_chars {
        return Ok(next.chars().take(w.keep_chars).collect());
    }
    Ok(next)
}

fn cycle(pool: &'static [&'static str], iteration: u64) -> Result<&'static str, HarnessError> {
    if pool.is_empty() {
        return Err(HarnessError::Config("empty input pool".into()));
    }
    Ok(pool[(iteration % pool.len() as u64) as usize])
}

fn random<R: Rng + ?Sized>(
    pool: &'static [&'static str],
    rng: &mut R,
) -> Result<&'static str, HarnessError> {
    pool.choose(rng)
        .copied()
        .ok_or_else(|| HarnessError::Config("empty input pool".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_range_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let range = PauseRange::millis(1000, 3000);
        for _ in 0..100 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(3000));
        }
        assert_eq!(PauseRange::ZERO.sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_stress_pacing_applies_only_in_stress() {
        let pacing = Pacing {
            pause: PauseRange::millis(1000, 1000),
            stress_pause: Some(PauseRange::millis(0, 0)),
            backoff: Duration::from_secs(1),
            stress_backoff: Some(Duration::from_secs(3)),
        };
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(pacing.pause(Some(Phase::Stress), &mut rng), Duration::ZERO);
        assert_eq!(pacing.pause(Some(Phase::Recovery), &mut rng), Duration::from_secs(1));
        assert_eq!(pacing.pause(None, &mut rng), Duration::from_secs(1));
        assert_eq!(pacing.backoff(Some(Phase::Stress)), Duration::from_secs(3));
        assert_eq!(pacing.backoff(Some(Phase::Baseline)), Duration::from_secs(1));
    }

    #[test]
    fn test_batch_sizes_pick_from_declared_set() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert!([2, 3, 5].contains(&BatchSizes::OneOf(&[2, 3, 5]).pick(&mut rng)));
            let n = BatchSizes::Between(2, 4).pick(&mut rng);
            assert!((2..=4).contains(&n));
        }
    }

    const FIM: FimWorkload = FimWorkload {
        prefixes: prompts::FIM_PREFIXES,
        max_tokens: 16,
        max_prefix_chars: 2000,
        keep_chars: 500,
    };

    #[test]
    fn test_prefix_grows_by_each_completion() {
        let next = next_prefix("def calculate_", "total(items):", &FIM, || Ok("unused")).unwrap();
        assert_eq!(next, "def calculate_total(items):");
    }

    #[test]
    fn test_empty_completion_restarts_prefix() {
        let next = next_prefix("class UserProfile:", "", &FIM, || Ok("-- SQL query to")).unwrap();
        assert_eq!(next, "-- SQL query to");
    }

    #[test]
    fn test_long_prefix_is_cut_back_to_its_head() {
        let current = "x".repeat(1995);
        let next = next_prefix(&current, "yyyyyy", &FIM, || Ok("unused")).unwrap();
        assert_eq!(next.chars().count(), 500);
        assert!(next.chars().all(|c| c == 'x'));

        let at_limit = next_prefix(&"x".repeat(1990), "0123456789", &FIM, || Ok("")).unwrap();
        assert_eq!(at_limit.chars().count(), 2000);
    }

    #[test]
    fn test_batch_inputs_cycle_sizes_and_windows() {
        let w = BatchWorkload {
            texts: &["a", "b", "c", "d"],
            sizes: &[2, 3, 5],
        };
        assert_eq!(w.inputs(0).unwrap(), vec!["b", "c", "d"]);
        assert_eq!(w.inputs(1).unwrap(), vec!["c", "d", "a", "b", "c"]);
        assert_eq!(w.inputs(2).unwrap(), vec!["d", "a"]);
        let empty = BatchWorkload { texts: &[], sizes: &[2] };
        assert!(empty.inputs(0).is_err());
    }

    #[test]
    fn test_cycle_wraps_and_rejects_empty_pool() {
        assert_eq!(cycle(prompts::SMOKE_PROMPTS, 4).unwrap(), "What is 2+2?");
        assert!(cycle(&[], 0).is_err());
    }
}
