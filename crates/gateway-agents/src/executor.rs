//! Reasoning-loop executor.
//!
//! Each session runs as its own tokio task. Per step it calls the current
//! chain entry, fails over along the priority chain on provider-scoped
//! failures, normalizes the reply and either executes a tool or finishes.
//! Cancellation, a dropped event receiver and the session deadline interrupt
//! any await point.

use crate::events::{SessionEvent, SessionFailure};
use crate::normalize::{Extracted, ExtractedToolCall, ResponseNormalizer};
use crate::notify::{NoOpNotifier, ProgressNotifier, ProgressTask};
use crate::pattern::{build_final_prompt, PatternRegistry, PromptContext, ReasoningPattern};
use crate::recovery::{NotRecoverableKind, RecoveredAction, Recovery, RecoveryInterceptor};
use crate::session::{ScratchpadEntry, Session, SessionState};
use crate::tools::{NoTools, ToolError, ToolExecutor};
use futures::Stream;
use gateway_config::{AgentDefinition, BackoffSettings, ConfigSnapshot, EngineSettings, ModelTarget, ProgressStep};
use gateway_core::{
    AttemptFailure, ChatMessage, FailureClass, GatewayError, GatewayResult, ModelReply,
    ModelRequest, RequestOptions, SessionId, ToolChoice, ToolDefinition,
};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{
    BackoffConfig, BackoffPolicy, CredentialBroker, KeyManager, KeyManagerConfig, ReleaseOutcome,
};
use gateway_routing::{InMemoryRotationCursor, PriorityChain, RotationCursor, RotationManager};
use gateway_telemetry::{AuditEvent, AuditEventType, AuditOutcome, AuditSink, GatewayMetrics, TracingAuditSink};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Appended to the last call once the step budget is used up
const FINAL_ANSWER_INSTRUCTION: &str = "You have used every available reasoning step. \
Do not call any tools. Using the observations above, write your final answer now.";

/// Executor limits and timeouts
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Tool steps before the forced final answer
    pub max_steps: usize,
    /// Upstream calls allowed per step
    pub max_chain_attempts: usize,
    /// Bounded wait for one upstream call
    pub upstream_timeout: Duration,
    /// Bounded wait for one tool call
    pub tool_timeout: Duration,
    /// Whole-session deadline
    pub session_timeout: Option<Duration>,
    /// Progress messages while a tool runs
    pub progress: Vec<ProgressStep>,
    /// Event channel capacity
    pub event_buffer: usize,
    /// Tool that receives heuristic query lists
    pub query_tool: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for ExecutorConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            max_chain_attempts: settings.max_chain_attempts.max(1),
            upstream_timeout: settings.upstream_timeout,
            tool_timeout: settings.tool_timeout,
            session_timeout: settings.session_timeout,
            progress: settings.progress.clone(),
            event_buffer: settings.event_buffer.max(1),
            query_tool: settings.query_tool.clone(),
        }
    }
}

/// Backoff policy for configured settings
#[must_use]
pub fn backoff_policy(settings: &BackoffSettings) -> BackoffPolicy {
    BackoffPolicy::new(BackoffConfig {
        base_delay: settings.initial_delay,
        max_delay: settings.max_delay,
        multiplier: settings.multiplier,
        jitter: if settings.jitter { 0.25 } else { 0.0 },
    })
}

struct ExecutorInner {
    snapshot: Arc<ConfigSnapshot>,
    rotation: RotationManager,
    broker: Arc<dyn CredentialBroker>,
    providers: ProviderRegistry,
    tools: Arc<dyn ToolExecutor>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn ProgressNotifier>,
    metrics: Option<GatewayMetrics>,
    backoff: BackoffPolicy,
    patterns: PatternRegistry,
    normalizer: ResponseNormalizer,
    recovery: RecoveryInterceptor,
    config: ExecutorConfig,
}

/// Runs reasoning sessions
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("providers", &self.inner.providers.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Create a builder over a configuration snapshot
    #[must_use]
    pub fn builder(snapshot: Arc<ConfigSnapshot>) -> ExecutorBuilder {
        ExecutorBuilder::new(snapshot)
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Start a session for an agent name or alias.
    ///
    /// # Errors
    /// Returns a validation error if the agent is unknown.
    pub fn start_session(
        &self,
        agent: &str,
        history: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> GatewayResult<SessionHandle> {
        let definition = self.inner.snapshot.agent(agent).cloned().ok_or_else(|| {
            GatewayError::validation(
                format!("unknown agent: {agent}"),
                Some("agent".to_string()),
                "unknown_agent",
            )
        })?;

        let id = SessionId::generate();
        let (sender, receiver) = mpsc::channel(self.inner.config.event_buffer);
        let cancel = CancellationToken::new();
        let deadline = self.inner.config.session_timeout.map(|t| Instant::now() + t);

        info!(
            session_id = %id,
            agent = %definition.name,
            messages = history.len(),
            "Session started"
        );

        let run = SessionRun {
            inner: Arc::clone(&self.inner),
            session: Session::new(id.clone(), definition.name.clone(), history),
            agent: definition,
            options,
            events: sender,
            cancel: cancel.clone(),
            deadline,
            chain: PriorityChain::new(Vec::new(), Vec::new(), 0),
            pattern: Arc::new(ReasoningPattern::simple()),
            system_prompt: String::new(),
            offered: Vec::new(),
        };
        tokio::spawn(run.drive());

        Ok(SessionHandle {
            id,
            events: receiver,
            cancel,
        })
    }
}

/// Builder for [`Executor`]
pub struct ExecutorBuilder {
    snapshot: Arc<ConfigSnapshot>,
    cursor: Option<Arc<dyn RotationCursor>>,
    broker: Option<Arc<dyn CredentialBroker>>,
    providers: Option<ProviderRegistry>,
    tools: Option<Arc<dyn ToolExecutor>>,
    audit: Option<Arc<dyn AuditSink>>,
    notifier: Option<Arc<dyn ProgressNotifier>>,
    metrics: Option<GatewayMetrics>,
    backoff: Option<BackoffPolicy>,
    config: Option<ExecutorConfig>,
}

impl ExecutorBuilder {
    fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            snapshot,
            cursor: None,
            broker: None,
            providers: None,
            tools: None,
            audit: None,
            notifier: None,
            metrics: None,
            backoff: None,
            config: None,
        }
    }

    /// Set the rotation cursor
    #[must_use]
    pub fn rotation_cursor(mut self, cursor: Arc<dyn RotationCursor>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Set the credential broker
    #[must_use]
    pub fn credential_broker(mut self, broker: Arc<dyn CredentialBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Set the provider registry
    #[must_use]
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Set the tool executor
    #[must_use]
    pub fn tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set the audit sink
    #[must_use]
    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set the progress notifier
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Record Prometheus metrics
    #[must_use]
    pub fn metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Override the fail-over backoff
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Override the engine settings from the snapshot
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the executor.
    ///
    /// Unset parts default to: in-process cursor, a key manager over the
    /// snapshot's credentials, one HTTP client per provider, no tools,
    /// tracing audit sink, no progress notifications, no metrics.
    ///
    /// # Errors
    /// Returns error if a provider client cannot be created
    pub fn build(self) -> GatewayResult<Executor> {
        let snapshot = self.snapshot;
        let config = self
            .config
            .unwrap_or_else(|| ExecutorConfig::from(snapshot.engine()));

        let cursor = self
            .cursor
            .unwrap_or_else(|| Arc::new(InMemoryRotationCursor::new()));
        let broker = match self.broker {
            Some(broker) => broker,
            None => {
                let keys = snapshot.keys();
                let manager_config = KeyManagerConfig::default()
                    .with_quarantine_enabled(keys.quarantine_enabled)
                    .with_quarantine_duration(keys.quarantine_duration)
                    .with_sweep_interval(keys.sweep_interval);
                Arc::new(KeyManager::new(manager_config, snapshot.credentials().clone()))
            }
        };
        let providers = match self.providers {
            Some(providers) => providers,
            None => ProviderRegistry::from_snapshot(&snapshot, config.upstream_timeout)?,
        };
        let backoff = self
            .backoff
            .unwrap_or_else(|| backoff_policy(&snapshot.engine().backoff));
        let normalizer = ResponseNormalizer::new(config.query_tool.clone());

        Ok(Executor {
            inner: Arc::new(ExecutorInner {
                rotation: RotationManager::new(Arc::clone(&snapshot), cursor),
                patterns: PatternRegistry::from_snapshot(&snapshot),
                snapshot,
                broker,
                providers,
                tools: self.tools.unwrap_or_else(|| Arc::new(NoTools)),
                audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(NoOpNotifier)),
                metrics: self.metrics,
                backoff,
                recovery: RecoveryInterceptor::new(normalizer.clone()),
                normalizer,
                config,
            }),
        })
    }
}

/// Client side of a running session.
///
/// Yields events in order; dropping the handle cancels the session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Session id
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event, `None` once the session is over
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Drain the remaining events and return the final answer
    ///
    /// # Errors
    /// Returns the session's terminal failure
    pub async fn outcome(mut self) -> Result<String, SessionFailure> {
        while let Some(event) = self.events.recv().await {
            match event {
                SessionEvent::Final { text } => return Ok(text),
                SessionEvent::Failed(failure) => return Err(failure),
                _ => {}
            }
        }
        Err(SessionFailure::from(&GatewayError::internal(
            "session ended without a terminal event",
        )))
    }
}

impl Stream for SessionHandle {
    type Item = SessionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// What interrupted an await point
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Cancelled,
    Deadline,
}

/// How a step's model call is made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallMode {
    WithTools,
    FinalAnswer,
}

/// Usable result of a step's model call
enum StepReply {
    Reply(ModelReply),
    Recovered(RecoveredAction),
}

struct SessionRun {
    inner: Arc<ExecutorInner>,
    agent: AgentDefinition,
    session: Session,
    options: RequestOptions,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    chain: PriorityChain,
    pattern: Arc<ReasoningPattern>,
    system_prompt: String,
    offered: Vec<ToolDefinition>,
}

impl SessionRun {
    async fn drive(mut self) {
        let result = self.run().await;
        let agent = self.agent.name.clone();
        let session_id = self.session.id().clone();

        let event = match result {
            Ok(text) => {
                self.session.transition(SessionState::Succeeded);
                info!(
                    session_id = %session_id,
                    agent = %agent,
                    steps = self.session.step(),
                    elapsed_ms = self.session.elapsed().as_millis() as u64,
                    "Session completed"
                );
                self.record_session("success");
                self.audit(AuditEventType::SessionCompleted, None, AuditOutcome::Success, |b| b);
                SessionEvent::Final { text }
            }
            Err(error) => {
                self.session.transition(SessionState::Failed);
                let failure = SessionFailure::from(&error);
                match error {
                    GatewayError::SessionCancelled => {
                        info!(session_id = %session_id, agent = %agent, "Session cancelled");
                    }
                    _ => warn!(
                        session_id = %session_id,
                        agent = %agent,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Session failed"
                    ),
                }
                self.record_session(failure.kind.as_str());
                let kind = failure.kind;
                self.audit(AuditEventType::SessionFailed, None, AuditOutcome::Failure, |b| {
                    b.metadata("kind", kind.as_str())
                });
                SessionEvent::Failed(failure)
            }
        };

        if self.events.send(event).await.is_err() {
            debug!(session_id = %session_id, "Client went away before the terminal event");
        }
    }

    async fn run(&mut self) -> GatewayResult<String> {
        self.prepare().await?;

        let max_steps = self.inner.config.max_steps;
        while self.session.step() < u32::try_from(max_steps).unwrap_or(u32::MAX) {
            let step = self.session.begin_step();
            self.audit(AuditEventType::StepStarted, Some(step), AuditOutcome::Unknown, |b| b);

            match self.call_with_failover(step, CallMode::WithTools).await? {
                StepReply::Reply(reply) => match self.inner.normalizer.extract_structured(&reply) {
                    Extracted::ToolCall(call) => {
                        let thought = thought_text(&reply, &call);
                        if !thought.is_empty() {
                            self.session.record(ScratchpadEntry::Thought(thought.clone()));
                            self.emit(SessionEvent::Thought { step, text: thought }).await?;
                        }
                        self.session.record(ScratchpadEntry::Action {
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                        });
                        self.run_tool(step, call).await?;
                    }
                    Extracted::PlainText(text) => return Ok(text),
                },
                StepReply::Recovered(RecoveredAction::ExecuteTool { call, generation }) => {
                    self.session.record(ScratchpadEntry::Generation(generation));
                    self.run_tool(step, call).await?;
                }
                StepReply::Recovered(RecoveredAction::Answer { text }) => return Ok(text),
            }
        }

        info!(
            session_id = %self.session.id(),
            max_steps,
            "Step budget used up, requesting final answer"
        );
        let step = self.session.begin_step();
        self.audit(AuditEventType::StepStarted, Some(step), AuditOutcome::Unknown, |b| {
            b.metadata("final_answer", true)
        });
        match self.call_with_failover(step, CallMode::FinalAnswer).await? {
            StepReply::Reply(reply) => Ok(reply.text_or_empty().trim().to_string()),
            StepReply::Recovered(RecoveredAction::Answer { text }) => Ok(text),
            // no tools are offered on this call, so recovery never yields one
            StepReply::Recovered(RecoveredAction::ExecuteTool { call, .. }) => Err(GatewayError::internal(
                format!("tool call {} recovered on the final-answer call", call.name),
            )),
        }
    }

    /// Build the chain, offered tools and system prompt
    async fn prepare(&mut self) -> GatewayResult<()> {
        self.chain = self.inner.rotation.build_chain(&self.agent).await;
        if self.chain.is_empty() {
            return Err(GatewayError::configuration(format!(
                "agent {} has no routable models",
                self.agent.name
            )));
        }

        let policy = &self.agent.settings.tools;
        self.offered = if policy.enabled {
            self.inner
                .tools
                .definitions()
                .into_iter()
                .filter(|tool| policy.permits(tool.name()))
                .collect()
        } else {
            Vec::new()
        };

        self.pattern = self.inner.patterns.resolve(&self.agent.settings.reasoning_mode);
        let context = PromptContext::for_tools(
            &self.offered,
            self.agent.settings.system_instruction.as_deref(),
        );
        self.system_prompt = build_final_prompt(
            &self.pattern.render(&context),
            self.session.client_instruction(),
            self.options.server_instruction.as_deref(),
        );

        self.session.transition(SessionState::StepPending);
        self.audit(AuditEventType::SessionStarted, None, AuditOutcome::Unknown, |b| {
            b.metadata("pattern", self.pattern.name())
                .metadata("chain", self.chain.entries().iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
                .metadata("tools", self.offered.len())
        });
        Ok(())
    }

    /// One step's model call, failing over along the chain
    async fn call_with_failover(&mut self, step: u32, mode: CallMode) -> GatewayResult<StepReply> {
        let max_calls = self.inner.config.max_chain_attempts;
        let mut calls = 0usize;
        let mut failovers = 0u32;
        let mut failures: Vec<AttemptFailure> = Vec::new();
        let mut json_mode = self.options.json_mode.unwrap_or(self.agent.settings.json_mode);
        let mut backoff_pending = false;

        loop {
            if calls >= max_calls {
                warn!(
                    session_id = %self.session.id(),
                    step,
                    calls,
                    "Attempt bound reached for step"
                );
                return Err(GatewayError::ChainExhausted { attempts: failures });
            }
            let Some(target) = self.chain.current().cloned() else {
                return Err(GatewayError::ChainExhausted { attempts: failures });
            };

            if backoff_pending {
                backoff_pending = false;
                let delay = self.inner.backoff.delay_for_attempt(failovers.saturating_sub(1));
                if !delay.is_zero() {
                    self.guarded(tokio::time::sleep(delay)).await.map_err(|i| self.interrupted(i))?;
                }
            }

            let request = self.build_request(&target, mode, json_mode)?;
            let Some(model) = self.inner.providers.get(&target.provider) else {
                let error = GatewayError::configuration(format!(
                    "no client registered for provider {}",
                    target.provider
                ));
                self.fail_over(step, &target, &error, &mut failures);
                failovers += 1;
                backoff_pending = true;
                continue;
            };

            let requires_key = self
                .inner
                .snapshot
                .provider(&target.provider)
                .map_or(true, |p| p.requires_key);
            let credential = if requires_key {
                let acquired = self
                    .guarded(self.inner.broker.acquire(&target.provider))
                    .await
                    .map_err(|i| self.interrupted(i))?;
                match acquired {
                    Ok(credential) => Some(credential),
                    Err(error) => {
                        self.fail_over(step, &target, &error, &mut failures);
                        failovers += 1;
                        backoff_pending = true;
                        continue;
                    }
                }
            } else {
                None
            };

            self.session.transition(SessionState::AwaitingModel);
            debug!(
                session_id = %self.session.id(),
                step,
                provider = %target.provider,
                model = %target.name,
                key = %credential.as_ref().map_or_else(|| "none".to_string(), |c| c.masked()),
                json_mode = request.json_mode,
                "Calling upstream"
            );

            let upstream_timeout = self.inner.config.upstream_timeout;
            let call = tokio::time::timeout(upstream_timeout, model.complete(credential.as_ref(), &request));
            let result = match self.guarded(call).await {
                Ok(Ok(result)) => result,
                Ok(Err(_elapsed)) => Err(GatewayError::timeout(&target.provider, upstream_timeout)),
                Err(interrupt) => {
                    if let Some(credential) = credential {
                        self.inner.broker.release(credential, ReleaseOutcome::Success).await;
                    }
                    return Err(self.interrupted(interrupt));
                }
            };
            calls += 1;

            if let Some(credential) = credential {
                self.inner.broker.release(credential, release_outcome(&result)).await;
            }
            let label = result
                .as_ref()
                .err()
                .and_then(GatewayError::failure_class)
                .map_or_else(|| "success".to_string(), |c| c.to_string());
            self.record_upstream(&target.provider, &label);
            self.audit(
                AuditEventType::UpstreamAttempt,
                Some(step),
                if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure },
                |b| {
                    b.metadata("provider", &target.provider)
                        .metadata("model", &target.name)
                        .metadata("result", &label)
                },
            );
            self.session.transition(SessionState::StepPending);

            let error = match result {
                Ok(reply) => return Ok(StepReply::Reply(reply)),
                Err(error) => error,
            };

            if let GatewayError::MalformedUpstreamResponse {
                status_code, body, ..
            } = &error
            {
                let offered: Vec<String> = match mode {
                    CallMode::WithTools => self.offered.iter().map(|t| t.name().to_string()).collect(),
                    CallMode::FinalAnswer => Vec::new(),
                };
                match self.inner.recovery.try_recover(*status_code, body, &offered) {
                    Recovery::Recovered(action) => {
                        info!(
                            session_id = %self.session.id(),
                            step,
                            provider = %target.provider,
                            "Recovered malformed upstream response"
                        );
                        self.record_recovery(&target.provider, "recovered");
                        self.audit(AuditEventType::RecoveryApplied, Some(step), AuditOutcome::Success, |b| {
                            b.metadata("provider", &target.provider).metadata(
                                "action",
                                match &action {
                                    RecoveredAction::ExecuteTool { .. } => "execute_tool",
                                    RecoveredAction::Answer { .. } => "answer",
                                },
                            )
                        });
                        return Ok(StepReply::Recovered(action));
                    }
                    Recovery::NotRecoverable(NotRecoverableKind::JsonModeUnsupported)
                        if request.json_mode =>
                    {
                        info!(
                            session_id = %self.session.id(),
                            provider = %target.provider,
                            "Upstream rejected JSON mode, retrying without it"
                        );
                        self.record_recovery(&target.provider, NotRecoverableKind::JsonModeUnsupported.as_str());
                        json_mode = false;
                        record_failure(&mut failures, &target, &error);
                        continue;
                    }
                    Recovery::NotRecoverable(kind) => {
                        self.record_recovery(&target.provider, kind.as_str());
                    }
                }
            }

            self.fail_over(step, &target, &error, &mut failures);
            failovers += 1;
            backoff_pending = true;
        }
    }

    /// Record a failed entry and move down the chain
    fn fail_over(
        &mut self,
        step: u32,
        target: &ModelTarget,
        error: &GatewayError,
        failures: &mut Vec<AttemptFailure>,
    ) {
        record_failure(failures, target, error);
        let class = error
            .failure_class()
            .map_or_else(|| "provider".to_string(), |c| c.to_string());
        let next = self.chain.advance().map(|t| t.name.clone());
        warn!(
            session_id = %self.session.id(),
            step,
            provider = %target.provider,
            model = %target.name,
            reason = %class,
            next = next.as_deref().unwrap_or("none"),
            "Failing over"
        );
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_chain_advance(&self.agent.name, &class);
        }
        self.audit(AuditEventType::ChainAdvanced, Some(step), AuditOutcome::Failure, |b| {
            b.metadata("from", &target.name)
                .metadata("to", next.as_deref())
                .metadata("reason", &class)
        });
    }

    fn build_request(
        &self,
        target: &ModelTarget,
        mode: CallMode,
        json_mode: bool,
    ) -> GatewayResult<ModelRequest> {
        let mut messages = self
            .session
            .messages(&self.system_prompt, self.pattern.continue_prompt());
        let tools = match mode {
            CallMode::WithTools => self.offered.clone(),
            CallMode::FinalAnswer => {
                messages.push(ChatMessage::user(FINAL_ANSWER_INSTRUCTION));
                Vec::new()
            }
        };
        let has_tools = !tools.is_empty();

        ModelRequest::builder()
            .model(&target.model_id)
            .messages(messages)
            .temperature(self.options.temperature.or(target.capabilities.temperature))
            .top_p(self.options.top_p)
            .max_tokens(self.options.max_tokens)
            .tools(tools)
            .tool_choice(has_tools.then_some(ToolChoice::Auto))
            // one tool call is executed per step
            .parallel_tool_calls((has_tools && target.capabilities.parallel_tool_calls).then_some(false))
            .json_mode(json_mode && target.capabilities.json_mode)
            .build()
    }

    async fn run_tool(&mut self, step: u32, call: ExtractedToolCall) -> GatewayResult<()> {
        self.session.transition(SessionState::ToolExecuting);
        let offered = self.offered.iter().any(|t| t.name() == call.name);

        let result = if offered {
            let tools = Arc::clone(&self.inner.tools);
            let name = call.name.clone();
            let arguments = call.arguments.clone();
            let tool_timeout = self.inner.config.tool_timeout;
            let mut task = tokio::spawn(async move {
                tokio::time::timeout(tool_timeout, tools.execute_tool(&name, arguments)).await
            });
            let mut progress = ProgressTask::spawn(
                Arc::clone(&self.inner.notifier),
                self.session.id().clone(),
                self.inner.config.progress.clone(),
            );

            let joined = self.guarded(&mut task).await;
            progress.stop();
            match joined {
                Err(interrupt) => {
                    task.abort();
                    return Err(self.interrupted(interrupt));
                }
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(_elapsed))) => Err(ToolError::Timeout(tool_timeout)),
                Ok(Err(join_error)) => Err(ToolError::Failed(format!("tool task failed: {join_error}"))),
            }
        } else {
            Err(ToolError::NotFound(call.name.clone()))
        };

        let (content, outcome) = match result {
            Ok(output) => (output, "success"),
            Err(error) => {
                warn!(
                    session_id = %self.session.id(),
                    step,
                    tool = %call.name,
                    error = %error,
                    "Tool call failed"
                );
                let kind = error.kind();
                (format!("Error: {error}"), kind)
            }
        };
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_tool(&call.name, outcome);
        }
        self.audit(
            AuditEventType::ToolExecuted,
            Some(step),
            if outcome == "success" { AuditOutcome::Success } else { AuditOutcome::Failure },
            |b| b.metadata("tool", &call.name).metadata("result", outcome),
        );

        self.session.record(ScratchpadEntry::Observation {
            tool: call.name.clone(),
            content: content.clone(),
        });
        self.session.transition(SessionState::StepPending);
        self.emit(SessionEvent::Observation {
            step,
            tool: call.name,
            arguments: call.arguments,
            content,
        })
        .await
    }

    /// Await `future` unless the session is cancelled, abandoned or out of time
    async fn guarded<F: Future>(&self, future: F) -> Result<F::Output, Interrupt> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            () = self.events.closed() => Err(Interrupt::Cancelled),
            () = deadline => Err(Interrupt::Deadline),
            output = future => Ok(output),
        }
    }

    fn interrupted(&self, interrupt: Interrupt) -> GatewayError {
        match interrupt {
            Interrupt::Cancelled => GatewayError::SessionCancelled,
            Interrupt::Deadline => {
                let elapsed = self.inner.config.session_timeout.unwrap_or_default();
                error!(session_id = %self.session.id(), ?elapsed, "Session deadline passed");
                GatewayError::SessionTimeout { elapsed }
            }
        }
    }

    async fn emit(&self, event: SessionEvent) -> GatewayResult<()> {
        match self.guarded(self.events.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_closed)) => Err(GatewayError::SessionCancelled),
            Err(interrupt) => Err(self.interrupted(interrupt)),
        }
    }

    fn audit<F>(&self, event_type: AuditEventType, step: Option<u32>, outcome: AuditOutcome, extend: F)
    where
        F: FnOnce(gateway_telemetry::AuditEventBuilder) -> gateway_telemetry::AuditEventBuilder,
    {
        let mut builder = AuditEvent::builder(event_type, self.session.id().as_str(), &self.agent.name)
            .outcome(outcome);
        if let Some(step) = step {
            builder = builder.step(step);
        }
        self.inner.audit.emit(extend(builder).build());
    }

    fn record_upstream(&self, provider: &str, outcome: &str) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_upstream(provider, outcome);
        }
    }

    fn record_recovery(&self, provider: &str, result: &str) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_recovery(provider, result);
        }
    }

    fn record_session(&self, status: &str) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_session(&self.agent.name, status);
        }
    }
}

/// Credential release outcome for a finished upstream call
fn release_outcome(result: &GatewayResult<ModelReply>) -> ReleaseOutcome {
    match result {
        Ok(_) | Err(GatewayError::MalformedUpstreamResponse { .. }) => ReleaseOutcome::Success,
        Err(GatewayError::RateLimited { .. }) => ReleaseOutcome::RateLimited,
        Err(GatewayError::Authentication { message, .. }) => ReleaseOutcome::Revoked(message.clone()),
        Err(_) => ReleaseOutcome::RecoverableError,
    }
}

/// Keep the last failure per provider/model pair
fn record_failure(failures: &mut Vec<AttemptFailure>, target: &ModelTarget, error: &GatewayError) {
    let failure = AttemptFailure {
        provider: target.provider.clone(),
        model: target.name.clone(),
        class: error.failure_class().unwrap_or(FailureClass::Provider),
        message: error.public_message(),
    };
    match failures
        .iter_mut()
        .find(|f| f.provider == failure.provider && f.model == failure.model)
    {
        Some(existing) => *existing = failure,
        None => failures.push(failure),
    }
}

/// Model text to surface alongside a tool call
fn thought_text(reply: &ModelReply, call: &ExtractedToolCall) -> String {
    if let Some(reasoning) = reply.reasoning.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        return reasoning.to_string();
    }
    let text = reply.text_or_empty();
    if call.id.is_some() {
        return text.trim().to_string();
    }
    let cut = ["{", "```", "["]
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    text[..cut].trim().to_string()
}
