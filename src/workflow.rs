//! The RAG workflow state machine.
//!
//! Three stages run in a fixed line — `ProcessInput → RetrieveContext →
//! GenerateResponse` — and every stage has exactly one success edge and
//! one error edge, so the workflow can never stall in an undefined state.
//! Routing is a pure function over the conversation state ([`route`]),
//! which keeps the whole graph unit-testable stage by stage.
//!
//! Errors are normalized at each stage boundary into the state's single
//! `error` slot. The orchestrator never retries; retries happen inside the
//! retriever and synthesizer against the gateways.

use tracing::{error, info};

use crate::models::{RetrievalMatch, SourceRef};
use crate::retriever::Retriever;
use crate::synthesize::Synthesizer;

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Where the workflow goes after the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Retrieve,
    Generate,
    Complete,
    Fail,
}

/// Mutable record threaded through the stages of one query. Created at the
/// start of a run and discarded at the end; callers that want multi-turn
/// behavior carry `messages` forward into the next run themselves.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub query: String,
    pub messages: Vec<Message>,
    pub context_chunks: Vec<RetrievalMatch>,
    pub sources: Vec<SourceRef>,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub next_action: Option<Action>,
}

impl ConversationState {
    pub fn new(query: &str, history: Vec<Message>) -> Self {
        Self {
            query: query.to_string(),
            messages: history,
            context_chunks: Vec::new(),
            sources: Vec::new(),
            answer: None,
            error: None,
            next_action: None,
        }
    }

    fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.next_action = Some(Action::Fail);
    }
}

/// The workflow's named stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ProcessInput,
    RetrieveContext,
    GenerateResponse,
}

/// Routing result: continue to another stage or terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Next(Stage),
    Done,
    Failed,
}

/// Pure, total routing function. Every `(stage, state)` pair yields exactly
/// one outcome: the stage's single success edge, or `Failed`.
pub fn route(stage: Stage, state: &ConversationState) -> Outcome {
    if state.next_action == Some(Action::Fail) || state.next_action.is_none() {
        return Outcome::Failed;
    }
    match stage {
        Stage::ProcessInput => Outcome::Next(Stage::RetrieveContext),
        Stage::RetrieveContext => Outcome::Next(Stage::GenerateResponse),
        Stage::GenerateResponse => Outcome::Done,
    }
}

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub score_threshold: f32,
    pub max_context_chars: usize,
    pub max_query_chars: usize,
}

/// Sequences the retriever and synthesizer over a [`ConversationState`].
pub struct Orchestrator {
    retriever: Retriever,
    synthesizer: Synthesizer,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        retriever: Retriever,
        synthesizer: Synthesizer,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            retriever,
            synthesizer,
            settings,
        }
    }

    /// Run one query through the workflow. Always returns a terminal state:
    /// either `answer` is set and `error` is `None`, or `error` is set and
    /// no answer is attached.
    pub async fn run(&self, query: &str, history: Vec<Message>) -> ConversationState {
        let mut state = ConversationState::new(query, history);
        let mut stage = Stage::ProcessInput;

        loop {
            state = match stage {
                Stage::ProcessInput => self.process_input(state),
                Stage::RetrieveContext => self.retrieve_context(state).await,
                Stage::GenerateResponse => self.generate_response(state).await,
            };

            match route(stage, &state) {
                Outcome::Next(next) => stage = next,
                Outcome::Done => break,
                Outcome::Failed => {
                    self.handle_error(&mut state);
                    break;
                }
            }
        }

        state
    }

    fn process_input(&self, mut state: ConversationState) -> ConversationState {
        let trimmed = state.query.trim();
        if trimmed.is_empty() {
            state.fail("invalid input: query must not be empty".to_string());
            return state;
        }
        if state.query.chars().count() > self.settings.max_query_chars {
            state.fail(format!(
                "invalid input: query exceeds {} characters",
                self.settings.max_query_chars
            ));
            return state;
        }

        state.messages.push(Message {
            role: Role::User,
            content: state.query.clone(),
        });
        state.next_action = Some(Action::Retrieve);
        info!(query_chars = state.query.chars().count(), "input accepted");
        state
    }

    async fn retrieve_context(&self, mut state: ConversationState) -> ConversationState {
        match self
            .retriever
            .retrieve(
                &state.query,
                self.settings.top_k,
                self.settings.score_threshold,
            )
            .await
        {
            Ok(matches) => {
                state.sources = matches
                    .iter()
                    .map(|m| SourceRef {
                        source_path: m.source_path.clone(),
                        score: m.score,
                    })
                    .collect();
                state.context_chunks = matches;
                state.next_action = Some(Action::Generate);
                info!(chunks = state.context_chunks.len(), "context retrieved");
            }
            Err(e) => {
                error!(error = %e, "retrieval failed");
                state.fail(e.to_string());
            }
        }
        state
    }

    async fn generate_response(&self, mut state: ConversationState) -> ConversationState {
        match self
            .synthesizer
            .synthesize(
                &state.query,
                &state.context_chunks,
                self.settings.max_context_chars,
            )
            .await
        {
            Ok(artifact) => {
                state.messages.push(Message {
                    role: Role::Assistant,
                    content: artifact.answer.clone(),
                });
                state.answer = Some(artifact.answer);
                state.sources = artifact.sources;
                state.next_action = Some(Action::Complete);
                info!("response generated");
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                state.fail(e.to_string());
            }
        }
        state
    }

    fn handle_error(&self, state: &mut ConversationState) {
        let summary = state
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        state.messages.push(Message {
            role: Role::Assistant,
            content: format!(
                "I encountered an error while processing your request: {}",
                summary
            ),
        });
        error!(error = %summary, "workflow terminated in error state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RagError, Result};
    use crate::gateway::memory::InMemoryVectorStore;
    use crate::gateway::{LanguageGateway, VectorRecord, VectorStore};
    use crate::retry::BackoffPolicy;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Deterministic gateway: embeds to a unit axis keyed by a marker word
    /// in the text, generates a fixed answer.
    struct StubGateway {
        fail_generation: bool,
    }

    fn axis_for(text: &str) -> Vec<f32> {
        if text.contains("venice") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        }
    }

    #[async_trait]
    impl LanguageGateway for StubGateway {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(axis_for(text))
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| axis_for(t)).collect())
        }
        async fn generate(&self, _: &str, _: u32, _: f32) -> Result<String> {
            if self.fail_generation {
                Err(RagError::TransientUpstream("generation 503".into()))
            } else {
                Ok("The merchant lived in Venice.".to_string())
            }
        }
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            top_k: 3,
            score_threshold: 0.5,
            max_context_chars: 4000,
            max_query_chars: 100,
        }
    }

    async fn orchestrator(fail_generation: bool) -> Orchestrator {
        let gateway: Arc<dyn LanguageGateway> = Arc::new(StubGateway { fail_generation });
        let store = Arc::new(InMemoryVectorStore::new("test"));
        store
            .insert(&[VectorRecord {
                chunk_id: "c0".to_string(),
                vector: vec![1.0, 0.0],
                text: "the merchant of venice text".to_string(),
                source_path: "plays/merchant.txt".to_string(),
            }])
            .await
            .unwrap();

        let backoff = BackoffPolicy::new(2, Duration::from_millis(1));
        Orchestrator::new(
            Retriever::new(gateway.clone(), store, backoff),
            Synthesizer::new(gateway, backoff, 256, 0.7),
            settings(),
        )
    }

    #[tokio::test]
    async fn successful_run_produces_answer_and_history() {
        let orch = orchestrator(false).await;
        let state = orch.run("where did the merchant of venice live?", vec![]).await;

        assert!(state.error.is_none());
        assert_eq!(state.answer.as_deref(), Some("The merchant lived in Venice."));
        assert_eq!(state.next_action, Some(Action::Complete));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].source_path, "plays/merchant.txt");
    }

    #[tokio::test]
    async fn empty_query_fails_validation() {
        let orch = orchestrator(false).await;
        let state = orch.run("   ", vec![]).await;

        assert!(state.answer.is_none());
        let err = state.error.unwrap();
        assert!(err.contains("must not be empty"));
        assert_eq!(state.next_action, Some(Action::Fail));
    }

    #[tokio::test]
    async fn oversized_query_fails_validation() {
        let orch = orchestrator(false).await;
        let state = orch.run(&"q".repeat(200), vec![]).await;
        assert!(state.error.unwrap().contains("exceeds"));
    }

    #[tokio::test]
    async fn generation_failure_reaches_error_state_without_answer() {
        let orch = orchestrator(true).await;
        let state = orch.run("where did the merchant of venice live?", vec![]).await;

        assert!(state.answer.is_none());
        assert!(state.error.unwrap().contains("generation failed"));
        // Error summary is appended to the conversation as an assistant turn.
        assert_eq!(state.messages.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn history_is_carried_forward() {
        let orch = orchestrator(false).await;
        let history = vec![Message {
            role: Role::User,
            content: "earlier turn".to_string(),
        }];
        let state = orch.run("venice?", history).await;
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].content, "earlier turn");
    }

    #[test]
    fn routing_is_total_for_every_stage() {
        let stages = [
            Stage::ProcessInput,
            Stage::RetrieveContext,
            Stage::GenerateResponse,
        ];
        let actions = [
            None,
            Some(Action::Retrieve),
            Some(Action::Generate),
            Some(Action::Complete),
            Some(Action::Fail),
        ];

        for stage in stages {
            for action in actions {
                let mut state = ConversationState::new("q", vec![]);
                state.next_action = action;
                // Every combination resolves to exactly one defined outcome.
                match route(stage, &state) {
                    Outcome::Next(_) | Outcome::Done | Outcome::Failed => {}
                }
            }
        }
    }

    #[test]
    fn route_takes_error_edge_on_fail_or_missing_action() {
        let mut state = ConversationState::new("q", vec![]);
        state.next_action = Some(Action::Fail);
        assert_eq!(route(Stage::ProcessInput, &state), Outcome::Failed);
        state.next_action = None;
        assert_eq!(route(Stage::RetrieveContext, &state), Outcome::Failed);
    }

    #[test]
    fn route_success_edges_are_linear() {
        let mut state = ConversationState::new("q", vec![]);
        state.next_action = Some(Action::Retrieve);
        assert_eq!(
            route(Stage::ProcessInput, &state),
            Outcome::Next(Stage::RetrieveContext)
        );
        state.next_action = Some(Action::Generate);
        assert_eq!(
            route(Stage::RetrieveContext, &state),
            Outcome::Next(Stage::GenerateResponse)
        );
        state.next_action = Some(Action::Complete);
        assert_eq!(route(Stage::GenerateResponse, &state), Outcome::Done);
    }
}
