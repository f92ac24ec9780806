//! Shared application state, spec.md §9 "Global singletons ... model as
//! explicit long-lived components owned by a top-level server value;
//! wire through constructors, not package-level state."
//!
//! Grounded on the teacher's `AppState` (`crates/server/src/state.rs`):
//! one `Clone`-able struct of `Arc`s handed to every handler via axum's
//! `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use shellwright_codegen::CodeGeneratorFacade;
use shellwright_config::{ChannelRegistry, PersonaRegistry, Settings};
use shellwright_exec::Scheduler;
use shellwright_llm::{PromptAssembler, ProviderGateway};
use shellwright_memory::ConversationMemory;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub personas: Arc<PersonaRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub memory: Arc<ConversationMemory>,
    pub gateway: Arc<ProviderGateway>,
    pub codegen: Arc<CodeGeneratorFacade>,
    pub prompt_assembler: Arc<PromptAssembler>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
