use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shopfloor_core::domain::intent::{Intent, IntentResult};

/// Produces a draft answer for one intent. Drafts always pass the guardrails before
/// delivery, so an agent never decides what is safe to say.
#[async_trait]
pub trait AnswerAgent: Send + Sync {
    fn intent(&self) -> Intent;
    async fn draft(&self, query: &str, classification: &IntentResult) -> Result<String>;
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<Intent, Box<dyn AnswerAgent>>,
}

impl AgentRegistry {
    /// Registers `agent` for its intent, replacing any earlier registration.
    pub fn register<A>(&mut self, agent: A)
    where
        A: AnswerAgent + 'static,
    {
        self.agents.insert(agent.intent(), Box::new(agent));
    }

    pub fn get(&self, intent: Intent) -> Option<&dyn AnswerAgent> {
        self.agents.get(&intent).map(|agent| agent.as_ref())
    }

    pub fn intents(&self) -> Vec<Intent> {
        let mut intents = self.agents.keys().copied().collect::<Vec<_>>();
        intents.sort_by_key(|intent| intent.priority_rank());
        intents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
