//! Group membership, the speaker-transition graph, and speaker selection.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::agent::core::Agent;
use crate::ai::facade::ModelClientFacade;
use crate::ai::types::CompletionRequest;
use crate::error::{ChorusError, Result};
use crate::message::{Message, Role};

/// Who may speak after whom, keyed by agent name.
#[derive(Debug, Clone, Default)]
pub struct TransitionGraph {
    allowed: HashMap<String, Vec<String>>,
}

impl TransitionGraph {
    pub fn allowed(map: HashMap<String, Vec<String>>) -> Self {
        Self { allowed: map }
    }

    /// Invert a disallowed-transitions map into an allowed one: fully
    /// connected (self-loops included) minus the listed edges.
    pub fn from_disallowed(
        participants: &[String],
        disallowed: &HashMap<String, Vec<String>>,
    ) -> Self {
        let mut allowed = HashMap::new();
        for from in participants {
            let blocked = disallowed.get(from);
            let targets: Vec<String> = participants
                .iter()
                .filter(|to| blocked.map(|b| !b.contains(to)).unwrap_or(true))
                .cloned()
                .collect();
            allowed.insert(from.clone(), targets);
        }
        Self { allowed }
    }

    pub fn candidates(&self, speaker: &str) -> &[String] {
        self.allowed
            .get(speaker)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Unknown keys or targets are fatal; isolated nodes and duplicate edges
    /// only warn.
    fn validate(&self, participant_names: &[&str]) -> Result<()> {
        for (from, targets) in &self.allowed {
            if !participant_names.contains(&from.as_str()) {
                return Err(ChorusError::InvalidConfig(format!(
                    "transition graph key '{from}' is not a participant"
                )));
            }
            for to in targets {
                if !participant_names.contains(&to.as_str()) {
                    return Err(ChorusError::InvalidConfig(format!(
                        "transition graph target '{to}' is not a participant"
                    )));
                }
            }
            let mut seen = Vec::new();
            for to in targets {
                if seen.contains(&to) {
                    warn!(from = %from, to = %to, "duplicate transition edge");
                }
                seen.push(to);
            }
        }
        for name in participant_names {
            let has_outgoing = self
                .allowed
                .get(*name)
                .map(|t| !t.is_empty())
                .unwrap_or(false);
            let has_incoming = self
                .allowed
                .values()
                .any(|targets| targets.iter().any(|t| t == name));
            if !has_outgoing && !has_incoming {
                warn!(agent = %name, "agent is isolated in the transition graph");
            }
        }
        Ok(())
    }
}

/// How the next speaker is chosen each round.
#[derive(Clone)]
pub enum SpeakerSelection {
    /// Participant list order, wrapping.
    RoundRobin,
    /// Graph-constrained; an empty candidate set raises `NoEligibleSpeaker`.
    Graph(TransitionGraph),
    /// Ask a model to pick by name; unparseable answers fall back to
    /// round-robin order.
    Auto(Arc<ModelClientFacade>),
}

pub struct GroupChat {
    participants: Vec<Agent>,
    max_rounds: usize,
    admin_name: Option<String>,
    selection: SpeakerSelection,
    send_introductions: bool,
}

impl GroupChat {
    pub fn builder() -> GroupChatBuilder {
        GroupChatBuilder::default()
    }

    pub fn participants(&self) -> &[Agent] {
        &self.participants
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn admin(&self) -> Option<&Agent> {
        self.admin_name
            .as_deref()
            .and_then(|name| self.agent_by_name(name))
    }

    pub fn send_introductions(&self) -> bool {
        self.send_introductions
    }

    pub fn agent_by_name(&self, name: &str) -> Option<&Agent> {
        self.participants.iter().find(|agent| agent.name() == name)
    }

    fn position(&self, agent: &Agent) -> usize {
        self.participants
            .iter()
            .position(|p| p == agent)
            .unwrap_or(0)
    }

    fn next_in_order(&self, current: &Agent) -> Agent {
        let index = (self.position(current) + 1) % self.participants.len();
        self.participants[index].clone()
    }

    /// First allowed participant after the current speaker in list order.
    fn next_from_graph(&self, current: &Agent, graph: &TransitionGraph) -> Result<Agent> {
        let candidates = graph.candidates(current.name());
        if candidates.is_empty() {
            return Err(ChorusError::NoEligibleSpeaker {
                speaker: current.name().to_string(),
            });
        }
        let start = self.position(current);
        for offset in 1..=self.participants.len() {
            let candidate = &self.participants[(start + offset) % self.participants.len()];
            if candidates.iter().any(|name| name == candidate.name()) {
                return Ok(candidate.clone());
            }
        }
        Err(ChorusError::NoEligibleSpeaker {
            speaker: current.name().to_string(),
        })
    }

    async fn next_from_model(
        &self,
        current: &Agent,
        transcript: &[Message],
        facade: &ModelClientFacade,
    ) -> Result<Agent> {
        let roster = self
            .participants
            .iter()
            .map(|p| format!("{}: {}", p.name(), p.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let mut messages = vec![Message::text(
            Role::System,
            format!(
                "You are coordinating a conversation between these participants:\n\
                 {roster}\n\
                 Read the conversation, then answer with only the name of the \
                 participant who should speak next."
            ),
        )];
        messages.extend_from_slice(transcript);

        let result = facade.create(CompletionRequest::new(messages)).await?;
        let answer = result.text().unwrap_or_default();
        let mentioned: Vec<&Agent> = self
            .participants
            .iter()
            .filter(|p| answer.contains(p.name()))
            .collect();
        match mentioned.as_slice() {
            [only] => Ok((*only).clone()),
            _ => {
                warn!(answer = %answer, "speaker selection was ambiguous, using list order");
                Ok(self.next_in_order(current))
            }
        }
    }

    pub async fn select_next_speaker(
        &self,
        current: &Agent,
        transcript: &[Message],
    ) -> Result<Agent> {
        match &self.selection {
            SpeakerSelection::RoundRobin => Ok(self.next_in_order(current)),
            SpeakerSelection::Graph(graph) => self.next_from_graph(current, graph),
            SpeakerSelection::Auto(facade) => {
                self.next_from_model(current, transcript, facade).await
            }
        }
    }
}

#[derive(Default)]
pub struct GroupChatBuilder {
    participants: Vec<Agent>,
    max_rounds: usize,
    admin_name: Option<String>,
    selection: Option<SpeakerSelection>,
    send_introductions: bool,
}

impl GroupChatBuilder {
    pub fn participant(mut self, agent: Agent) -> Self {
        self.participants.push(agent);
        self
    }

    pub fn participants(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.participants.extend(agents);
        self
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn admin_name(mut self, name: impl Into<String>) -> Self {
        self.admin_name = Some(name.into());
        self
    }

    pub fn selection(mut self, selection: SpeakerSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn send_introductions(mut self, value: bool) -> Self {
        self.send_introductions = value;
        self
    }

    pub fn build(self) -> Result<GroupChat> {
        if self.participants.len() < 2 {
            return Err(ChorusError::InvalidConfig(
                "a group chat needs at least two participants".into(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(ChorusError::InvalidConfig(
                "max_rounds must be at least 1".into(),
            ));
        }
        let mut names = Vec::new();
        for agent in &self.participants {
            if names.contains(&agent.name()) {
                return Err(ChorusError::InvalidConfig(format!(
                    "duplicate participant name '{}'",
                    agent.name()
                )));
            }
            names.push(agent.name());
        }
        if let Some(admin) = &self.admin_name {
            if !names.contains(&admin.as_str()) {
                return Err(ChorusError::InvalidConfig(format!(
                    "admin '{admin}' is not a participant"
                )));
            }
        }
        let selection = self.selection.unwrap_or(SpeakerSelection::RoundRobin);
        if let SpeakerSelection::Graph(graph) = &selection {
            graph.validate(&names)?;
        }
        Ok(GroupChat {
            participants: self.participants,
            max_rounds: self.max_rounds,
            admin_name: self.admin_name,
            selection,
            send_introductions: self.send_introductions,
        })
    }
}
