//! Directed workflow graph with optional model-routed edges.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::agent::core::Agent;
use crate::components::Component;
use crate::error::{ChorusError, Result};
use crate::message::Message;

pub enum PipelineNode {
    Agent(Agent),
    Component(Arc<dyn Component>),
}

pub enum EdgeTarget {
    /// Static edge to a named node.
    Node(String),
    /// The router agent's reply, looked up in `routes`, names the next node.
    /// An unmapped reply is a routing error, never a silent skip.
    Router {
        agent: Agent,
        routes: HashMap<String, String>,
    },
}

/// A walk from `entry` along edges until a node has no outgoing edge. The
/// final message is delivered to the end-user agent.
pub struct Pipeline {
    nodes: HashMap<String, PipelineNode>,
    edges: HashMap<String, EdgeTarget>,
    entry: String,
    end_user: Agent,
}

impl Pipeline {
    pub fn builder(end_user: Agent) -> PipelineBuilder {
        PipelineBuilder {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            end_user,
        }
    }

    pub async fn execute(&self, message: Message) -> Result<(String, Message)> {
        let mut current = self.entry.clone();
        let mut speaker = self.end_user.clone();
        let mut message = message;

        loop {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| ChorusError::InvalidRoute(current.clone()))?;

            let mut fallthrough = None;
            match node {
                PipelineNode::Agent(agent) => {
                    speaker
                        .send(message.clone(), agent, Some(false), true)
                        .await?;
                    let replies = agent
                        .generate_reply(agent.history_with(speaker.id()), Some(&speaker))
                        .await?;
                    if let Some(last) = replies.into_iter().last() {
                        message = last;
                    }
                    speaker = agent.clone();
                }
                PipelineNode::Component(component) => {
                    let outcome = component.run(message, &speaker).await?;
                    speaker = outcome.speaker;
                    message = outcome.message;
                    fallthrough = outcome.next;
                }
            }

            let next = match fallthrough {
                Some(name) => {
                    if !self.nodes.contains_key(&name) {
                        return Err(ChorusError::InvalidRoute(name));
                    }
                    Some(name)
                }
                None => match self.edges.get(&current) {
                    None => None,
                    Some(EdgeTarget::Node(name)) => Some(name.clone()),
                    Some(EdgeTarget::Router { agent, routes }) => {
                        Some(self.resolve_route(agent, routes, &message).await?)
                    }
                },
            };

            match next {
                Some(name) => {
                    debug!(from = %current, to = %name, "pipeline step");
                    current = name;
                }
                None => break,
            }
        }

        speaker
            .send(message.clone(), &self.end_user, Some(false), true)
            .await?;
        Ok((speaker.name().to_string(), message))
    }

    async fn resolve_route(
        &self,
        router: &Agent,
        routes: &HashMap<String, String>,
        message: &Message,
    ) -> Result<String> {
        let replies = router.generate_reply(vec![message.clone()], None).await?;
        let label = replies
            .last()
            .and_then(|reply| reply.text_content())
            .unwrap_or_default()
            .trim()
            .to_string();
        routes
            .get(&label)
            .cloned()
            .ok_or(ChorusError::InvalidRoute(label))
    }
}

pub struct PipelineBuilder {
    nodes: HashMap<String, PipelineNode>,
    edges: HashMap<String, EdgeTarget>,
    entry: Option<String>,
    end_user: Agent,
}

impl PipelineBuilder {
    pub fn agent(mut self, agent: Agent) -> Self {
        self.nodes
            .insert(agent.name().to_string(), PipelineNode::Agent(agent));
        self
    }

    pub fn component(mut self, component: Arc<dyn Component>) -> Self {
        self.nodes.insert(
            component.name().to_string(),
            PipelineNode::Component(component),
        );
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), EdgeTarget::Node(to.into()));
        self
    }

    pub fn routed_edge(
        mut self,
        from: impl Into<String>,
        router: Agent,
        routes: HashMap<String, String>,
    ) -> Self {
        self.edges.insert(
            from.into(),
            EdgeTarget::Router {
                agent: router,
                routes,
            },
        );
        self
    }

    /// Graph shape errors are fatal here, before anything executes.
    pub fn build(self) -> Result<Pipeline> {
        let entry = self.entry.ok_or_else(|| {
            ChorusError::InvalidConfig("pipeline entry point is not set".into())
        })?;
        if !self.nodes.contains_key(&entry) {
            return Err(ChorusError::InvalidRoute(entry));
        }
        for (from, target) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(ChorusError::InvalidRoute(from.clone()));
            }
            match target {
                EdgeTarget::Node(to) => {
                    if !self.nodes.contains_key(to) {
                        return Err(ChorusError::InvalidRoute(to.clone()));
                    }
                }
                EdgeTarget::Router { routes, .. } => {
                    for to in routes.values() {
                        if !self.nodes.contains_key(to) {
                            return Err(ChorusError::InvalidRoute(to.clone()));
                        }
                    }
                }
            }
        }
        Ok(Pipeline {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            end_user: self.end_user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::reply::{ReplyOutcome, ReplyStrategy, ReplyTrigger};
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl ReplyStrategy for Canned {
        async fn reply(
            &self,
            _agent: &Agent,
            _messages: &[Message],
            _sender: Option<&Agent>,
        ) -> Result<ReplyOutcome> {
            Ok(ReplyOutcome::Final(vec![Message::assistant(self.0)]))
        }
    }

    fn scripted(name: &str, reply: &'static str) -> Agent {
        let agent = Agent::builder(name).build().unwrap();
        agent.register_reply(ReplyTrigger::always(), Arc::new(Canned(reply)));
        agent
    }

    fn end_user() -> Agent {
        Agent::builder("end-user")
            .max_consecutive_auto_reply(Some(0))
            .build()
            .unwrap()
    }

    fn yes_no_routes() -> HashMap<String, String> {
        let mut routes = HashMap::new();
        routes.insert("yes".to_string(), "approver".to_string());
        routes.insert("no".to_string(), "rejecter".to_string());
        routes
    }

    #[tokio::test]
    async fn router_reply_picks_the_branch() {
        let pipeline = Pipeline::builder(end_user())
            .agent(scripted("drafter", "a draft"))
            .agent(scripted("approver", "approved"))
            .agent(scripted("rejecter", "rejected"))
            .entry("drafter")
            .routed_edge("drafter", scripted("router", "no"), yes_no_routes())
            .build()
            .unwrap();

        let (speaker, message) = pipeline.execute(Message::user("begin")).await.unwrap();
        assert_eq!(speaker, "rejecter");
        assert_eq!(message.text_content(), Some("rejected"));
    }

    #[tokio::test]
    async fn unmapped_router_reply_is_a_routing_error() {
        let pipeline = Pipeline::builder(end_user())
            .agent(scripted("drafter", "a draft"))
            .agent(scripted("approver", "approved"))
            .agent(scripted("rejecter", "rejected"))
            .entry("drafter")
            .routed_edge("drafter", scripted("router", "maybe"), yes_no_routes())
            .build()
            .unwrap();

        let err = pipeline.execute(Message::user("begin")).await.unwrap_err();
        assert!(matches!(err, ChorusError::InvalidRoute(label) if label == "maybe"));
    }

    #[tokio::test]
    async fn static_edges_walk_to_the_sink() {
        let user = end_user();
        let pipeline = Pipeline::builder(user.clone())
            .agent(scripted("first", "one"))
            .agent(scripted("second", "two"))
            .entry("first")
            .edge("first", "second")
            .build()
            .unwrap();

        let (speaker, message) = pipeline.execute(Message::user("go")).await.unwrap();
        assert_eq!(speaker, "second");
        assert_eq!(message.text_content(), Some("two"));
        // The final message was delivered to the end user.
        let received = user.history_with(pipeline.nodes["second"].agent_id());
        assert_eq!(received.last().unwrap().text_content(), Some("two"));
    }

    impl PipelineNode {
        fn agent_id(&self) -> crate::agent::core::AgentId {
            match self {
                PipelineNode::Agent(agent) => agent.id(),
                PipelineNode::Component(_) => unreachable!(),
            }
        }
    }

    #[test]
    fn edge_to_unknown_node_fails_construction() {
        let result = Pipeline::builder(end_user())
            .agent(scripted("only", "x"))
            .entry("only")
            .edge("only", "ghost")
            .build();
        assert!(matches!(result, Err(ChorusError::InvalidRoute(name)) if name == "ghost"));
    }

    #[test]
    fn missing_entry_fails_construction() {
        let result = Pipeline::builder(end_user())
            .agent(scripted("only", "x"))
            .entry("ghost")
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn component_fallthrough_overrides_the_static_edge() {
        use crate::components::ComponentOutcome;

        struct Jumper;
        #[async_trait]
        impl Component for Jumper {
            fn name(&self) -> &str {
                "jumper"
            }
            async fn run(&self, message: Message, sender: &Agent) -> Result<ComponentOutcome> {
                Ok(ComponentOutcome {
                    speaker: sender.clone(),
                    message,
                    next: Some("landing".to_string()),
                })
            }
        }

        let pipeline = Pipeline::builder(end_user())
            .component(Arc::new(Jumper))
            .agent(scripted("landing", "landed"))
            .agent(scripted("unvisited", "never"))
            .entry("jumper")
            .edge("jumper", "unvisited")
            .build()
            .unwrap();

        let (speaker, message) = pipeline.execute(Message::user("go")).await.unwrap();
        assert_eq!(speaker, "landing");
        assert_eq!(message.text_content(), Some("landed"));
    }
}
