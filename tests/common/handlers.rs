//! Scriptable handlers for exercising the delivery protocol

use async_trait::async_trait;
use change_notifier::dispatcher::{ChangeHandler, HandlerContext, HandlerOutcome};
use change_notifier::models::{HandlerId, SequenceKey};
use change_notifier::store::MemorySession;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// What a [`ScriptedHandler`] does on one invocation
#[derive(Debug, Clone)]
pub enum Step {
    /// Stage a write and report success
    Handle,
    NotReady,
    Fail(&'static str),
    /// Must never be reached
    Panic,
}

/// Shared log of every handler invocation, in call order
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(HandlerId, SequenceKey)>>>,
}

impl CallLog {
    pub fn record(&self, id: HandlerId, key: SequenceKey) {
        self.calls.lock().push((id, key));
    }

    pub fn all(&self) -> Vec<(HandlerId, SequenceKey)> {
        self.calls.lock().clone()
    }

    pub fn keys_for(&self, id: HandlerId) -> Vec<SequenceKey> {
        self.calls
            .lock()
            .iter()
            .filter(|(handler, _)| *handler == id)
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Handler whose outcome is scripted per record key. Keys without a script,
/// or whose script is exhausted, are handled successfully.
pub struct ScriptedHandler {
    name: String,
    log: CallLog,
    scripts: Mutex<HashMap<SequenceKey, VecDeque<Step>>>,
    delay: Option<Duration>,
}

impl ScriptedHandler {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            scripts: Mutex::new(HashMap::new()),
            delay: None,
        }
    }

    pub fn on(self, key: SequenceKey, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .entry(key)
            .or_default()
            .extend(steps);
        self
    }

    /// Sleep (on the tokio clock) before every invocation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn next_step(&self, key: SequenceKey) -> Step {
        self.scripts
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Handle)
    }
}

/// Key under which a handler's staged write lands in the store
pub fn write_key(id: HandlerId, key: SequenceKey) -> String {
    format!("{id}/{key}")
}

#[async_trait]
impl ChangeHandler<MemorySession<String>, String> for ScriptedHandler {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        session: &mut MemorySession<String>,
        event: &String,
    ) -> HandlerOutcome {
        self.log.record(ctx.handler_id(), ctx.record_key());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step(ctx.record_key()) {
            Step::Handle => {
                let staged = session.put(
                    write_key(ctx.handler_id(), ctx.record_key()),
                    json!(event),
                );
                HandlerOutcome::from_result(staged.map_err(Into::into))
            }
            Step::NotReady => HandlerOutcome::NotReady,
            Step::Fail(message) => HandlerOutcome::failed(message),
            Step::Panic => panic!(
                "{} invoked for {} which it already processed",
                self.name,
                ctx.record_key()
            ),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
