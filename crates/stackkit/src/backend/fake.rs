//! In-memory backend for tests.
//!
//! Scripted responses for every collaborator, plus a log of every call in
//! the order it was made.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{ContentStore, ControlPlane, TemplateChecker};
use crate::error::{Error, Result};
use crate::status::StackStatus;
use crate::types::{CreateStackRequest, UpdateStackRequest};
use crate::wait::CancelToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { key: String, body: Vec<u8> },
    Describe(String),
    Create(CreateStackRequest),
    Update(UpdateStackRequest),
    Poll(String),
    Validate(String),
}

#[derive(Default)]
struct Script {
    existing: HashMap<String, StackStatus>,
    polls: HashMap<String, VecDeque<StackStatus>>,
    reject: HashMap<String, String>,
    describe_errors: HashSet<String>,
    put_errors: HashSet<String>,
    invalid: HashMap<String, String>,
    cancel_after_polls: Option<(CancelToken, usize)>,
}

#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack exists with the given status.
    pub fn with_stack(self, stack: &str, status: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .existing
            .insert(stack.to_string(), StackStatus::from(status));
        self
    }

    /// Statuses returned by successive polls; the last one repeats.
    pub fn with_polls(self, stack: &str, statuses: &[&str]) -> Self {
        self.script.lock().unwrap().polls.insert(
            stack.to_string(),
            statuses.iter().map(|s| StackStatus::from(*s)).collect(),
        );
        self
    }

    /// Create/update requests for this stack are rejected.
    pub fn rejecting(self, stack: &str, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .reject
            .insert(stack.to_string(), message.to_string());
        self
    }

    /// Describing this stack fails with a transport error.
    pub fn failing_describe(self, stack: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .describe_errors
            .insert(stack.to_string());
        self
    }

    /// Writing this key fails.
    pub fn failing_put(self, key: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .put_errors
            .insert(key.to_string());
        self
    }

    /// Templates at this URL fail validation.
    pub fn invalid(self, url: &str, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .invalid
            .insert(url.to_string(), message.to_string());
        self
    }

    /// Cancel `token` once `n` polls have been answered.
    pub fn cancel_after_polls(self, token: CancelToken, n: usize) -> Self {
        self.script.lock().unwrap().cancel_after_polls = Some((token, n));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn describe_count(&self, stack: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Describe(s) if s == stack))
            .count()
    }

    pub fn poll_count(&self, stack: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Poll(s) if s == stack))
            .count()
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Put { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Stacks that received a create or update request, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(r) => Some(r.stack_name),
                Call::Update(r) => Some(r.stack_name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn url_for(key: &str) -> String {
    format!("https://templates.example.com/{key}")
}

impl ContentStore for FakeBackend {
    fn put(&self, key: &str, body: &[u8]) -> Result<String> {
        self.record(Call::Put {
            key: key.to_string(),
            body: body.to_vec(),
        });
        if self.script.lock().unwrap().put_errors.contains(key) {
            return Err(Error::Other("access denied".to_string()));
        }
        Ok(url_for(key))
    }
}

impl ControlPlane for FakeBackend {
    fn describe(&self, stack_name: &str) -> Result<Option<StackStatus>> {
        self.record(Call::Describe(stack_name.to_string()));
        let script = self.script.lock().unwrap();
        if script.describe_errors.contains(stack_name) {
            return Err(Error::transport(
                "describe-stacks",
                Some(stack_name),
                "expired token",
            ));
        }
        Ok(script.existing.get(stack_name).cloned())
    }

    fn create(&self, request: &CreateStackRequest) -> Result<()> {
        self.record(Call::Create(request.clone()));
        match self.script.lock().unwrap().reject.get(&request.stack_name) {
            Some(message) => Err(Error::Other(message.clone())),
            None => Ok(()),
        }
    }

    fn update(&self, request: &UpdateStackRequest) -> Result<()> {
        self.record(Call::Update(request.clone()));
        match self.script.lock().unwrap().reject.get(&request.stack_name) {
            Some(message) => Err(Error::Other(message.clone())),
            None => Ok(()),
        }
    }

    fn poll_status(&self, stack_name: &str) -> Result<StackStatus> {
        self.record(Call::Poll(stack_name.to_string()));
        let polled = self.poll_count(stack_name);
        let mut script = self.script.lock().unwrap();

        if let Some((token, n)) = &script.cancel_after_polls {
            if polled >= *n {
                token.cancel();
            }
        }

        let queue = script.polls.entry(stack_name.to_string()).or_default();
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        status.ok_or_else(|| Error::transport("describe-stacks", Some(stack_name), "no status"))
    }

    fn status_reason(&self, _stack_name: &str) -> Result<Option<String>> {
        Ok(Some("Resource creation cancelled".to_string()))
    }
}

impl TemplateChecker for FakeBackend {
    fn validate(&self, template_url: &str) -> Result<()> {
        self.record(Call::Validate(template_url.to_string()));
        match self.script.lock().unwrap().invalid.get(template_url) {
            Some(message) => Err(Error::Other(message.clone())),
            None => Ok(()),
        }
    }
}
