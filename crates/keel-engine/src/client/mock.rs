//! In-memory vendor for tests.
//!
//! [`MockVendor`] stores objects in memory, answers status queries from a
//! per-resource script, can be told to fail the next call of a given kind, and
//! records every call it receives.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use keel_core::ResourceId;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use super::{JsonMap, PollResult, VendorClient};
use crate::error::{ClientError, ClientResult};

/// Kinds of vendor call, for error injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `create`
    Create,
    /// `read`
    Read,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `describe`
    Describe,
}

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// A create request.
    Create {
        /// Resource type.
        resource_type: String,
        /// Request body.
        request: JsonMap,
    },
    /// A read.
    Read {
        /// Target identity.
        id: ResourceId,
    },
    /// An update request.
    Update {
        /// Target identity.
        id: ResourceId,
        /// Request body.
        request: JsonMap,
    },
    /// A delete request.
    Delete {
        /// Target identity.
        id: ResourceId,
    },
    /// A status query.
    Describe {
        /// Target identity.
        id: ResourceId,
    },
}

impl MockCall {
    /// The kind of this call.
    #[must_use]
    pub const fn kind(&self) -> CallKind {
        match self {
            Self::Create { .. } => CallKind::Create,
            Self::Read { .. } => CallKind::Read,
            Self::Update { .. } => CallKind::Update,
            Self::Delete { .. } => CallKind::Delete,
            Self::Describe { .. } => CallKind::Describe,
        }
    }
}

/// One scripted status answer.
pub type ScriptStep = ClientResult<String>;

struct MockObject {
    body: JsonMap,
    script: VecDeque<ScriptStep>,
    deleting: bool,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<ResourceId, MockObject>,
    /// Scripts waiting for the next create/update/delete of a resource type.
    pending_scripts: HashMap<String, VecDeque<Vec<ScriptStep>>>,
    /// Steady state reported once a script runs out, per resource type.
    settled: HashMap<String, String>,
    defaults: HashMap<String, JsonMap>,
    hidden: HashMap<String, Vec<Vec<String>>>,
    failures: HashMap<CallKind, VecDeque<ClientError>>,
    calls: Vec<MockCall>,
    next_id: u64,
}

/// A mock vendor that stores objects in memory.
#[derive(Default)]
pub struct MockVendor {
    inner: Mutex<Inner>,
}

impl MockVendor {
    /// Create a new mock vendor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steady state reported for `resource_type` when no script is queued.
    /// Defaults to `active`.
    #[must_use]
    pub fn with_settled_state(self, resource_type: &str, state: &str) -> Self {
        self.inner
            .lock()
            .settled
            .insert(resource_type.to_string(), state.to_string());
        self
    }

    /// Fields the vendor fills in on create when the request omits them.
    #[must_use]
    pub fn with_defaults(self, resource_type: &str, defaults: JsonValue) -> Self {
        if let JsonValue::Object(defaults) = defaults {
            self.inner
                .lock()
                .defaults
                .insert(resource_type.to_string(), defaults);
        }
        self
    }

    /// A field the vendor accepts but never returns on read, given as a path
    /// of vendor field names.
    #[must_use]
    pub fn with_hidden_field(self, resource_type: &str, path: &[&str]) -> Self {
        self.inner
            .lock()
            .hidden
            .entry(resource_type.to_string())
            .or_default()
            .push(path.iter().map(ToString::to_string).collect());
        self
    }

    /// Queue status answers for the next operation submitted on
    /// `resource_type`. Each create, update or delete takes one queued script.
    pub fn script_next(&self, resource_type: &str, steps: Vec<ScriptStep>) {
        self.inner
            .lock()
            .pending_scripts
            .entry(resource_type.to_string())
            .or_default()
            .push_back(steps);
    }

    /// Fail the next call of `kind` with `error`.
    pub fn fail_next(&self, kind: CallKind, error: ClientError) {
        self.inner
            .lock()
            .failures
            .entry(kind)
            .or_default()
            .push_back(error);
    }

    /// Replace a stored object, simulating an out-of-band change.
    pub fn set_body(&self, id: &ResourceId, body: JsonValue) {
        if let (Some(object), JsonValue::Object(body)) =
            (self.inner.lock().objects.get_mut(id), body)
        {
            object.body = body;
        }
    }

    /// Remove an object, simulating an out-of-band delete.
    pub fn remove(&self, id: &ResourceId) {
        self.inner.lock().objects.remove(id);
    }

    /// The stored body of an object, exactly as last written.
    #[must_use]
    pub fn body(&self, id: &ResourceId) -> Option<JsonMap> {
        self.inner
            .lock()
            .objects
            .get(id)
            .filter(|o| !o.deleting)
            .map(|o| o.body.clone())
    }

    /// Number of stored objects, excluding ones still being deleted.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.inner
            .lock()
            .objects
            .values()
            .filter(|o| !o.deleting)
            .count()
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of calls of `kind` received so far.
    #[must_use]
    pub fn count(&self, kind: CallKind) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.kind() == kind)
            .count()
    }
}

impl Inner {
    fn record(&mut self, call: MockCall) -> ClientResult<()> {
        let kind = call.kind();
        self.calls.push(call);
        match self.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn take_script(&mut self, resource_type: &str) -> VecDeque<ScriptStep> {
        self.pending_scripts
            .get_mut(resource_type)
            .and_then(VecDeque::pop_front)
            .map(VecDeque::from)
            .unwrap_or_default()
    }

    fn settled_state(&self, resource_type: &str) -> String {
        self.settled
            .get(resource_type)
            .cloned()
            .unwrap_or_else(|| "active".to_string())
    }

    fn not_found(id: &ResourceId) -> ClientError {
        ClientError::NotFound(format!("{id} does not exist"))
    }
}

fn remove_path(body: &mut JsonMap, path: &[String]) {
    match path {
        [] => {}
        [last] => {
            body.remove(last);
        }
        [first, rest @ ..] => {
            if let Some(JsonValue::Object(nested)) = body.get_mut(first) {
                remove_path(nested, rest);
            }
        }
    }
}

#[async_trait]
impl VendorClient for MockVendor {
    async fn create(&self, resource_type: &str, request: &JsonMap) -> ClientResult<ResourceId> {
        let mut inner = self.inner.lock();
        inner.record(MockCall::Create {
            resource_type: resource_type.to_string(),
            request: request.clone(),
        })?;

        inner.next_id += 1;
        let id = ResourceId::new(format!("{resource_type}-{}", inner.next_id))
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let mut body = inner.defaults.get(resource_type).cloned().unwrap_or_default();
        for (key, value) in request {
            body.insert(key.clone(), value.clone());
        }
        let script = inner.take_script(resource_type);
        inner.objects.insert(
            id.clone(),
            MockObject {
                body,
                script,
                deleting: false,
            },
        );
        Ok(id)
    }

    async fn read(&self, resource_type: &str, id: &ResourceId) -> ClientResult<JsonValue> {
        let mut inner = self.inner.lock();
        inner.record(MockCall::Read { id: id.clone() })?;

        let mut body = inner
            .objects
            .get(id)
            .filter(|o| !o.deleting)
            .map(|o| o.body.clone())
            .ok_or_else(|| Inner::not_found(id))?;
        for path in inner.hidden.get(resource_type).into_iter().flatten() {
            remove_path(&mut body, path);
        }
        Ok(JsonValue::Object(body))
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &ResourceId,
        request: &JsonMap,
    ) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        inner.record(MockCall::Update {
            id: id.clone(),
            request: request.clone(),
        })?;

        let script = inner.take_script(resource_type);
        let object = inner
            .objects
            .get_mut(id)
            .filter(|o| !o.deleting)
            .ok_or_else(|| Inner::not_found(id))?;
        for (key, value) in request {
            if value.is_null() {
                object.body.remove(key);
            } else {
                object.body.insert(key.clone(), value.clone());
            }
        }
        object.script = script;
        Ok(())
    }

    async fn delete(&self, resource_type: &str, id: &ResourceId) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        inner.record(MockCall::Delete { id: id.clone() })?;

        let script = inner.take_script(resource_type);
        let object = inner
            .objects
            .get_mut(id)
            .filter(|o| !o.deleting)
            .ok_or_else(|| Inner::not_found(id))?;
        if script.is_empty() {
            inner.objects.remove(id);
        } else {
            // Keep answering status queries until the script drains.
            object.body.clear();
            object.script = script;
            object.deleting = true;
        }
        Ok(())
    }

    async fn describe(&self, resource_type: &str, id: &ResourceId) -> ClientResult<PollResult> {
        let mut inner = self.inner.lock();
        inner.record(MockCall::Describe { id: id.clone() })?;

        let settled = inner.settled_state(resource_type);
        let object = inner
            .objects
            .get_mut(id)
            .ok_or_else(|| Inner::not_found(id))?;
        if let Some(step) = object.script.pop_front() {
            return step.map(PollResult::new);
        }
        if object.deleting {
            inner.objects.remove(id);
            return Err(Inner::not_found(id));
        }
        Ok(PollResult::new(settled))
    }
}
