//! Shared helpers for engine integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use cloudinv::engine::{AccountRegions, Engine, MemorySink, RowSink, Scope};
use cloudinv::provider::{ApiClient, ApiError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Handler = Box<dyn Fn(&Scope, &Value) -> Result<Value> + Send + Sync>;

/// Scripted API: one handler per `service.operation`, with a log of every
/// call made.
#[derive(Default)]
pub struct ScriptedApi {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, Scope, Value)>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, service: &str, operation: &str, handler: F) -> Self
    where
        F: Fn(&Scope, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers
            .insert(format!("{}.{}", service, operation), Box::new(handler));
        self
    }

    /// Take over every handler of `other`
    pub fn merge(mut self, other: ScriptedApi) -> Self {
        self.handlers.extend(other.handlers);
        self
    }

    /// Answer an operation with the same response every time
    pub fn respond(self, service: &str, operation: &str, response: Value) -> Self {
        self.on(service, operation, move |_, _| Ok(response.clone()))
    }

    /// Fail an operation with a provider error code
    pub fn fail(self, service: &str, operation: &str, status: u16, code: &str) -> Self {
        let code = code.to_string();
        self.on(service, operation, move |_, _| {
            Err(ApiError::new(status, code.clone(), "scripted").into())
        })
    }

    pub fn count(&self, service: &str, operation: &str) -> usize {
        let key = format!("{}.{}", service, operation);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == key)
            .count()
    }

    pub fn inputs(&self, service: &str, operation: &str) -> Vec<Value> {
        let key = format!("{}.{}", service, operation);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == key)
            .map(|(_, _, input)| input.clone())
            .collect()
    }
}

#[async_trait]
impl ApiClient for ScriptedApi {
    async fn call(
        &self,
        scope: &Scope,
        service: &str,
        operation: &str,
        input: Value,
    ) -> Result<Value> {
        let key = format!("{}.{}", service, operation);
        self.calls
            .lock()
            .unwrap()
            .push((key.clone(), scope.clone(), input.clone()));

        match self.handlers.get(&key) {
            Some(handler) => handler(scope, &input),
            None => Err(ApiError::new(400, "UnknownOperationException", key).into()),
        }
    }
}

pub fn one_region() -> Vec<AccountRegions> {
    vec![AccountRegions::new("123456789012", vec!["us-east-1".into()])]
}

pub fn engine(api: &Arc<ScriptedApi>, sink: &Arc<MemorySink>) -> Engine {
    Engine::new(
        Arc::clone(api) as Arc<dyn ApiClient>,
        Arc::clone(sink) as Arc<dyn RowSink>,
        one_region(),
    )
}
