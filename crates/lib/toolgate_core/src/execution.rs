// @awa-component: EXE-ExecutionMiddleware
//
//! Execution Middleware.
//!
//! Every inbound tool call passes through [`ToolExecutor::execute`], which
//! walks the call through received, validated and executing steps and ends
//! in a [`CallState`]:
//!
//! 1. look the tool up by name (unknown tools fail without an audit record)
//! 2. check required caller parameters (missing ones fail without dispatch
//!    or audit)
//! 3. append the `started` audit row, then resolve, compile and dispatch
//! 4. append the terminal audit row and return the envelope
//!
//! Every error is reported as a failed [`ResultEnvelope`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditRecorder, AuditRun, AuditUpdate, RunId};
use crate::catalog::Catalog;
use crate::dispatch::{Dispatcher, ResultEnvelope};
use crate::expr::EvalContext;
use crate::query::{Arguments, Compiler, QueryError, resolve, supplied};
use crate::spec::{Method, ToolSpec};

/// Client id recorded when the caller is not authenticated.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Terminal state of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Completed,
    Failed,
}

/// Errors raised before or during execution of a call.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Tool {0} not found")]
    UnknownTool(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ExecutionError {
    /// Audit status code for a failure.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::UnknownTool(_) => 404,
            Self::Query(QueryError::MissingParameter(_)) => 400,
            Self::Query(_) => 500,
        }
    }
}

/// One inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Arguments,
    pub client_id: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            client_id: ANONYMOUS_CLIENT.to_string(),
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

/// Outcome of [`ToolExecutor::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Set once the call reached execution (and was audited).
    pub run_id: Option<RunId>,
    pub state: CallState,
    pub envelope: ResultEnvelope,
}

impl Invocation {
    fn rejected(envelope: ResultEnvelope) -> Self {
        Self {
            run_id: None,
            state: CallState::Failed,
            envelope,
        }
    }
}

/// Orchestrates catalog lookup, validation, compilation, dispatch and audit.
#[derive(Clone)]
pub struct ToolExecutor {
    catalog: Arc<Catalog>,
    compiler: Compiler,
    dispatcher: Dispatcher,
    recorder: AuditRecorder,
    clock: fn() -> DateTime<Utc>,
}

impl ToolExecutor {
    pub fn new(
        catalog: Arc<Catalog>,
        compiler: Compiler,
        dispatcher: Dispatcher,
        recorder: AuditRecorder,
    ) -> Self {
        Self {
            catalog,
            compiler,
            dispatcher,
            recorder,
            clock: Utc::now,
        }
    }

    /// Replace the clock used for audit timestamps and expressions.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Check that every required caller parameter is present.
    pub fn validate(spec: &ToolSpec, arguments: &Arguments) -> Result<(), ExecutionError> {
        for (key, parameter) in spec.argument_parameters() {
            let present = supplied(arguments, key, parameter.is_search_slot()).is_some();
            if parameter.required && !present {
                return Err(QueryError::MissingParameter(key.to_string()).into());
            }
        }
        Ok(())
    }

    pub async fn execute(&self, call: ToolCall) -> Invocation {
        // Received
        let Some(spec) = self.catalog.get(&call.tool_name).cloned() else {
            let err = ExecutionError::UnknownTool(call.tool_name.clone());
            warn!(tool = %call.tool_name, client = %call.client_id, "{err}");
            return Invocation::rejected(ResultEnvelope::failure(err.to_string()));
        };

        // Validated
        if let Err(err) = Self::validate(&spec, &call.arguments) {
            warn!(tool = %spec.name, client = %call.client_id, "{err}");
            return Invocation::rejected(ResultEnvelope::failure(err.to_string()));
        }

        // Executing
        let started_at = (self.clock)();
        let run = AuditRun::new(
            spec.name.clone(),
            RunId::new(),
            call.client_id.clone(),
            started_at,
            Value::Object(call.arguments.clone()),
        );
        info!(tool = %spec.name, run_id = %run.run_id, client = %call.client_id, "tool call started");
        self.recorder.start(&run).await;

        let outcome = match spec.method {
            Method::Find => self.find(&spec, &call.arguments, started_at).await,
            Method::ListCollections => Ok(self.dispatcher.list_collections().await),
        };

        let ended_at = (self.clock)();
        let (state, envelope, update) = match outcome {
            Ok(envelope) if envelope.success => {
                let update = AuditUpdate::completed(envelope.summary(), ended_at);
                (CallState::Completed, envelope, update)
            }
            Ok(envelope) => {
                let message = envelope.error.clone().unwrap_or_default();
                let update = AuditUpdate::failed(500, message, ended_at).with_result(envelope.summary());
                (CallState::Failed, envelope, update)
            }
            Err(err) => {
                let update = AuditUpdate::failed(err.status_code(), err.to_string(), ended_at);
                (CallState::Failed, ResultEnvelope::failure(err.to_string()), update)
            }
        };

        match state {
            CallState::Completed => {
                info!(tool = %spec.name, run_id = %run.run_id, count = envelope.count, "tool call completed")
            }
            _ => warn!(
                tool = %spec.name,
                run_id = %run.run_id,
                error = envelope.error.as_deref().unwrap_or_default(),
                "tool call failed"
            ),
        }
        self.recorder.update(&run, update).await;

        Invocation {
            run_id: Some(run.run_id),
            state,
            envelope,
        }
    }

    async fn find(
        &self,
        spec: &ToolSpec,
        arguments: &Arguments,
        now: DateTime<Utc>,
    ) -> Result<ResultEnvelope, ExecutionError> {
        let resolution = resolve(spec, arguments, &EvalContext::at(now))?;
        let descriptor = self.compiler.compile(spec, resolution).await?;
        Ok(self.dispatcher.dispatch(spec, &descriptor).await)
    }
}

#[cfg(test)]
mod tests;
