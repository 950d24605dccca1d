//! Test doubles for the SQL seam.
//!
//! [`ScriptedSqlConnector`] records every connection attempt and executed
//! statement and replays a queue of scripted outcomes, so tests can assert
//! both what SQL was generated and what never ran.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{Result, UpstreamError};
use crate::plugins::postgres::{
    PostgresConfig, SqlConnection, SqlConnector, SqlOutcome, SqlStatement,
};

#[derive(Default)]
struct ScriptedState {
    outcomes: VecDeque<Result<SqlOutcome>>,
    connects: Vec<PostgresConfig>,
    queries: Vec<SqlStatement>,
}

/// SQL connector whose query results are scripted up front. Connections
/// always succeed; an exhausted script returns empty successful outcomes.
#[derive(Clone, Default)]
pub struct ScriptedSqlConnector {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedSqlConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful outcome for the next executed statement.
    pub fn with_outcome(self, outcome: SqlOutcome) -> Self {
        self.lock().outcomes.push_back(Ok(outcome));
        self
    }

    /// Queue a driver failure for the next executed statement.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.lock()
            .outcomes
            .push_back(Err(UpstreamError::new("database", message).into()));
        self
    }

    /// Number of connections opened so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects.len()
    }

    /// Connection configs seen, in order.
    pub fn connect_configs(&self) -> Vec<PostgresConfig> {
        self.lock().connects.clone()
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<SqlStatement> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SqlConnector for ScriptedSqlConnector {
    async fn connect(&self, config: &PostgresConfig) -> Result<Box<dyn SqlConnection>> {
        self.lock().connects.push(config.clone());
        Ok(Box::new(ScriptedConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedConnection {
    state: Arc<Mutex<ScriptedState>>,
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    async fn query(&mut self, statement: SqlStatement) -> Result<SqlOutcome> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queries.push(statement);
        state
            .outcomes
            .pop_front()
            .unwrap_or_else(|| Ok(SqlOutcome::default()))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
