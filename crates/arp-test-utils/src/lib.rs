//! Testing utilities for the ARP workspace
//!
//! Shared fixtures: a state directory plus a work directory, and a scripted
//! operation executor.

#![allow(missing_docs)]

use arp_core::{PipelineConfig, Scheduler, StoreConfig};
use arp_prediction::FsInspector;
use arp_store::KnowledgeStore;
use arp_workflow::{
    FileCheckpoints, OperationExecutor, OperationRequest, OperationResult, WorkflowCoordinator,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Failure message the keyword classifier rates high
pub const BUILD_FAILURE: &str = "Build failed: No such module 'Core'";

/// Temporary state and work directories with a store on the former
pub struct Workspace {
    state: TempDir,
    work: TempDir,
    pub store: Arc<KnowledgeStore>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_store_config(StoreConfig::default())
    }

    pub fn with_store_config(config: StoreConfig) -> Self {
        let state = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(KnowledgeStore::open(state.path(), config).unwrap());
        Self { state, work, store }
    }

    pub fn state_dir(&self) -> &Path {
        self.state.path()
    }

    pub fn work_dir(&self) -> &Path {
        self.work.path()
    }

    pub fn path(&self, target: &str) -> PathBuf {
        self.work.path().join(target)
    }

    /// Write a file under the work directory, creating parents
    pub fn write(&self, target: &str, content: &str) -> PathBuf {
        let path = self.path(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, target: &str) -> Option<String> {
        std::fs::read_to_string(self.path(target)).ok()
    }

    pub fn checkpoints(&self) -> FileCheckpoints {
        FileCheckpoints::new(self.state.path().join("checkpoints"), self.work.path())
    }

    /// Coordinator whose targets and checkpoints live in this workspace
    pub fn coordinator(&self, config: &PipelineConfig) -> WorkflowCoordinator {
        WorkflowCoordinator::new(Arc::clone(&self.store), config, Scheduler::new())
            .with_checkpoints(Arc::new(self.checkpoints()))
            .with_inspector(Arc::new(FsInspector::new(self.work.path())))
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic configuration: seeded evolution, one retry
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.strategy.evolution_seed = Some(7);
    config.workflow.max_retries = 1;
    config
}

/// Executor returning a scripted outcome per attempt
///
/// Once the script runs out the last outcome repeats. Each call can also
/// write a file to stand in for the operation's side effect.
pub struct ScriptedExecutor {
    script: Vec<bool>,
    message: String,
    elapsed: Duration,
    writes: Option<(PathBuf, String)>,
    calls: Mutex<Vec<OperationRequest>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            message: BUILD_FAILURE.to_string(),
            elapsed: Duration::from_secs(30),
            writes: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new([true])
    }

    pub fn failing() -> Self {
        Self::new([false])
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Overwrite `path` with `content` on every call
    #[must_use]
    pub fn writing(mut self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.writes = Some((path.into(), content.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<OperationRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl OperationExecutor for ScriptedExecutor {
    async fn execute(&self, request: &OperationRequest) -> OperationResult {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len() - 1
        };
        if let Some((path, content)) = &self.writes {
            std::fs::write(path, content).unwrap();
        }
        let success = self
            .script
            .get(index)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(true);
        if success {
            OperationResult::success("ok", self.elapsed)
        } else {
            OperationResult::failure(self.message.clone(), self.elapsed)
        }
    }
}
