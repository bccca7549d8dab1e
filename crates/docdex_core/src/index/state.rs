//! Lifecycle states and the resources they own.

use crate::buffers::BufferPool;
use crate::error::CoreResult;
use docdex_storage::{ContextPool, Environment};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    /// Definition assigned, no storage yet.
    Created,
    /// Storage open, metadata written.
    Initialized,
    /// Background loop started.
    Executing,
    /// Terminal.
    Disposed,
}

/// Storage and pools owned by an initialized index.
#[derive(Debug)]
pub(crate) struct IndexResources {
    pub(crate) contexts: Arc<ContextPool>,
    pub(crate) buffers: Arc<BufferPool>,
}

impl IndexResources {
    pub(crate) fn new(env: Environment) -> Self {
        Self {
            contexts: Arc::new(ContextPool::new(Arc::new(env))),
            buffers: Arc::new(BufferPool::new()),
        }
    }

    /// Closes the environment, then frees the buffer pool and the contexts.
    pub(crate) fn release(self) -> CoreResult<()> {
        let closed = self.contexts.environment().close();
        self.buffers.release();
        let active = self.contexts.active();
        if active > 0 {
            tracing::warn!(active, "index contexts still alive at release");
        }
        drop(self.contexts);
        closed?;
        Ok(())
    }
}

pub(crate) enum IndexState {
    Created,
    Initialized(IndexResources),
    Executing {
        resources: IndexResources,
        worker: JoinHandle<()>,
    },
    Disposed,
}

impl IndexState {
    pub(crate) fn phase(&self) -> IndexPhase {
        match self {
            Self::Created => IndexPhase::Created,
            Self::Initialized(_) => IndexPhase::Initialized,
            Self::Executing { .. } => IndexPhase::Executing,
            Self::Disposed => IndexPhase::Disposed,
        }
    }

    pub(crate) fn resources(&self) -> Option<&IndexResources> {
        match self {
            Self::Initialized(resources) | Self::Executing { resources, .. } => Some(resources),
            Self::Created | Self::Disposed => None,
        }
    }
}
