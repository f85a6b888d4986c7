// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tree runner.
//!
//! Owns the simulated client, the context manager, the handle registry and
//! the node factory, and ticks one tree at a time until it settles.

use crate::config::{ConfigError, RunnerConfig};
use pvbridge::tree::xml;
use pvbridge::{
    Blackboard, ContextManager, HandleRegistry, NodeFactory, NodeStatus, SimClient, Tree,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Runner errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] pvbridge::Error),
}

/// Process exit code for a finished tree.
///
/// `0` on success, `1` on failure, `2` when the tree never settled.
#[must_use]
pub fn exit_code(status: NodeStatus) -> i32 {
    match status {
        NodeStatus::Success => 0,
        NodeStatus::Failure => 1,
        NodeStatus::Idle | NodeStatus::Running => 2,
    }
}

/// Handle to stop a running tree from another thread.
#[derive(Clone, Debug)]
pub struct RunnerHandle {
    running: Arc<AtomicBool>,
}

impl RunnerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Request the tick loop to halt the tree and return.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

pub struct Runner {
    config: RunnerConfig,
    sim: SimClient,
    context: Arc<ContextManager>,
    registry: Arc<HandleRegistry>,
    factory: NodeFactory,
    running: Arc<AtomicBool>,
}

impl Runner {
    /// Seed the simulated PVs and initialize the client context on the
    /// calling thread.
    pub fn new(config: RunnerConfig) -> Result<Self, RunnerError> {
        config.validate()?;

        let sim = SimClient::new();
        for pv in &config.sim.pvs {
            sim.add_pv(&pv.name, pv.to_sim_pv()?);
        }

        let context = ContextManager::shared(sim.shared());
        context.init()?;
        let registry = HandleRegistry::shared(Arc::clone(&context), config.bridge.handle_options());

        let mut factory = NodeFactory::new();
        factory.register_pv_nodes(&context, &registry, &config.bridge);

        tracing::info!(
            "runner ready: {} simulated PVs, default timeout {:?}",
            config.sim.pvs.len(),
            config.bridge.default_timeout()
        );

        Ok(Self {
            config,
            sim,
            context,
            registry,
            factory,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Simulated client serving the configured PVs.
    pub fn sim(&self) -> &SimClient {
        &self.sim
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &NodeFactory {
        &self.factory
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Build a tree from XML text with a fresh blackboard.
    pub fn load(&self, xml: &str) -> Result<Tree, RunnerError> {
        Ok(xml::load_tree(&self.factory, xml, Blackboard::shared())?)
    }

    /// Build a tree from an XML file with a fresh blackboard.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Tree, RunnerError> {
        Ok(xml::load_tree_file(&self.factory, path, Blackboard::shared())?)
    }

    /// Tick `tree` until it settles or [`RunnerHandle::stop`] is called.
    ///
    /// Expired registry entries are swept every `bridge.gc_interval_ms`.
    /// The tree is dropped before returning so its handles are released.
    pub fn run(&self, mut tree: Tree) -> Result<NodeStatus, RunnerError> {
        let interval = self.config.tick_interval();
        let gc_interval = self.config.bridge.gc_interval();
        let started = Instant::now();
        let mut last_gc = started;
        let mut ticks: u64 = 0;

        self.running.store(true, Ordering::Relaxed);
        tracing::info!("running tree '{}'", tree.id());

        let status = loop {
            if !self.running.load(Ordering::Relaxed) {
                tracing::warn!("tree '{}' stopped after {} ticks", tree.id(), ticks);
                tree.halt();
                break NodeStatus::Idle;
            }

            let status = match tree.tick_once() {
                Ok(status) => status,
                Err(e) => {
                    self.running.store(false, Ordering::Relaxed);
                    return Err(e.into());
                }
            };
            ticks += 1;
            if status != NodeStatus::Running {
                break status;
            }

            if let Some(every) = gc_interval {
                if last_gc.elapsed() >= every {
                    let removed = self.registry.collect_garbage();
                    tracing::debug!("registry sweep removed {} entries", removed);
                    last_gc = Instant::now();
                }
            }
            if !interval.is_zero() {
                std::thread::sleep(interval);
            }
        };

        self.running.store(false, Ordering::Relaxed);
        tracing::info!(
            "tree '{}' finished {} after {} ticks ({:?})",
            tree.id(),
            status,
            ticks,
            started.elapsed()
        );
        drop(tree);
        self.registry.collect_garbage();
        Ok(status)
    }

    /// Drop every registry entry and tear down the client context.
    pub fn shutdown(self) {
        self.registry.clear();
        self.context.shutdown();
        tracing::info!("runner shut down");
    }
}
