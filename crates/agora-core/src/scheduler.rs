//! # Scheduler
//!
//! The opportunistic control loop.
//!
//! Every cycle:
//! 1. ask every registered worker for its score against the board
//! 2. pick the strictly greatest score; ties go to the earliest registered
//! 3. stop when the best score is `<= 0` (fixpoint)
//! 4. otherwise activate the winner, append its activation record and let it
//!    stamp messages on that record
//!
//! The loop is greedy and never backtracks. It owns the board exclusively
//! for the duration of a step; one worker runs at a time.

use crate::board::Board;
use crate::feature::FeatureRegistry;
use crate::primitives::DEFAULT_MAX_ACTIVATIONS;
use crate::worker::Worker;
use crate::workers::{CandidateSource, builtin_workers};
use crate::AgoraError;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Message stamped on a record whose activation overran the deadline.
pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Limits for a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Fail with `ActivationLimit` after this many activations.
    /// `None` runs until fixpoint.
    pub max_activations: Option<usize>,
    /// Activations slower than this are logged and stamped with
    /// `DEADLINE_EXCEEDED`. They are never interrupted.
    pub activation_deadline: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_activations: Some(DEFAULT_MAX_ACTIVATIONS),
            activation_deadline: None,
        }
    }
}

// =============================================================================
// STEP AND REPORT
// =============================================================================

/// Outcome of one scheduler cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The named worker won with `score` and ran.
    Activated { worker: String, score: f64 },
    /// No worker reported a positive score.
    Fixpoint,
}

/// Summary of a full run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub activations: usize,
    /// Activation count per worker name.
    pub per_worker: BTreeMap<String, usize>,
    /// Activations that overran the configured deadline.
    pub slow_activations: usize,
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Registered workers plus run limits.
pub struct Scheduler {
    workers: Vec<Box<dyn Worker>>,
    config: SchedulerConfig,
    slow_activations: usize,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.worker_names())
            .field("config", &self.config)
            .finish()
    }
}

impl Scheduler {
    /// A scheduler with no workers.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            workers: Vec::new(),
            config,
            slow_activations: 0,
        }
    }

    /// A scheduler with every built-in control worker registered, fed by
    /// `source` for candidates.
    #[must_use]
    pub fn with_builtin_workers(
        config: SchedulerConfig,
        features: Rc<FeatureRegistry>,
        source: Box<dyn CandidateSource>,
    ) -> Self {
        let mut scheduler = Self::new(config);
        for worker in builtin_workers(features, source) {
            scheduler.register(worker);
        }
        scheduler
    }

    /// Register a worker. Registration order breaks score ties.
    pub fn register(&mut self, worker: Box<dyn Worker>) {
        tracing::debug!(worker = worker.name(), kind = %worker.kind(), "worker registered");
        self.workers.push(worker);
    }

    #[must_use]
    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Index and score of the worker that would win right now.
    pub fn select(&self, board: &Board) -> Result<Option<(usize, f64)>, AgoraError> {
        let mut best: Option<(usize, f64)> = None;
        let mut best_score = 0.0;
        for (index, worker) in self.workers.iter().enumerate() {
            let score = worker.score(board)?;
            if score > best_score {
                best_score = score;
                best = Some((index, score));
            }
        }
        Ok(best)
    }

    /// Run one cycle.
    pub fn step(&mut self, board: &mut Board) -> Result<Step, AgoraError> {
        let Some((index, score)) = self.select(board)? else {
            return Ok(Step::Fixpoint);
        };
        let deadline = self.config.activation_deadline;
        let Some(worker) = self.workers.get_mut(index) else {
            return Ok(Step::Fixpoint);
        };

        let name = worker.name().to_string();
        let kind = worker.kind();
        tracing::debug!(worker = %name, %kind, score, "activating worker");

        let started = Instant::now();
        worker.activate(board)?;
        let elapsed = started.elapsed();

        board.append_activation_record(&name, kind);
        worker.on_activation_recorded(board)?;

        if let Some(limit) = deadline {
            if elapsed > limit {
                tracing::warn!(
                    worker = %name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    deadline_ms = limit.as_millis() as u64,
                    "activation exceeded deadline"
                );
                board.append_message_to_last(DEADLINE_EXCEEDED)?;
                self.slow_activations += 1;
            }
        }

        Ok(Step::Activated { worker: name, score })
    }

    /// Step until fixpoint.
    ///
    /// # Errors
    ///
    /// Any worker error, or `ActivationLimit` when the cap is reached first.
    pub fn run(&mut self, board: &mut Board) -> Result<RunReport, AgoraError> {
        let mut report = RunReport::default();
        self.slow_activations = 0;

        loop {
            if let Some(limit) = self.config.max_activations {
                if report.activations >= limit && self.select(board)?.is_some() {
                    tracing::warn!(limit, "activation limit reached before fixpoint");
                    return Err(AgoraError::ActivationLimit(limit));
                }
            }
            match self.step(board)? {
                Step::Fixpoint => break,
                Step::Activated { worker, .. } => {
                    report.activations += 1;
                    *report.per_worker.entry(worker).or_insert(0) += 1;
                }
            }
        }

        report.slow_activations = self.slow_activations;
        tracing::info!(
            activations = report.activations,
            slow = report.slow_activations,
            "scheduler reached fixpoint"
        );
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
