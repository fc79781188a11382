//! This module contains the batch driver, which analyses many protocols
//! concurrently on a bounded worker pool.
//!
//! Each worker owns the inputs and the output file of exactly one protocol,
//! so workers share nothing but the read-only configuration. A protocol that
//! fails, whether by returning an error or by panicking, is recorded in the
//! summary without affecting its siblings.

use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{DEFAULT_BATCH_THREADS, OUTPUT_FILE_SUFFIX},
    engine,
    error::{Error, Errors, Result},
    input::{protocol_name, ProtocolInput},
    watchdog::{DynWatchdog, LazyWatchdog},
};

/// The configuration for a batch run.
#[derive(Clone, Debug)]
pub struct Config {
    /// The number of worker threads.
    ///
    /// Defaults to [`DEFAULT_BATCH_THREADS`].
    pub threads: usize,

    /// The directory into which output documents are written.
    ///
    /// Defaults to the current directory.
    pub output_dir: PathBuf,

    /// The watchdog polled before each protocol starts.
    ///
    /// Defaults to a [`LazyWatchdog`].
    pub watchdog: DynWatchdog,
}

impl Config {
    /// Constructs a configuration writing its output to `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the `threads` config parameter to `value`.
    #[must_use]
    pub fn with_threads(mut self, value: usize) -> Self {
        self.threads = value;
        self
    }

    /// Sets the `output_dir` config parameter to `value`.
    #[must_use]
    pub fn with_output_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.output_dir = value.into();
        self
    }

    /// Sets the `watchdog` config parameter to `value`.
    #[must_use]
    pub fn with_watchdog(mut self, value: DynWatchdog) -> Self {
        self.watchdog = value;
        self
    }

    /// Gets the path of the output document for the protocol called `name`.
    #[must_use]
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}{OUTPUT_FILE_SUFFIX}"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads:    DEFAULT_BATCH_THREADS,
            output_dir: PathBuf::from("."),
            watchdog:   LazyWatchdog.in_arc(),
        }
    }
}

/// What happened to a single protocol in a batch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The protocol was analysed and its document written to `output`.
    Success { invariants: usize, output: PathBuf },

    /// The protocol could not be analysed.
    Failure { reason: String },

    /// The protocol was not started because the watchdog fired.
    Cancelled,
}

/// The results of a batch run.
#[derive(Clone, Debug, Default)]
pub struct BatchSummary {
    /// The outcome of each protocol, keyed by protocol name.
    pub outcomes: BTreeMap<String, Outcome>,

    /// The errors behind every failed protocol.
    pub errors: Errors,
}

impl BatchSummary {
    /// Gets the number of protocols that were analysed successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Success { .. }))
    }

    /// Gets the number of protocols that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failure { .. }))
    }

    /// Gets the number of protocols that were cancelled.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Cancelled))
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| predicate(o)).count()
    }
}

/// Finds the protocol directories directly beneath `root`, in name order.
///
/// # Errors
///
/// Returns [`Err`] if `root` cannot be listed.
pub fn discover(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let entries = std::fs::read_dir(root).map_err(|e| Error::io(root, &e))?;

    let mut dirs = vec![];
    for entry in entries {
        let path = entry.map_err(|e| Error::io(root, &e))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Analyses the protocols in each of `dirs` using `engine_config`, writing
/// one document per protocol as described by `config`.
///
/// # Errors
///
/// Returns [`Err`] if the output directory cannot be created or the worker
/// pool cannot be built. Failures of individual protocols are not errors, and
/// are instead recorded in the returned summary.
pub fn run(dirs: &[PathBuf], config: &Config, engine_config: &engine::Config) -> Result<BatchSummary> {
    std::fs::create_dir_all(&config.output_dir).map_err(|e| Error::io(&config.output_dir, &e))?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;

    tracing::info!(protocols = dirs.len(), threads = config.threads, "starting batch");
    let results: Vec<(String, Result<Option<Outcome>>)> = pool.install(|| {
        dirs.par_iter()
            .map(|dir| {
                let name = protocol_name(dir);
                let result = if config.watchdog.should_stop() {
                    Ok(None)
                } else {
                    contain(|| process(dir, config, engine_config)).map(Some)
                };
                (name, result)
            })
            .collect()
    });

    let mut summary = BatchSummary::default();
    for (name, result) in results {
        let outcome = match result {
            Ok(Some(outcome)) => outcome,
            Ok(None) => Outcome::Cancelled,
            Err(error) => {
                tracing::warn!(protocol = %name, %error, "protocol failed");
                let reason = error.to_string();
                summary.errors.add_located(name.as_str(), error);
                Outcome::Failure { reason }
            }
        };
        summary.outcomes.insert(name, outcome);
    }

    tracing::info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        cancelled = summary.cancelled(),
        "finished batch"
    );
    Ok(summary)
}

/// Loads, analyses and writes the document for the protocol in `dir`.
fn process(dir: &Path, config: &Config, engine_config: &engine::Config) -> Result<Outcome> {
    let input = ProtocolInput::from_dir(dir)?;
    let document = engine::new(&input, engine_config).run();

    let output = config.output_path(&input.name);
    document.write(&output)?;

    Ok(Outcome::Success {
        invariants: document.invariants.len(),
        output,
    })
}

/// Runs `work`, converting a panic into an error.
fn contain<T>(work: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        Err(Error::Panicked(panic_message(payload.as_ref())))
    })
}

/// Extracts the message from a panic `payload`.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, Arc};

    use crate::{
        batch::{contain, run, Config, Outcome},
        engine,
        error::{Error, Result},
        watchdog::FlagWatchdog,
    };

    #[test]
    fn panics_become_errors() {
        let result: Result<()> = contain(|| panic!("boom"));
        assert_eq!(result, Err(Error::Panicked("boom".into())));
    }

    #[test]
    fn stopped_watchdog_cancels_everything() -> anyhow::Result<()> {
        let out = tempfile::tempdir()?;
        let watchdog = FlagWatchdog::new(Arc::new(AtomicBool::new(true))).in_arc();
        let config = Config::new(out.path()).with_threads(1).with_watchdog(watchdog);

        let dirs = vec![out.path().join("never_started")];
        let summary = run(&dirs, &config, &engine::Config::default())?;
        assert_eq!(summary.outcomes["never_started"], Outcome::Cancelled);
        assert_eq!(summary.cancelled(), 1);
        assert!(summary.errors.is_empty());
        Ok(())
    }
}
