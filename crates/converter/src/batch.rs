use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use humansize::{format_size, BINARY};
use log::{debug, error, info, warn};
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use crate::backup::backup_file;
use crate::classifier::{self, is_video};
use crate::command::CommandBuilder;
use crate::config::BatchConfig;
use crate::error::{ConfigError, ConvertError};
use crate::executor::EncoderRunner;

/// One input file scheduled for conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub file_size: u64,
}

/// Result of processing one input file
#[derive(Debug)]
pub enum ConversionOutcome {
    Success,
    BackupFailed(ConvertError),
    EncodeFailed(ConvertError),
    /// Rejected before scheduling (stat failure, path collision)
    Skipped(ConvertError),
    /// The work unit panicked before reporting
    Aborted(String),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success)
    }
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &ConversionOutcome) {
        self.total += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.succeeded + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {}, succeeded: {}, failed: {}",
            self.total, self.succeeded, self.failed
        )
    }
}

/// Expand a glob pattern into the matching paths, sorted
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = glob::glob(pattern).map_err(|source| ConfigError::BadPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut matches = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => matches.push(path),
            Err(e) => warn!("Error reading matched path: {}", e),
        }
    }

    if matches.is_empty() {
        return Err(ConfigError::NoMatches(pattern.to_string()));
    }
    matches.sort();
    Ok(matches)
}

/// Output location for an input: same stem, `.mp4`, inside `output_dir`
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    // a bare dot name such as `.avi` is all extension
    let stem = match input.extension() {
        Some(_) => input.file_stem().unwrap_or_default(),
        None if classifier::extension(input).is_some() => OsStr::new(""),
        None => input.file_name().unwrap_or_default(),
    };
    let mut name = stem.to_os_string();
    name.push(".mp4");
    output_dir.join(name)
}

/// Canonical form of a path that may not exist yet
async fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path).await {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent).await {
            Ok(parent) => parent.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Files ready to schedule plus the ones rejected up front
#[derive(Debug, Default)]
pub struct Plan {
    pub items: Vec<WorkItem>,
    pub rejected: Vec<(PathBuf, ConvertError)>,
}

/// Classify, stat and check the matched paths
///
/// Non-video paths and directories are dropped without being counted. A
/// file is rejected when its output would land on itself or on any other
/// matched file, or when its output or backup name is already claimed by an
/// earlier match.
pub async fn plan(cfg: &BatchConfig, matches: &[PathBuf]) -> Plan {
    let mut plan = Plan::default();
    let mut claimed_outputs: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut claimed_backups: HashMap<OsString, PathBuf> = HashMap::new();

    // No output may replace a source, whether or not that source is converted
    let mut sources: HashMap<PathBuf, PathBuf> = HashMap::new();
    for path in matches {
        sources.insert(normalize(path).await, path.clone());
    }

    for path in matches {
        let metadata = fs::metadata(path).await;
        if matches!(&metadata, Ok(meta) if meta.is_dir()) {
            debug!("Skipping directory: {}", path.display());
            continue;
        }
        if !is_video(path) {
            info!("Skipping non-video file: {}", path.display());
            continue;
        }

        let size = match metadata {
            Ok(meta) => meta.len(),
            Err(source) => {
                plan.rejected.push((
                    path.clone(),
                    ConvertError::Stat {
                        path: path.clone(),
                        source,
                    },
                ));
                continue;
            }
        };

        let output_path = output_path_for(path, &cfg.output_dir);
        let normalized_output = normalize(&output_path).await;
        match sources.get(&normalized_output) {
            Some(source) if source == path => {
                plan.rejected.push((path.clone(), ConvertError::PathCollision(path.clone())));
                continue;
            }
            Some(source) => {
                plan.rejected.push((
                    path.clone(),
                    ConvertError::DuplicateTarget {
                        path: path.clone(),
                        first: source.clone(),
                    },
                ));
                continue;
            }
            None => {}
        }

        let backup_name = path.file_name().unwrap_or_default().to_os_string();
        let earlier = claimed_outputs
            .get(&normalized_output)
            .or_else(|| claimed_backups.get(&backup_name));
        if let Some(first) = earlier {
            plan.rejected.push((
                path.clone(),
                ConvertError::DuplicateTarget {
                    path: path.clone(),
                    first: first.clone(),
                },
            ));
            continue;
        }
        claimed_outputs.insert(normalized_output, path.clone());
        claimed_backups.insert(backup_name, path.clone());

        debug!("Queued {} ({})", path.display(), format_size(size, BINARY));
        plan.items.push(WorkItem {
            input_path: path.clone(),
            output_path,
            file_size: size,
        });
    }

    plan
}

async fn path_exists(path: &Path) -> bool {
    match fs::symlink_metadata(path).await {
        Ok(_) => true,
        // unknown counts as present so nothing foreign gets deleted
        Err(e) => e.kind() != std::io::ErrorKind::NotFound,
    }
}

/// Run one work unit: backup, then encode
///
/// A failed encode removes the output only if this unit created it; a file
/// that was already at the output path is left alone.
pub async fn process_item<R>(cfg: &BatchConfig, runner: &R, item: &WorkItem) -> ConversionOutcome
where
    R: EncoderRunner + ?Sized,
{
    if let Err(e) = backup_file(&item.input_path, &cfg.backup_dir()).await {
        return ConversionOutcome::BackupFailed(e);
    }

    let preexisting = path_exists(&item.output_path).await;
    let args = CommandBuilder::new().build_args(item, cfg);
    match runner.run(&args).await {
        Ok(_) => ConversionOutcome::Success,
        Err(e) => {
            if preexisting {
                debug!(
                    "Keeping {}, it existed before this conversion",
                    item.output_path.display()
                );
            } else if let Err(rm) = fs::remove_file(&item.output_path).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to remove partial output {}: {}",
                        item.output_path.display(),
                        rm
                    );
                }
            }
            ConversionOutcome::EncodeFailed(e)
        }
    }
}

fn report(item_path: &Path, output_path: Option<&Path>, outcome: &ConversionOutcome) {
    match outcome {
        ConversionOutcome::Success => match output_path {
            Some(out) => info!("Converted {} -> {}", item_path.display(), out.display()),
            None => info!("Converted {}", item_path.display()),
        },
        ConversionOutcome::BackupFailed(e) => {
            error!("Backup failed for {}: {}", item_path.display(), e)
        }
        ConversionOutcome::EncodeFailed(e) => {
            error!("Conversion failed for {}: {}", item_path.display(), e)
        }
        ConversionOutcome::Skipped(e) => {
            error!("Rejected {}: {}", item_path.display(), e)
        }
        ConversionOutcome::Aborted(reason) => {
            error!("Conversion aborted for {}: {}", item_path.display(), reason)
        }
    }
}

/// Runs a whole batch with a fixed pool of workers
pub struct BatchRunner<R> {
    cfg: Arc<BatchConfig>,
    runner: Arc<R>,
}

impl<R> BatchRunner<R>
where
    R: EncoderRunner + 'static,
{
    pub fn new(cfg: BatchConfig, runner: R) -> Self {
        Self {
            cfg: Arc::new(cfg),
            runner: Arc::new(runner),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.cfg
    }

    /// Convert every matching video and return the final counts
    ///
    /// Configuration problems are returned before any file is touched.
    /// Per-file failures only show up in the summary and the log.
    pub async fn run(&self) -> Result<BatchSummary, ConfigError> {
        let cfg = &self.cfg;
        cfg.validate()?;

        fs::create_dir_all(&cfg.output_dir)
            .await
            .map_err(|source| ConfigError::OutputDir {
                path: cfg.output_dir.clone(),
                source,
            })?;

        let matches = expand_pattern(&cfg.input_pattern)?;
        info!("Pattern {} matched {} path(s)", cfg.input_pattern, matches.len());

        let plan = plan(cfg, &matches).await;
        let mut summary = BatchSummary::default();
        for (path, err) in plan.rejected {
            let outcome = ConversionOutcome::Skipped(err);
            report(&path, None, &outcome);
            summary.record(&outcome);
        }

        if plan.items.is_empty() {
            return Ok(summary);
        }

        let workers = cfg.max_concurrency.min(plan.items.len());
        info!(
            "Converting {} file(s) with {} worker(s)",
            plan.items.len(),
            workers
        );

        let (queue_tx, queue_rx) = mpsc::channel::<WorkItem>(plan.items.len());
        for item in plan.items {
            // capacity equals the item count, so this never waits
            if queue_tx.send(item).await.is_err() {
                break;
            }
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<(WorkItem, ConversionOutcome)>();
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let outcome_tx = outcome_tx.clone();
            let cfg = Arc::clone(&self.cfg);
            let runner = Arc::clone(&self.runner);
            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(item) = next else { break };
                    debug!("Worker {} picked up {}", worker_id, item.input_path.display());
                    // a panic inside the unit becomes its outcome instead of losing the item
                    let unit = {
                        let cfg = Arc::clone(&cfg);
                        let runner = Arc::clone(&runner);
                        let item = item.clone();
                        tokio::spawn(async move {
                            process_item(cfg.as_ref(), runner.as_ref(), &item).await
                        })
                    };
                    let outcome = match unit.await {
                        Ok(outcome) => outcome,
                        Err(e) => ConversionOutcome::Aborted(e.to_string()),
                    };
                    if outcome_tx.send((item, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(outcome_tx);

        while let Some((item, outcome)) = outcome_rx.recv().await {
            report(&item.input_path, Some(&item.output_path), &outcome);
            summary.record(&outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }

        Ok(summary)
    }
}
