use crate::error::{Error, Result};
use crate::models::{BatchReport, PhotoOutcome};
use crate::pipeline::Pipeline;
use crate::raster;
use crate::storage::PhotoStore;
use crossbeam_channel::{bounded, Receiver};
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use walkdir::WalkDir;

const PROGRESS_EVERY: usize = 25;

/// Expands the given paths into a sorted list of image files. Directories are
/// walked recursively; files are taken as given.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| raster::is_supported_image(p)),
            );
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    files
}

#[derive(Default)]
struct Progress {
    processed: AtomicUsize,
    failed: AtomicUsize,
}

impl Progress {
    fn record(&self, ok: bool, total: usize, started: Instant) {
        let counter = if ok { &self.processed } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        let done = self.processed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        if done % PROGRESS_EVERY == 0 || done == total {
            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
            log::info!("Processed {done}/{total} photos ({rate:.1}/s)");
        }
    }
}

/// Runs every input through the pipeline on `workers` threads and stores the
/// results. One photo failing, or panicking, never affects the others.
pub fn run_batch(
    pipeline: Arc<Pipeline>,
    store: Arc<dyn PhotoStore>,
    inputs: Vec<PathBuf>,
    workers: usize,
    queue_depth: usize,
) -> BatchReport {
    let total = inputs.len();
    let workers = workers.clamp(1, total.max(1));
    let (tx, rx) = bounded::<PathBuf>(queue_depth.max(1));
    let outcomes = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let progress = Arc::new(Progress::default());
    let started = Instant::now();

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let rx = rx.clone();
            let pipeline = Arc::clone(&pipeline);
            let store = Arc::clone(&store);
            let outcomes = Arc::clone(&outcomes);
            let progress = Arc::clone(&progress);
            thread::spawn(move || {
                run_worker(rx, &pipeline, store.as_ref(), &outcomes, &progress, total, started)
            })
        })
        .collect();
    drop(rx);

    for path in inputs {
        if tx.send(path).is_err() {
            break;
        }
    }
    drop(tx);

    for handle in handles {
        if handle.join().is_err() {
            log::error!("Batch worker thread panicked");
        }
    }

    let mut outcomes = match Arc::try_unwrap(outcomes) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
        Err(shared) => shared.lock().map(|o| o.clone()).unwrap_or_default(),
    };
    outcomes.sort_by(|a: &PhotoOutcome, b| a.input.cmp(&b.input));
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    BatchReport {
        processed: outcomes.len() - failed,
        failed,
        outcomes,
    }
}

fn run_worker(
    rx: Receiver<PathBuf>,
    pipeline: &Pipeline,
    store: &dyn PhotoStore,
    outcomes: &Mutex<Vec<PhotoOutcome>>,
    progress: &Progress,
    total: usize,
    started: Instant,
) {
    for path in rx.iter() {
        let result = match catch_unwind(AssertUnwindSafe(|| process_file(&path, pipeline, store))) {
            Ok(res) => res,
            Err(_) => Err(Error::Processing(format!("Processing panicked for {}", path.display()))),
        };
        let input = path.to_string_lossy().to_string();
        let outcome = match result {
            Ok((url, regions)) => PhotoOutcome {
                input,
                url: Some(url),
                regions,
                error: None,
            },
            Err(err) => {
                log::warn!("Failed to process {}: {err}", path.display());
                PhotoOutcome {
                    input,
                    error: Some(err.to_string()),
                    ..PhotoOutcome::default()
                }
            }
        };
        progress.record(outcome.error.is_none(), total, started);
        if let Ok(mut guard) = outcomes.lock() {
            guard.push(outcome);
        }
    }
}

fn process_file(path: &Path, pipeline: &Pipeline, store: &dyn PhotoStore) -> Result<(String, usize)> {
    let bytes = fs::read(path)?;
    let photo = pipeline.process_with_report(&bytes)?;
    let url = store.put(&photo.bytes)?;
    Ok((url, photo.regions.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectionMethod, PipelineConfig};
    use crate::storage::LocalDirStore;
    use crossbeam_channel::TrySendError;
    use image::{Rgb, RgbImage};

    fn offline_pipeline() -> Arc<Pipeline> {
        let config = PipelineConfig {
            detection_method: Some(DetectionMethod::None),
            ..PipelineConfig::default()
        };
        Arc::new(Pipeline::new(config).unwrap())
    }

    #[test]
    fn bounded_channel_applies_backpressure() {
        let (tx, _rx) = bounded::<PathBuf>(1);
        tx.send(PathBuf::from("a.jpg")).unwrap();
        match tx.try_send(PathBuf::from("b.jpg")) {
            Err(TrySendError::Full(_)) => {}
            other => panic!("Expected backpressure, got {other:?}"),
        }
    }

    #[test]
    fn collect_inputs_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("lot").join("car");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("front.JPG"), b"x").unwrap();
        fs::write(dir.path().join("side.png"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = collect_inputs(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| raster::is_supported_image(p)));
    }

    #[test]
    fn corrupt_file_does_not_affect_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = Vec::new();
        for i in 0..4 {
            let path = dir.path().join(format!("car_{i}.png"));
            RgbImage::from_pixel(120, 90, Rgb([30, 60, 90]))
                .save(&path)
                .unwrap();
            inputs.push(path);
        }
        let broken = dir.path().join("broken.jpg");
        fs::write(&broken, b"not a jpeg at all").unwrap();
        inputs.push(broken.clone());
        inputs.push(dir.path().join("missing.jpg"));

        let store = Arc::new(LocalDirStore::new(dir.path().join("out")).unwrap());
        let report = run_batch(offline_pipeline(), store.clone(), inputs, 3, 2);

        assert_eq!(report.processed, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.outcomes.len(), 6);
        let broken_outcome = report
            .outcomes
            .iter()
            .find(|o| o.input == broken.to_string_lossy())
            .unwrap();
        assert!(broken_outcome.url.is_none());
        assert!(broken_outcome.error.as_deref().unwrap().contains("Decode"));
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 4);
    }

    #[test]
    fn empty_batch_is_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalDirStore::new(dir.path()).unwrap());
        let report = run_batch(offline_pipeline(), store, Vec::new(), 4, 8);
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 0);
        assert!(report.outcomes.is_empty());
    }
}
