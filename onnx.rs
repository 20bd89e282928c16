use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use ndarray::Array4;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Dense output tensor copied out of the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// A loaded detection model. Implementations must accept concurrent `run`
/// calls from several worker threads.
pub trait InferenceSession: Send + Sync {
    fn run(&self, input: Array4<f32>) -> Result<RawOutput>;
}

/// ONNX Runtime session on the CPU execution provider. `Session::run` needs
/// exclusive access, so concurrent callers are serialised on the mutex.
pub struct OrtSession {
    session: Mutex<Session>,
    label: String,
}

impl InferenceSession for OrtSession {
    fn run(&self, input: Array4<f32>) -> Result<RawOutput> {
        let (n, c, h, w) = input.dim();
        let input = input.as_standard_layout().into_owned();
        let (data, _offset) = input.into_raw_vec_and_offset();
        let input_value = ort::value::Value::from_array(([n, c, h, w], data))
            .map_err(|e| Error::Inference(format!("Invalid input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Inference(format!("{} session lock poisoned", self.label)))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| Error::Inference(format!("Failed to run {} model: {e}", self.label)))?;
        if outputs.len() == 0 {
            return Err(Error::Inference(format!("{} model returned no outputs", self.label)));
        }
        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(format!("Unreadable {} output: {e}", self.label)))?;
        let shape = output_shape
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .collect();
        Ok(RawOutput {
            shape,
            data: output_data.to_vec(),
        })
    }
}

fn ensure_environment() -> Result<()> {
    let committed = ort::init()
        .with_name("plate-blur")
        .commit()
        .map_err(|e| Error::Init(format!("Failed to init ORT environment: {e}")))?;
    if committed {
        if let Ok(env) = ort::environment::get_environment() {
            env.set_log_level(ort::logging::LogLevel::Warning);
        }
    }
    Ok(())
}

pub fn build_session(model_path: &Path, intra_threads: usize) -> Result<OrtSession> {
    if !model_path.exists() {
        return Err(Error::Init(format!(
            "Model not found: {}",
            model_path.display()
        )));
    }

    let build = || -> Result<Session> {
        ensure_environment()?;
        Session::builder()
            .map_err(|e| Error::Init(format!("{e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(|e| Error::Init(format!("{e}")))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| Error::Init(format!("{e}")))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| Error::Init(format!("{e}")))?
            .commit_from_file(model_path)
            .map_err(|e| Error::Init(format!("{e}")))
    };
    let session = match catch_unwind(AssertUnwindSafe(build)) {
        Ok(res) => res?,
        Err(_) => {
            return Err(Error::Init(
                "ONNX Runtime panicked while building session".into(),
            ))
        }
    };

    Ok(OrtSession {
        session: Mutex::new(session),
        label: model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("detection")
            .to_string(),
    })
}

pub enum SessionState {
    Ready(Arc<dyn InferenceSession>),
    Unavailable(String),
}

type Loader = Box<dyn Fn() -> Result<Arc<dyn InferenceSession>> + Send + Sync>;

/// Loads the detection model at most once. A failed load is remembered as
/// `Unavailable` and never retried for the lifetime of the manager.
pub struct SessionManager {
    loader: Loader,
    state: OnceLock<SessionState>,
    load_attempts: AtomicUsize,
}

impl SessionManager {
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn InferenceSession>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            state: OnceLock::new(),
            load_attempts: AtomicUsize::new(0),
        }
    }

    pub fn from_model_path(model_path: PathBuf, intra_threads: usize) -> Self {
        Self::with_loader(move || {
            let session = build_session(&model_path, intra_threads)?;
            log::info!("Loaded plate detection model: {}", model_path.display());
            Ok(Arc::new(session) as Arc<dyn InferenceSession>)
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::from_model_path(config.model_path.clone(), config.intra_threads)
    }

    pub fn session(&self) -> Result<Arc<dyn InferenceSession>> {
        let state = self.state.get_or_init(|| {
            self.load_attempts.fetch_add(1, Ordering::SeqCst);
            match (self.loader)() {
                Ok(session) => SessionState::Ready(session),
                Err(err) => {
                    log::warn!("Plate detection model unavailable; plates will not be blurred: {err}");
                    SessionState::Unavailable(format!("{err}"))
                }
            }
        });
        match state {
            SessionState::Ready(session) => Ok(Arc::clone(session)),
            SessionState::Unavailable(reason) => Err(Error::ModelUnavailable(reason.clone())),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.get(), Some(SessionState::Unavailable(_)))
    }

    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }
}
