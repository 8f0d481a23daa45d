//! CPU backend implementation
//!
//! Reference implementation of [`DeviceBackend`] executing jobs on host
//! threads.
//!
//! # Architecture
//!
//! ```text
//! CpuBackend
//! ├── ready queue   - rayon pool FIFO (`spawn_fifo`)
//! ├── workers       - `workers` pool threads, one job each at a time
//! └── kernels       - work-groups fanned out with `into_par_iter`
//! ```

mod executor;

use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::backend::{DeviceBackend, DeviceInfo, DeviceKind, ExecCapabilities, Job, QueueProperties};
use crate::error::{BackendError, Result};

use executor::execute;

const ENV_WORKERS: &str = "FERROCL_CPU_WORKERS";

/// Configuration for [`CpuBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuBackendConfig {
    /// Worker threads; 0 picks the available parallelism.
    pub workers: usize,
    pub thread_name: String,
    pub device_name: String,
    pub max_work_group_size: usize,
    /// Sub-buffer alignment in bits.
    pub mem_base_addr_align: u32,
    pub image_support: bool,
    pub native_kernels: bool,
}

impl Default for CpuBackendConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            thread_name: "ferrocl-cpu".to_string(),
            device_name: "ferrocl host cpu".to_string(),
            max_work_group_size: 1024,
            mem_base_addr_align: 1024,
            image_support: true,
            native_kernels: true,
        }
    }
}

impl CpuBackendConfig {
    /// Defaults, with `FERROCL_CPU_WORKERS` applied when it parses.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env::var(ENV_WORKERS).ok().and_then(|v| v.trim().parse().ok()) {
            config.workers = workers;
        }
        config
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(1, usize::from)
        }
    }

    pub fn device_info(&self) -> DeviceInfo {
        let mut exec_capabilities = ExecCapabilities::KERNEL;
        if self.native_kernels {
            exec_capabilities |= ExecCapabilities::NATIVE_KERNEL;
        }
        DeviceInfo {
            name: self.device_name.clone(),
            kind: DeviceKind::Cpu,
            compute_units: u32::try_from(self.resolved_workers()).unwrap_or(u32::MAX),
            max_work_group_size: self.max_work_group_size,
            max_work_item_sizes: [self.max_work_group_size; 3],
            mem_base_addr_align: self.mem_base_addr_align,
            queue_properties: QueueProperties::all(),
            exec_capabilities,
            image_support: self.image_support,
        }
    }
}

/// Host-thread backend.
pub struct CpuBackend {
    info: DeviceInfo,
    pool: rayon::ThreadPool,
    accepting: AtomicBool,
    submitted: AtomicU64,
}

impl CpuBackend {
    /// Backend with [`CpuBackendConfig::from_env`].
    pub fn new() -> Result<Self> {
        Self::with_config(CpuBackendConfig::from_env())
    }

    #[tracing::instrument(skip_all, fields(workers = config.workers))]
    pub fn with_config(config: CpuBackendConfig) -> Result<Self> {
        let workers = config.resolved_workers();
        let prefix = config.thread_name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |index| format!("{prefix}-{index}"))
            .build()
            .map_err(|err| BackendError::WorkerPool(err.to_string()))?;
        let info = config.device_info();
        tracing::debug!(device = %info.name, workers, "cpu_backend_created");
        Ok(Self {
            info,
            pool,
            accepting: AtomicBool::new(true),
            submitted: AtomicU64::new(0),
        })
    }

    /// Jobs accepted since creation.
    pub fn submitted_jobs(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl DeviceBackend for CpuBackend {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn submit(&self, job: Job) -> Result<()> {
        if !self.is_available() {
            return Err(BackendError::Unavailable(self.info.name.clone()));
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let Job { operation, observer } = job;
        self.pool.spawn_fifo(move || {
            observer.started();
            let result = execute(operation);
            observer.finished(result);
        });
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            tracing::debug!(device = %self.info.name, "cpu_backend_shutdown");
        }
    }
}
