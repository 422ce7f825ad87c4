//! Application context - wires everything together

use std::path::Path;
use std::sync::Arc;

use tontine_notify::{ConsoleNotifier, JsonlAuditSink, LogNotifier, SinkRegistry};
use tontine_validation::{
    ApprovalPolicy, SystemClock, ValidationConfig, ValidationStore, ValidationWorkflow,
};

use crate::directory::FileDirectory;

/// Application context - the wired validation engine
///
/// Under the data directory: `validation.db` (request store),
/// `resources.json` (the stand-in resource directory), `audit/`
/// (JSONL trail) and optionally `config.json`.
pub struct AppContext {
    pub workflow: ValidationWorkflow,
    pub directory: Arc<FileDirectory>,
    pub store: Arc<ValidationStore>,
}

impl AppContext {
    /// Create a new application context rooted at the data directory
    pub fn new(data_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_path = data_path.as_ref();
        std::fs::create_dir_all(data_path)?;

        let config_path = data_path.join("config.json");
        let config = if config_path.exists() {
            ValidationConfig::from_file(&config_path)?
        } else {
            ValidationConfig::default()
        };

        let store = Arc::new(ValidationStore::new(data_path.join("validation.db"))?);
        let directory = Arc::new(FileDirectory::open(data_path.join("resources.json"))?);

        // Log lines first, then the terminal stands in for delivery,
        // and every operation lands in the JSONL trail.
        let mut sinks = SinkRegistry::new();
        sinks.register_notifier(Arc::new(LogNotifier));
        sinks.register_notifier(Arc::new(ConsoleNotifier));
        sinks.register_audit(Arc::new(JsonlAuditSink::new(data_path.join("audit"))?));

        let workflow = ValidationWorkflow::new(
            Arc::clone(&store),
            ApprovalPolicy::default(),
            config,
            Arc::clone(&directory) as Arc<dyn tontine_validation::ResourceResolver>,
            sinks,
            Arc::new(SystemClock),
        );

        Ok(Self {
            workflow,
            directory,
            store,
        })
    }
}
