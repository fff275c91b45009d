pub mod actions;
pub mod catalog;
pub mod context;
pub mod defaults;
pub mod executor;
pub mod history;
pub mod loader;
pub mod runner;
pub mod service;

pub use actions::{create_default_registry, ActionRegistry, ActionResult, StepAction};
pub use catalog::PlaybookCatalog;
pub use context::ActionContext;
pub use executor::StepExecutor;
pub use history::{ExecutionHistory, DEFAULT_HISTORY_CAPACITY};
pub use runner::ExecutionRunner;
pub use service::PlaybookService;
