pub mod execution;
pub mod playbook;

pub use execution::*;
pub use playbook::*;
