pub mod dag;
pub mod error;
pub mod scheduler;

pub use dag::build_dag;
pub use error::GraphError;
pub use scheduler::topological_phases;
