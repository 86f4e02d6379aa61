pub mod context;
pub mod error;
pub mod identifiers;
pub mod interface;
pub mod kind;
pub mod operation;
pub mod record;
pub mod spec;

pub use context::{ImageContextEntry, KeyContextEntry, NetworkContextEntry, TemplateContext, VmContextEntry};
pub use error::DomainError;
pub use identifiers::{resource_prefix, subnet_octet};
pub use interface::{CreateInput, DeleteInput, TestEnvArtifact};
pub use kind::{ResourceKind, ResourceRef};
pub use operation::{ErrorCode, OperationError, OperationResult};
pub use record::{
    EnvironmentRecord, EnvironmentStatus, ErrorRecord, ExecutionPlan, Operation, Phase, ResourceState, ResourceStatus,
};
pub use spec::{ImageDecl, KeyDecl, KeyType, NetworkDecl, ProviderDecl, TestEnvSpec, VmDecl};
