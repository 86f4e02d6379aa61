use testenv_domain::{DomainError, ResourceKind};
use testenv_template::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("malformed spec at '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("no provider is declared")]
    NoProvider,

    #[error("{kind} '{name}' has an empty name")]
    EmptyName { kind: ResourceKind, name: String },

    #[error("{kind} '{name}' references undeclared provider '{provider}'")]
    UnknownProvider { kind: ResourceKind, name: String, provider: String },

    #[error("vm '{name}' has non-positive {field}: {value}")]
    NonPositive { name: String, field: &'static str, value: i64 },

    #[error("{kind} '{name}' field '{field_path}' references undeclared {target_kind} '{target_name}'")]
    UndeclaredTemplateTarget {
        kind: ResourceKind,
        name: String,
        field_path: String,
        target_kind: ResourceKind,
        target_name: String,
    },

    #[error("network '{name}' has an unparsable cidr '{cidr}'")]
    InvalidCidr { name: String, cidr: String },

    #[error("{0}")]
    Template(#[from] TemplateError),

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}
