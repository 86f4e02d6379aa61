use testenv_domain::ResourceRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("spec error: {0}")]
    Spec(#[from] testenv_spec::SpecError),

    #[error("graph error: {0}")]
    Graph(#[from] testenv_graph::GraphError),

    #[error("store error: {0}")]
    Store(#[from] testenv_store::StoreError),

    #[error("provider error: {0}")]
    Provider(#[from] testenv_provider::ProviderError),

    #[error("template error: {0}")]
    Template(#[from] testenv_template::TemplateError),

    #[error("no environment found with id '{0}'")]
    NotFound(String),

    #[error("no provider resolved for resource '{0}'")]
    NoProvider(ResourceRef),

    #[error("resource '{0}' is not declared in the spec")]
    MissingSubSpec(ResourceRef),

    #[error("operation on '{reference}' cancelled")]
    Cancelled { reference: ResourceRef },

    #[error("create failed: {0} resource(s) in error, see environment record for detail")]
    CreateFailed(usize),

    #[error("delete completed with {0} error(s), see environment record for detail")]
    DeleteIncomplete(usize),
}
