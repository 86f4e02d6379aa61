use testenv_domain::ResourceRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("resource '{from}' references undeclared resource '{to}'")]
    UndeclaredResource { from: ResourceRef, to: ResourceRef },

    #[error("dependency cycle detected, back-edge into '{0}'")]
    CycleDetected(ResourceRef),
}
