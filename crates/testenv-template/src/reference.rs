use testenv_domain::ResourceKind;

/// A single parsed `{{ .Category.Name.Field }}` (or `.Env.VAR`, or
/// `.DefaultBaseImage`) expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateReference {
    Resource { kind: ResourceKind, name: String, field: String },
    Env { var: String },
    DefaultBaseImage,
}

impl TemplateReference {
    /// Resource kind this reference targets, for the DAG builder's edge
    /// installation. `None` for `Env`/`DefaultBaseImage`, which never
    /// contribute a dependency edge.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            TemplateReference::Resource { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn resource_name(&self) -> Option<&str> {
        match self {
            TemplateReference::Resource { name, .. } => Some(name),
            _ => None,
        }
    }
}

fn category_to_kind(category: &str) -> Option<ResourceKind> {
    match category {
        "Keys" => Some(ResourceKind::Key),
        "Networks" => Some(ResourceKind::Network),
        "VMs" => Some(ResourceKind::Vm),
        "Images" => Some(ResourceKind::Image),
        _ => None,
    }
}

/// Parse the trimmed contents of one `{{ ... }}` expression (without the
/// braces). Returns `None` if it does not match the dotted-path grammar —
/// callers treat that as "not a template", leaving the text untouched.
pub fn parse_expr(inner: &str) -> Option<TemplateReference> {
    let inner = inner.trim();
    let rest = inner.strip_prefix('.')?;
    if rest == "DefaultBaseImage" {
        return Some(TemplateReference::DefaultBaseImage);
    }
    let mut parts = rest.splitn(3, '.');
    let category = parts.next()?;
    match category {
        "Env" => {
            let var = parts.next()?;
            if parts.next().is_some() {
                return None;
            }
            Some(TemplateReference::Env { var: var.to_string() })
        }
        _ => {
            let kind = category_to_kind(category)?;
            let name = parts.next()?;
            let field = parts.next()?;
            Some(TemplateReference::Resource { kind, name: name.to_string(), field: field.to_string() })
        }
    }
}
