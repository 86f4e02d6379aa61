use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use testenv_domain::TemplateContext;

use crate::error::TemplateError;
use crate::reference::{parse_expr, TemplateReference};

/// Visits every `{{ ... }}` span in `s`, passing the trimmed inner text to
/// `visit`. Mirrors the donor reconciler's incremental scan: find `{{`,
/// find the matching `}}`, hand off the slice between them.
fn scan(s: &str, mut visit: impl FnMut(&str)) {
    let mut search_start = 0;
    loop {
        let Some(start) = s[search_start..].find("{{") else { break };
        let abs_start = search_start + start;
        let Some(end) = s[abs_start..].find("}}") else { break };
        let abs_end = abs_start + end + 2;
        let inner = s[abs_start + 2..abs_end - 2].trim();
        visit(inner);
        search_start = abs_end;
    }
}

/// Same scan, but builds a replacement string. `resolve` returns `Ok(None)`
/// for inner text that is not a recognised template expression (left
/// untouched verbatim) and `Err` for a recognised-but-unresolvable one.
fn scan_and_replace(
    s: &str,
    mut resolve: impl FnMut(&str) -> Result<Option<String>, TemplateError>,
) -> Result<String, TemplateError> {
    let mut result = s.to_string();
    let mut search_start = 0;
    loop {
        let Some(start) = result[search_start..].find("{{") else { break };
        let abs_start = search_start + start;
        let Some(end) = result[abs_start..].find("}}") else { break };
        let abs_end = abs_start + end + 2;
        let inner = result[abs_start + 2..abs_end - 2].trim().to_string();

        match resolve(&inner)? {
            Some(val) => {
                result = format!("{}{}{}", &result[..abs_start], val, &result[abs_end..]);
                search_start = abs_start + val.len();
            }
            None => search_start = abs_end,
        }
    }
    Ok(result)
}

fn resolve_reference(reference: &TemplateReference, ctx: &TemplateContext) -> Option<String> {
    match reference {
        TemplateReference::Resource { kind, name, field } => {
            let category = match kind {
                testenv_domain::ResourceKind::Key => "Keys",
                testenv_domain::ResourceKind::Network => "Networks",
                testenv_domain::ResourceKind::Vm => "VMs",
                testenv_domain::ResourceKind::Image => "Images",
            };
            ctx.lookup(category, name, field)
        }
        TemplateReference::Env { var } => ctx.lookup_env(var),
        TemplateReference::DefaultBaseImage => ctx.default_base_image.clone(),
    }
}

fn walk_extract(value: &Value, out: &mut Vec<TemplateReference>) {
    match value {
        Value::String(s) => scan(s, |inner| {
            if let Some(reference) = parse_expr(inner) {
                out.push(reference);
            }
        }),
        Value::Array(items) => items.iter().for_each(|v| walk_extract(v, out)),
        Value::Object(map) => map.values().for_each(|v| walk_extract(v, out)),
        _ => {}
    }
}

fn walk_render(value: &Value, ctx: &TemplateContext) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => {
            let rendered = scan_and_replace(s, |inner| {
                let Some(reference) = parse_expr(inner) else { return Ok(None) };
                match resolve_reference(&reference, ctx) {
                    Some(v) => Ok(Some(v)),
                    None => Err(TemplateError::UnknownReference(format!("{{{{ {inner} }}}}"))),
                }
            })?;
            Ok(Value::String(rendered))
        }
        Value::Array(items) => {
            let rendered: Result<Vec<Value>, TemplateError> = items.iter().map(|v| walk_render(v, ctx)).collect();
            Ok(Value::Array(rendered?))
        }
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                rendered.insert(k.clone(), walk_render(v, ctx)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

/// Returns every template reference found in every string field of
/// `fragment`. The single source of truth consulted by the dependency
/// graph builder.
pub fn extract_template_refs<T: Serialize>(fragment: &T) -> Result<Vec<TemplateReference>, TemplateError> {
    let value = serde_json::to_value(fragment)?;
    let mut out = Vec::new();
    walk_extract(&value, &mut out);
    Ok(out)
}

/// Renders `fragment` against `ctx`, returning a new value. Operates on a
/// deep copy produced by a serialise/deserialise round-trip; the caller's
/// original fragment is never mutated.
pub fn render<T: Serialize + DeserializeOwned>(fragment: &T, ctx: &TemplateContext) -> Result<T, TemplateError> {
    let value = serde_json::to_value(fragment)?;
    let rendered = walk_render(&value, ctx)?;
    Ok(serde_json::from_value(rendered)?)
}
