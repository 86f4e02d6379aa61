use testenv_domain::TestEnvSpec;
use tracing::debug;

use crate::error::SpecError;

/// Converts the caller's untyped spec map into the typed [`TestEnvSpec`].
///
/// Unknown keys are silently ignored (every typed struct carries serde's
/// default behaviour for unrecognised object fields). A field present with
/// the wrong shape produces a [`SpecError::Parse`] naming the offending key
/// path. Since the input is an in-memory `Value` rather than text,
/// `serde_json::Error`'s own `line`/`column` are always 0; `serde_path_to_error`
/// walks the deserializer's path stack instead, so the error names the
/// actual key (e.g. `vms[0].memoryMb`).
pub fn parse(raw: &serde_json::Value) -> Result<TestEnvSpec, SpecError> {
    debug!("parsing test environment spec");
    serde_path_to_error::deserialize::<_, TestEnvSpec>(raw.clone())
        .map_err(|e| SpecError::Parse { path: e.path().to_string(), message: e.into_inner().to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_spec() {
        let raw = serde_json::json!({
            "providers": [{"name": "local", "command": "testenv-local-provider", "default": true}],
            "keys": [{"name": "vm-ssh", "keyType": "ed25519"}],
        });
        let spec = parse(&raw).unwrap();
        assert_eq!(spec.providers.len(), 1);
        assert_eq!(spec.keys.len(), 1);
    }

    #[test]
    fn ignores_unknown_top_level_keys() {
        let raw = serde_json::json!({
            "providers": [{"name": "local", "command": "p", "default": true}],
            "somethingNclavNeverHeardOf": 42,
        });
        assert!(parse(&raw).is_ok());
    }

    #[test]
    fn wrong_shape_is_a_structured_parse_error() {
        let raw = serde_json::json!({
            "providers": "this-should-be-an-array",
        });
        let err = parse(&raw).unwrap_err();
        match err {
            SpecError::Parse { path, .. } => assert_eq!(path, "providers"),
            other => panic!("expected SpecError::Parse, got {other:?}"),
        }
    }
}
