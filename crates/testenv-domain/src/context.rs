use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result fields a created key exposes to other resources' templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyContextEntry {
    pub public_key: Option<String>,
    pub private_key_path: Option<String>,
}

/// Result fields a created network exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContextEntry {
    pub interface_name: Option<String>,
    pub cidr: Option<String>,
    pub uuid: Option<String>,
}

/// Result fields a created VM exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmContextEntry {
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub ssh_command: Option<String>,
    pub uuid: Option<String>,
}

/// Result fields a resolved image exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContextEntry {
    pub local_path: Option<String>,
}

/// The accumulated, in-memory mapping from (category, name, field) to a
/// concrete value, consulted by the Renderer. Never persisted — rebuilt
/// from the Environment Record's resource-state map when needed (e.g. at
/// delete time).
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub keys: HashMap<String, KeyContextEntry>,
    pub networks: HashMap<String, NetworkContextEntry>,
    pub vms: HashMap<String, VmContextEntry>,
    pub images: HashMap<String, ImageContextEntry>,
    pub env: HashMap<String, String>,
    pub default_base_image: Option<String>,
}

impl TemplateContext {
    pub fn new(env: HashMap<String, String>, default_base_image: Option<String>) -> Self {
        TemplateContext {
            keys: HashMap::new(),
            networks: HashMap::new(),
            vms: HashMap::new(),
            images: HashMap::new(),
            env,
            default_base_image,
        }
    }

    /// Look up a single dotted-path field value. `category` is one of
    /// `Keys`, `Networks`, `VMs`, `Images`, `Env`, or the bare name
    /// `DefaultBaseImage`.
    pub fn lookup(&self, category: &str, name: &str, field: &str) -> Option<String> {
        match category {
            "Keys" => {
                let entry = self.keys.get(name)?;
                match field {
                    "PublicKey" => entry.public_key.clone(),
                    "PrivateKeyPath" => entry.private_key_path.clone(),
                    _ => None,
                }
            }
            "Networks" => {
                let entry = self.networks.get(name)?;
                match field {
                    "InterfaceName" => entry.interface_name.clone(),
                    "CIDR" => entry.cidr.clone(),
                    "UUID" => entry.uuid.clone(),
                    _ => None,
                }
            }
            "VMs" => {
                let entry = self.vms.get(name)?;
                match field {
                    "IP" => entry.ip.clone(),
                    "MAC" => entry.mac.clone(),
                    "SSHCommand" => entry.ssh_command.clone(),
                    "UUID" => entry.uuid.clone(),
                    _ => None,
                }
            }
            "Images" => {
                let entry = self.images.get(name)?;
                match field {
                    "LocalPath" => entry.local_path.clone(),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Look up `.Env.VAR`.
    pub fn lookup_env(&self, var: &str) -> Option<String> {
        self.env.get(var).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_known_field() {
        let mut ctx = TemplateContext::new(HashMap::new(), None);
        ctx.keys.insert(
            "vm-ssh".into(),
            KeyContextEntry { public_key: Some("ssh-ed25519 AAAA".into()), private_key_path: None },
        );
        assert_eq!(
            ctx.lookup("Keys", "vm-ssh", "PublicKey").as_deref(),
            Some("ssh-ed25519 AAAA")
        );
    }

    #[test]
    fn lookup_unknown_name_is_none() {
        let ctx = TemplateContext::new(HashMap::new(), None);
        assert_eq!(ctx.lookup("Keys", "missing", "PublicKey"), None);
    }
}
