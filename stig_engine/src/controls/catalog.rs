//! The control catalog and its TOML form
//!
//! ```toml
//! [[control]]
//! id = "V-238298"
//! description = "Enable the audit daemon"
//! category = "cat2"
//! kind = "command"
//! audit = ["systemctl", "is-enabled", "auditd"]
//! commands = [["systemctl", "enable", "--now", "auditd"]]
//!
//! [[control]]
//! id = "V-238214"
//! description = "Login banner"
//! category = "cat2"
//! kind = "file"
//! path = "/etc/issue.net"
//! mode = "0644"
//! content = "..."
//!
//! [[control]]
//! id = "kernel-parameters"
//! description = "Kernel parameter hardening"
//! category = "cat2"
//! kind = "parameters"
//! ```

use super::{Category, CommandControl, Control, FileControl, ParameterGroupControl};
use crate::files::FileAttributes;
use crate::parameters::{ubuntu_kernel_catalog, ParameterSpec, GROUPS};
use crate::transport::{ArtifactClass, CommandLine};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use stig_runtime::logging::codes::system;
use stig_runtime::Code;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Cannot read control catalog {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid control catalog: {reason}")]
    Parse { reason: String },

    #[error("Duplicate control id: {id}")]
    DuplicateId { id: String },

    #[error("Control {id}: {reason}")]
    InvalidControl { id: String, reason: String },
}

impl CatalogError {
    pub fn code(&self) -> Code {
        system::CONFIGURATION_INVALID
    }

    fn invalid(id: &str, reason: impl Into<String>) -> Self {
        CatalogError::InvalidControl {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// TOML DEFINITIONS
// ============================================================================

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "control")]
    controls: Vec<ControlDefinition>,
}

#[derive(Debug, Deserialize)]
struct ControlDefinition {
    id: String,
    description: String,
    category: Category,
    #[serde(default)]
    high_risk: bool,
    #[serde(flatten)]
    body: ControlBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ControlBody {
    Command {
        #[serde(default)]
        audit: Option<Vec<String>>,
        commands: Vec<Vec<String>>,
        #[serde(default)]
        class: Option<ArtifactClass>,
    },
    File {
        path: PathBuf,
        content: String,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default = "default_true")]
        backup: bool,
    },
    Parameters {
        #[serde(default)]
        group: Option<String>,
        /// Replaces the built-in kernel catalog when present
        #[serde(default)]
        parameters: Vec<ParameterEntry>,
    },
}

#[derive(Debug, Deserialize)]
struct ParameterEntry {
    name: String,
    value: String,
    #[serde(default)]
    reboot_required: bool,
}

fn default_true() -> bool {
    true
}

fn command_line(id: &str, words: &[String]) -> Result<CommandLine, CatalogError> {
    let (program, args) = words
        .split_first()
        .ok_or_else(|| CatalogError::invalid(id, "empty command"))?;
    Ok(CommandLine::new(program.as_str()).args(args.iter().cloned()))
}

fn parse_mode(id: &str, mode: &str) -> Result<u32, CatalogError> {
    u32::from_str_radix(mode.trim_start_matches("0o"), 8)
        .ok()
        .filter(|m| *m <= 0o7777)
        .ok_or_else(|| CatalogError::invalid(id, format!("invalid mode '{}'", mode)))
}

impl ControlDefinition {
    fn build(self) -> Result<Box<dyn Control>, CatalogError> {
        let id = self.id.as_str();
        let control: Box<dyn Control> = match self.body {
            ControlBody::Command { audit, commands, class } => {
                if commands.is_empty() {
                    return Err(CatalogError::invalid(id, "no commands"));
                }
                let mut control = CommandControl::new(id, &self.description, self.category);
                if let Some(audit) = audit {
                    control = control.with_audit(command_line(id, &audit)?);
                }
                for words in &commands {
                    control = control.with_command(command_line(id, words)?);
                }
                if let Some(class) = class {
                    control = control.with_class(class);
                }
                if self.high_risk {
                    control = control.high_risk();
                }
                Box::new(control)
            }
            ControlBody::File { path, content, mode, owner, group, backup } => {
                let mut attributes = FileAttributes::default();
                if let Some(mode) = mode {
                    attributes.mode = parse_mode(id, &mode)?;
                }
                if owner.is_some() {
                    attributes.owner = owner;
                }
                if group.is_some() {
                    attributes.group = group;
                }
                let mut control = FileControl::new(id, &self.description, self.category, path, &content)
                    .with_attributes(attributes);
                if !backup {
                    control = control.without_backup();
                }
                if self.high_risk {
                    control = control.high_risk();
                }
                Box::new(control)
            }
            ControlBody::Parameters { group, parameters } => {
                let specs = if parameters.is_empty() {
                    ubuntu_kernel_catalog()
                } else {
                    parameters
                        .iter()
                        .map(|p| {
                            let spec = ParameterSpec::new(&p.name, &p.value);
                            if p.reboot_required {
                                spec.requires_reboot()
                            } else {
                                spec
                            }
                        })
                        .collect()
                };
                let mut control = ParameterGroupControl::new(id, &self.description, self.category, specs);
                if let Some(group) = group {
                    if !GROUPS.contains(&group.as_str()) {
                        return Err(CatalogError::invalid(id, format!("unknown parameter group '{}'", group)));
                    }
                    control = control.for_group(&group);
                }
                if self.high_risk {
                    control = control.high_risk();
                }
                Box::new(control)
            }
        };
        Ok(control)
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// Ordered set of controls with unique ids
#[derive(Default)]
pub struct ControlCatalog {
    controls: Vec<Box<dyn Control>>,
}

impl fmt::Debug for ControlCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlCatalog").field("controls", &self.ids()).finish()
    }
}

impl ControlCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel parameter hardening only; everything else comes from a catalog file
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.controls.push(Box::new(ParameterGroupControl::new(
            "kernel-parameters",
            "Kernel parameter hardening",
            Category::CatII,
            ubuntu_kernel_catalog(),
        )));
        catalog
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text).map_err(|e| CatalogError::Parse {
            reason: e.to_string(),
        })?;

        let mut catalog = Self::new();
        for definition in file.controls {
            catalog.add(definition.build()?)?;
        }
        Ok(catalog)
    }

    pub fn add(&mut self, control: Box<dyn Control>) -> Result<(), CatalogError> {
        if self.controls.iter().any(|c| c.id() == control.id()) {
            return Err(CatalogError::DuplicateId {
                id: control.id().to_string(),
            });
        }
        self.controls.push(control);
        Ok(())
    }

    pub fn with_control(mut self, control: impl Control + 'static) -> Result<Self, CatalogError> {
        self.add(Box::new(control))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.controls.iter().map(|c| c.id()).collect()
    }

    /// Controls of one category in catalog order
    pub fn in_category(&self, category: Category) -> Vec<&dyn Control> {
        self.controls
            .iter()
            .filter(|c| c.category() == category)
            .map(|c| c.as_ref())
            .collect()
    }

    pub fn categories(&self) -> Vec<Category> {
        let set: HashSet<Category> = self.controls.iter().map(|c| c.category()).collect();
        let mut categories: Vec<Category> = set.into_iter().collect();
        categories.sort();
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[control]]
id = "V-238298"
description = "Enable the audit daemon"
category = "cat2"
kind = "command"
audit = ["systemctl", "is-enabled", "auditd"]
commands = [["systemctl", "enable", "auditd"], ["systemctl", "start", "auditd"]]

[[control]]
id = "V-238214"
description = "Login banner"
category = "cat3"
kind = "file"
path = "/etc/issue.net"
mode = "0640"
content = "Authorized use only.\n"

[[control]]
id = "V-238218"
description = "Disable SSH root login"
category = "cat1"
high_risk = true
kind = "command"
commands = [["sed", "-i", "s/^PermitRootLogin.*/PermitRootLogin no/", "/etc/ssh/sshd_config"]]
class = "generic"

[[control]]
id = "ipv4"
description = "IPv4 hardening"
category = "cat2"
kind = "parameters"
group = "ipv4_network_security"
"#;

    #[test]
    fn test_load_sample() {
        let catalog = ControlCatalog::from_toml_str(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.categories(), Category::all().to_vec());

        let cat1 = catalog.in_category(Category::CatI);
        assert_eq!(cat1.len(), 1);
        assert!(cat1[0].high_risk());

        let cat2: Vec<&str> = catalog.in_category(Category::CatII).iter().map(|c| c.id()).collect();
        assert_eq!(cat2, vec!["V-238298", "ipv4"]);
    }

    #[test]
    fn test_rejects_bad_definitions() {
        let duplicate = format!("{}{}", SAMPLE, &SAMPLE[..SAMPLE.find("[[control]]\nid = \"V-238214\"").unwrap()]);
        assert_matches::assert_matches!(
            ControlCatalog::from_toml_str(&duplicate),
            Err(CatalogError::DuplicateId { .. })
        );

        let bad_mode = r#"
[[control]]
id = "f"
description = "d"
category = "cat3"
kind = "file"
path = "/tmp/x"
mode = "999"
content = ""
"#;
        assert_matches::assert_matches!(
            ControlCatalog::from_toml_str(bad_mode),
            Err(CatalogError::InvalidControl { .. })
        );

        let bad_group = r#"
[[control]]
id = "p"
description = "d"
category = "cat2"
kind = "parameters"
group = "everything"
"#;
        assert_matches::assert_matches!(
            ControlCatalog::from_toml_str(bad_group),
            Err(CatalogError::InvalidControl { .. })
        );

        assert_matches::assert_matches!(
            ControlCatalog::from_toml_str("[[control]]\nid = 1"),
            Err(CatalogError::Parse { .. })
        );
    }

    #[test]
    fn test_builtin() {
        let catalog = ControlCatalog::builtin();
        assert_eq!(catalog.ids(), vec!["kernel-parameters"]);
        assert_eq!(format!("{:?}", catalog), r#"ControlCatalog { controls: ["kernel-parameters"] }"#);
    }
}
