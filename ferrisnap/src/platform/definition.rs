//! Dialect definition: the command templates one firmware family understands.

use serde::Deserialize;

use crate::artifact::ArtifactKind;
use crate::error::ConfigError;

/// Placeholder replaced with the artifact base name (no suffix).
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Placeholder replaced with the remote file name (base name plus suffix).
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Command templates for one device firmware dialect.
///
/// Templates are plain strings; `{name}` and `{file}` are substituted
/// verbatim before the command is sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dialect {
    /// Dialect name (e.g., "routeros").
    #[serde(default)]
    pub name: String,

    /// Command that saves a binary snapshot named `{name}`.
    pub binary_save: String,

    /// Command that exports the plaintext configuration to `{name}`.
    pub export: String,

    /// Command that deletes `{file}` from the device filesystem.
    pub remove: String,

    /// Strings on stdout that indicate command failure.
    #[serde(default)]
    pub failed_when_contains: Vec<String>,
}

impl Dialect {
    /// Create a dialect from its three command templates.
    pub fn new(
        name: impl Into<String>,
        binary_save: impl Into<String>,
        export: impl Into<String>,
        remove: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            binary_save: binary_save.into(),
            export: export.into(),
            remove: remove.into(),
            failed_when_contains: vec![],
        }
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Render the command that materializes an artifact of `kind`.
    pub fn trigger_command(&self, kind: ArtifactKind, name: &str, file: &str) -> String {
        let template = match kind {
            ArtifactKind::Binary => &self.binary_save,
            ArtifactKind::Plaintext => &self.export,
        };
        render(template, name, file)
    }

    /// Render the command that removes `file` from the device.
    pub fn remove_command(&self, name: &str, file: &str) -> String {
        render(&self.remove, name, file)
    }

    /// Check that every template refers to the artifact it acts on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let templates = [
            ("binary_save", &self.binary_save),
            ("export", &self.export),
            ("remove", &self.remove),
        ];

        for (field, template) in templates {
            if !template.contains(NAME_PLACEHOLDER) && !template.contains(FILE_PLACEHOLDER) {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "dialect '{}': {} template must contain {} or {}",
                        self.name, field, NAME_PLACEHOLDER, FILE_PLACEHOLDER
                    ),
                });
            }
        }
        Ok(())
    }
}

fn render(template: &str, name: &str, file: &str) -> String {
    template
        .replace(FILE_PLACEHOLDER, file)
        .replace(NAME_PLACEHOLDER, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> Dialect {
        Dialect::new("test", "save {name}", "export {name}", "rm {file}")
    }

    #[test]
    fn test_trigger_command_per_kind() {
        let dialect = dialect();
        assert_eq!(
            dialect.trigger_command(ArtifactKind::Binary, "r1_backup", "r1_backup.backup"),
            "save r1_backup"
        );
        assert_eq!(
            dialect.trigger_command(ArtifactKind::Plaintext, "r1_config", "r1_config.rsc"),
            "export r1_config"
        );
    }

    #[test]
    fn test_remove_command_uses_file() {
        assert_eq!(
            dialect().remove_command("r1_config", "r1_config.rsc"),
            "rm r1_config.rsc"
        );
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let dialect = Dialect::new("bad", "save now", "export {name}", "rm {file}");
        assert!(matches!(
            dialect.validate(),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(self::dialect().validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let dialect: Dialect = serde_json::from_str(
            r#"{"binary_save": "b {name}", "export": "e {name}", "remove": "r {file}"}"#,
        )
        .unwrap();
        assert!(dialect.name.is_empty());
        assert!(dialect.failed_when_contains.is_empty());
    }
}
