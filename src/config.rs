//! Form configuration and declarative form definitions

use crate::error::{FormError, Result};
use crate::fields::{FieldConfig, FieldGroup};
use crate::layout::{ButtonMode, LayoutConfig, Span};
use crate::validation::{EngineConfig, RuleSpec, ValidationRule};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Collapsible form behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpandConfig {
    /// Rows visible while collapsed; 0 disables collapsing
    pub preview_rows: usize,
    pub default_expanded: bool,
    pub expand_text: String,
    pub collapse_text: String,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            preview_rows: 1,
            default_expanded: false,
            expand_text: "Expand".to_string(),
            collapse_text: "Collapse".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAlign {
    Left,
    Center,
    #[default]
    Right,
}

/// Action button row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonConfig {
    pub position: ButtonMode,
    pub align: ButtonAlign,
    /// Columns taken by the buttons in inline mode
    pub span: usize,
    pub show: bool,
    pub show_reset: bool,
    pub submit_text: String,
    pub reset_text: String,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            position: ButtonMode::default(),
            align: ButtonAlign::default(),
            span: 1,
            show: true,
            show_reset: true,
            submit_text: "Submit".to_string(),
            reset_text: "Reset".to_string(),
        }
    }
}

/// Form-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormConfig {
    pub initial_values: Value,
    pub layout: LayoutConfig,
    pub expand: ExpandConfig,
    pub button: ButtonConfig,
    pub validate_on_change: bool,
    pub validate_on_blur: bool,
    pub validate_on_submit: bool,
    /// Disable every field regardless of its own condition
    pub disabled: bool,
    pub readonly: bool,
    pub validation: EngineConfig,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            initial_values: Value::Object(Default::default()),
            layout: LayoutConfig::default(),
            expand: ExpandConfig::default(),
            button: ButtonConfig::default(),
            validate_on_change: true,
            validate_on_blur: true,
            validate_on_submit: true,
            disabled: false,
            readonly: false,
            validation: EngineConfig::default(),
        }
    }
}

impl FormConfig {
    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "gridform", "gridform")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load the user's defaults, falling back to built-in ones
    pub fn load() -> anyhow::Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Ok(Self::load_from(&path)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Serializable field description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub span: Span,
    pub rules: Vec<RuleSpec>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub disabled: bool,
    pub readonly: bool,
    pub visible: bool,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            label: None,
            span: Span::default(),
            rules: Vec::new(),
            required: false,
            default_value: None,
            disabled: false,
            readonly: false,
            visible: true,
            dependencies: Vec::new(),
            placeholder: None,
            tooltip: None,
        }
    }
}

impl TryFrom<FieldSpec> for FieldConfig {
    type Error = FormError;

    fn try_from(spec: FieldSpec) -> Result<Self> {
        if spec.name.is_empty() {
            return Err(FormError::InvalidRule("field without a name".to_string()));
        }
        let mut rules = spec
            .rules
            .into_iter()
            .map(ValidationRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        if spec.required && !rules.iter().any(ValidationRule::is_required) {
            rules.insert(0, ValidationRule::required());
        }

        Ok(FieldConfig {
            name: spec.name,
            label: spec.label,
            span: spec.span,
            rules,
            required: spec.required,
            default_value: spec.default_value,
            disabled: spec.disabled.into(),
            readonly: spec.readonly.into(),
            visible: spec.visible.into(),
            dependencies: spec.dependencies,
            placeholder: spec.placeholder,
            tooltip: spec.tooltip,
        })
    }
}

/// Serializable field group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<String>,
    pub collapsible: bool,
    pub default_collapsed: bool,
}

impl From<GroupSpec> for FieldGroup {
    fn from(spec: GroupSpec) -> Self {
        FieldGroup {
            name: spec.name,
            title: spec.title,
            description: spec.description,
            fields: spec.fields,
            collapsible: spec.collapsible,
            default_collapsed: spec.collapsible && spec.default_collapsed,
            visible: true.into(),
        }
    }
}

/// A whole form as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormDefinition {
    pub config: FormConfig,
    pub fields: Vec<FieldSpec>,
    pub groups: Vec<GroupSpec>,
}

impl FormDefinition {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Convert every field spec, failing on the first bad rule
    pub fn field_configs(&self) -> Result<Vec<FieldConfig>> {
        self.fields.iter().cloned().map(FieldConfig::try_from).collect()
    }

    pub fn field_groups(&self) -> Vec<FieldGroup> {
        self.groups.iter().cloned().map(FieldGroup::from).collect()
    }
}
