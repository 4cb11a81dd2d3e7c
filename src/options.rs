//! Lowering and loader configuration.

use serde::{Deserialize, Serialize};

/// Names the lowered code refers to at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranspileOptions {
    /// Component-construction entry point, as a dotted path.
    pub pragma: String,
    /// Fragment reference passed as the element of `<>...</>`.
    pub pragma_frag: String,
    /// Parameter name of the reference-resolution function.
    pub require_name: String,
    /// Parameter name of the export container.
    pub exports_name: String,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            require_name: "___require".to_string(),
            exports_name: "__export".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderOptions {
    /// Appended (with a dot) to specifiers that carry no extension.
    pub default_extension: String,
    /// Extensions loaded as data documents instead of being lowered.
    pub data_extensions: Vec<String>,
    pub transpile: TranspileOptions,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            default_extension: "js".to_string(),
            data_extensions: vec!["json".to_string()],
            transpile: TranspileOptions::default(),
        }
    }
}

impl LoaderOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_data_extension(&self, extension: &str) -> bool {
        self.data_extensions
            .iter()
            .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}
