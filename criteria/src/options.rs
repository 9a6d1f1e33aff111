use monitor_protocol::Repository;
use monitor_protocol::SortOption;
use serde::Deserialize;
use serde::Serialize;

/// Deployment switches consulted by the criteria compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Scheduled output is shown as its own group, so desk output drops the
    /// `scheduled` state.
    #[serde(default)]
    pub scheduled_output_separate: bool,

    /// Desk output hides superseded published versions and rewritten items.
    #[serde(default)]
    pub hide_previous_versions_in_output: bool,

    /// Backend supports result highlighting.
    #[serde(default = "default_true")]
    pub elastic_highlight: bool,

    /// Repositories searched by saved searches that store none.
    #[serde(default = "default_repos")]
    pub default_repos: Vec<Repository>,

    #[serde(default)]
    pub default_sort: SortOption,
}

fn default_true() -> bool {
    true
}

fn default_repos() -> Vec<Repository> {
    vec![
        Repository::Ingest,
        Repository::Archive,
        Repository::Published,
        Repository::Archived,
    ]
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            scheduled_output_separate: false,
            hide_previous_versions_in_output: false,
            elastic_highlight: default_true(),
            default_repos: default_repos(),
            default_sort: SortOption::default(),
        }
    }
}

impl CompilerOptions {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_repos.is_empty() {
            return Err("default_repos must name at least one repository".to_string());
        }

        if self.default_sort.field.trim().is_empty() {
            return Err("default_sort.field must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(CompilerOptions::default().validate(), Ok(()));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let options: CompilerOptions =
            serde_json::from_str(r#"{"scheduled_output_separate": true}"#).expect("parse");
        assert!(options.scheduled_output_separate);
        assert!(options.elastic_highlight);
        assert_eq!(options.default_repos.len(), 4);
    }

    #[test]
    fn empty_repository_list_is_rejected() {
        let options = CompilerOptions {
            default_repos: Vec::new(),
            ..CompilerOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
