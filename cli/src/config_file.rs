use anyhow::Context;
use anyhow::Result;
use monitor_coordinator::MonitorConfig;
use monitor_protocol::GroupDescriptor;
use monitor_protocol::UserId;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Desk view definition loaded from TOML.
///
/// ```toml
/// [monitor]
/// debounce_ms = 1000
///
/// [user]
/// identity = "editor-1"
///
/// [[groups]]
/// id = "s1"
/// kind = "stage"
/// stage = "s1"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeskConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    pub user: UserSection,
    #[serde(default)]
    pub groups: Vec<GroupDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSection {
    pub identity: UserId,
}

impl DeskConfig {
    /// Reads `path`, applies `DESK_MONITOR_*` environment overrides and
    /// validates the result.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::parse(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.monitor = config.monitor.with_env_overrides();
        config
            .monitor
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid [monitor] settings after environment overrides")?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: DeskConfig = toml::from_str(raw)?;
        if config.user.identity.is_blank() {
            anyhow::bail!("[user] identity must not be empty");
        }
        config.monitor.validate().map_err(anyhow::Error::msg)?;

        let mut seen = HashSet::new();
        for group in &config.groups {
            if !seen.insert(group.id()) {
                anyhow::bail!("group {} is defined more than once", group.id());
            }
        }
        Ok(config)
    }

    pub fn group(&self, id: &str) -> Option<&GroupDescriptor> {
        self.groups.iter().find(|group| group.id().as_str() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_protocol::GroupKind;
    use monitor_protocol::Repository;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_groups_of_several_kinds() {
        let config = DeskConfig::parse(
            r#"
            [monitor]
            debounce_ms = 250

            [user]
            identity = "editor-1"

            [[groups]]
            id = "s1"
            kind = "stage"
            stage = "s1"
            query = "flood"

            [[groups]]
            id = "news:output"
            kind = "desk_output"
            desk = "news"
            desk_type = "production"

            [[groups]]
            id = "wires"
            kind = "saved_search"
            window_size = 50

            [groups.search]
            query = "weather"
            repos = ["ingest"]
            "#,
        )
        .expect("config parses");

        assert_eq!(config.monitor.debounce_ms, 250);
        assert_eq!(config.groups.len(), 3);
        assert_eq!(config.group("s1").and_then(GroupDescriptor::query), Some("flood"));
        let wires = config.group("wires").expect("wires group");
        assert_eq!(wires.window_size(), Some(50));
        match wires.kind() {
            GroupKind::SavedSearch { search } => {
                assert!(search.targets(Repository::Ingest));
                assert!(!search.targets(Repository::Archive));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_group_ids() {
        let err = DeskConfig::parse(
            r#"
            [user]
            identity = "editor-1"

            [[groups]]
            id = "s1"
            kind = "stage"
            stage = "s1"

            [[groups]]
            id = "s1"
            kind = "personal"
            "#,
        )
        .expect_err("duplicate ids");
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn rejects_invalid_monitor_settings() {
        let err = DeskConfig::parse(
            r#"
            [monitor]
            page_size = 0

            [user]
            identity = "editor-1"
            "#,
        )
        .expect_err("zero page size");
        assert!(err.to_string().contains("page_size"), "{err}");
    }
}
