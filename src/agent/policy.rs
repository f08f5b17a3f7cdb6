use std::collections::HashSet;

use serde::Deserialize;

use super::tools::ToolKind;
use crate::core::config::settings::ToolsSection;

/// Which tools an agent run may bind. User-supplied script tools additionally need
/// `tools.allow_user_tools`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub allow_user_tools: bool,
    #[serde(default)]
    pub allowed_tools: HashSet<String>,
    #[serde(default)]
    pub denied_tools: HashSet<String>,
}

impl ToolPolicy {
    pub fn from_settings(tools: &ToolsSection) -> Self {
        Self {
            allow_user_tools: tools.allow_user_tools,
            ..Self::default()
        }
    }

    pub fn with_allowed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty() && name != "*")
            .collect();
        self
    }

    pub fn is_tool_allowed(&self, tool_name: &str, kind: ToolKind) -> bool {
        if self.denied_tools.contains(tool_name) {
            return false;
        }
        if kind == ToolKind::UserScript && !self.allow_user_tools {
            return false;
        }
        self.allowed_tools.is_empty() || self.allowed_tools.contains(tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_tools_need_the_flag() {
        let locked = ToolPolicy::default();
        assert!(locked.is_tool_allowed("vector_search_tool_x", ToolKind::BuiltIn));
        assert!(!locked.is_tool_allowed("fetch", ToolKind::UserScript));

        let open = ToolPolicy::from_settings(&ToolsSection {
            allow_user_tools: true,
            execution_timeout_secs: 5,
        });
        assert!(open.is_tool_allowed("fetch", ToolKind::UserScript));
    }

    #[test]
    fn deny_wins_over_allow() {
        let mut policy = ToolPolicy::default().with_allowed(["a", "b", "*"]);
        policy.denied_tools.insert("b".into());
        assert!(policy.is_tool_allowed("a", ToolKind::BuiltIn));
        assert!(!policy.is_tool_allowed("b", ToolKind::BuiltIn));
        assert!(!policy.is_tool_allowed("c", ToolKind::BuiltIn));
    }
}
