//! Tool catalog: category-tagged factories and the enabled-set builder.
//!
//! The catalog holds `{category, factory}` entries in insertion order.
//! [`ToolCatalog::build`] constructs the enabled subset for a context:
//! toggleable categories are skipped when disabled, everything else always
//! loads. Registration happens through explicit [`register_all`] calls at
//! startup, so enumeration is deterministic and testable.

use std::collections::HashMap;
use std::sync::Arc;

use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::definition::{validate_tool_name, Tool};

/// Factory producing one category's tools.
pub type ToolFactory = Box<dyn Fn() -> Vec<Box<dyn Tool>> + Send + Sync>;

/// Insertion-ordered catalog of category factories.
#[derive(Default)]
pub struct ToolCatalog {
    entries: Vec<(ToolCategory, ToolFactory)>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a category factory. Insertion order is preserved all the way
    /// into the advertised capability list.
    pub fn register<F>(&mut self, category: ToolCategory, factory: F)
    where
        F: Fn() -> Vec<Box<dyn Tool>> + Send + Sync + 'static,
    {
        self.entries.push((category, Box::new(factory)));
    }

    /// Build the enabled tool set for a context.
    ///
    /// Duplicate tool names within a build are a programming error and
    /// fail the build rather than silently shadowing.
    pub fn build(&self, ctx: &ToolContext) -> Result<ToolSet, SmithError> {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (category, factory) in &self.entries {
            if !ctx.category_enabled(*category) {
                tracing::debug!(category = category.as_str(), "category disabled, skipping");
                continue;
            }
            for tool in factory() {
                let name = tool.name().to_string();
                validate_tool_name(&name)?;
                if tools.contains_key(&name) {
                    return Err(SmithError::Internal(format!(
                        "duplicate tool name in catalog: {name}"
                    )));
                }
                order.push(name.clone());
                tools.insert(name, Arc::from(tool));
            }
        }

        Ok(ToolSet { tools, order })
    }
}

/// The enabled subset of tools for one agent configuration.
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("order", &self.order).finish()
    }
}

impl ToolSet {
    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in catalog insertion order; this is what `register`
    /// advertises as capabilities.
    pub fn capabilities(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Populate the catalog with every builtin category, in the order they are
/// advertised. Browser tools are registered separately by the runtime,
/// which owns the shared browser host.
pub fn register_all() -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    catalog.register(ToolCategory::Filesystem, crate::fs::tools);
    catalog.register(ToolCategory::Shell, crate::shell::tools);
    catalog.register(ToolCategory::Git, crate::git::tools);
    catalog.register(ToolCategory::Network, crate::network::tools);
    catalog.register(ToolCategory::Processes, crate::processes::tools);
    catalog.register(ToolCategory::Packages, crate::packages::tools);
    catalog.register(ToolCategory::System, crate::system::tools);
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgSpec;
    use std::path::PathBuf;

    struct NamedTool {
        name: String,
        category: ToolCategory,
    }

    #[async_trait::async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn category(&self) -> ToolCategory {
            self.category
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn arg_specs(&self) -> &'static [ArgSpec] {
            &[]
        }
        async fn execute(
            &self,
            _args: &serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, SmithError> {
            Ok(serde_json::json!({"tool": self.name}))
        }
    }

    fn make(name: &str, category: ToolCategory) -> Box<dyn Tool> {
        Box::new(NamedTool {
            name: name.to_string(),
            category,
        })
    }

    fn ctx_with(git: bool, network: bool) -> ToolContext {
        let mut config =
            smith_types::AgentConfig::default_for("cat", PathBuf::from("/tmp/sandbox"));
        config.enable_git = git;
        config.enable_network = network;
        ToolContext::from_config(&config)
    }

    #[test]
    fn build_preserves_insertion_order() {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolCategory::Filesystem, || {
            vec![
                make("zeta", ToolCategory::Filesystem),
                make("alpha", ToolCategory::Filesystem),
            ]
        });
        catalog.register(ToolCategory::System, || {
            vec![make("midway", ToolCategory::System)]
        });

        let set = catalog.build(&ctx_with(true, true)).unwrap();
        assert_eq!(set.capabilities(), vec!["zeta", "alpha", "midway"]);
    }

    #[test]
    fn disabled_categories_are_skipped() {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolCategory::Git, || {
            vec![make("git_status", ToolCategory::Git)]
        });
        catalog.register(ToolCategory::Network, || {
            vec![make("ping", ToolCategory::Network)]
        });
        catalog.register(ToolCategory::Processes, || {
            vec![make("process_list", ToolCategory::Processes)]
        });

        let set = catalog.build(&ctx_with(false, true)).unwrap();
        assert!(set.get("git_status").is_none());
        assert!(set.get("ping").is_some());
        // Non-toggleable categories always load.
        assert!(set.get("process_list").is_some());
    }

    #[test]
    fn duplicate_names_fail_the_build() {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolCategory::System, || {
            vec![
                make("twin", ToolCategory::System),
                make("twin", ToolCategory::System),
            ]
        });
        let err = catalog.build(&ctx_with(true, true)).unwrap_err();
        assert!(err.to_string().contains("duplicate tool name"));
    }

    #[test]
    fn register_all_builds_cleanly_with_unique_names() {
        let catalog = register_all();
        let set = catalog.build(&ctx_with(true, true)).unwrap();
        assert!(set.len() > 30, "expected the full builtin set, got {}", set.len());

        // Spot-check representative tools from each category.
        for name in [
            "read_file",
            "run_command",
            "git_status",
            "http_request",
            "process_list",
            "pip_install",
            "clipboard_write",
        ] {
            assert!(set.get(name).is_some(), "missing builtin tool {name}");
        }
    }

    #[test]
    fn register_all_respects_category_toggles() {
        let catalog = register_all();
        let set = catalog.build(&ctx_with(false, false)).unwrap();
        assert!(set.get("git_status").is_none());
        assert!(set.get("http_request").is_none());
        assert!(set.get("read_file").is_some());
        assert!(set.get("notify").is_some());
    }
}
