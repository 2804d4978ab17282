//! Declaring command paths.

use std::sync::Arc;

use cordon_core::{Scope, Session};
use tracing::debug;

use super::split::split_head;
use super::{ArgSpec, Command, CommandConfig};
use crate::context::Context;
use crate::error::{SetupError, SetupResult};

/// One node of a declaration walk, before anything is committed.
enum Step {
    Existing {
        node: Arc<Command>,
        parent: Option<usize>,
        attach: bool,
    },
    New {
        name: String,
        scope: Scope,
        parent: Option<usize>,
    },
}

impl Step {
    fn name(&self) -> &str {
        match self {
            Self::Existing { node, .. } => node.name(),
            Self::New { name, .. } => name,
        }
    }

    fn scope(&self) -> &Scope {
        match self {
            Self::Existing { node, .. } => node.scope(),
            Self::New { scope, .. } => scope,
        }
    }

    fn parent(&self) -> Option<usize> {
        match self {
            Self::Existing { parent, .. } | Self::New { parent, .. } => *parent,
        }
    }
}

/// Splits a path before every `.` or `/`, keeping the separator on the
/// following segment.
fn segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (at, ch) in path.char_indices() {
        if (ch == '.' || ch == '/') && at > start {
            segments.push(&path[start..at]);
            start = at;
        }
    }
    if start < path.len() {
        segments.push(&path[start..]);
    }
    segments
}

/// Returns `true` if `name` is `plan[index]` or one of its ancestors.
fn is_lineage(plan: &[Step], index: usize, name: &str) -> bool {
    let mut cursor = Some(index);
    while let Some(at) = cursor {
        let step = &plan[at];
        if step.name() == name {
            return true;
        }
        cursor = step.parent();
        if cursor.is_none()
            && let Step::Existing { node, .. } = step
        {
            let mut ancestor = node.parent();
            while let Some(current) = ancestor {
                if current.name() == name {
                    return true;
                }
                ancestor = current.parent();
            }
        }
    }
    false
}

impl Context {
    /// Declares a command path, creating missing nodes.
    ///
    /// `raw` is a path optionally followed by an argument declaration, e.g.
    /// `"dice.roll <sides> [count]"`. Returns the last node of the path.
    pub fn command(&self, raw: &str) -> SetupResult<Arc<Command>> {
        self.command_with(raw, None, CommandConfig::default())
    }

    /// Like [`command`](Self::command), also merging `description` and
    /// `config` onto the final node.
    ///
    /// The whole path is validated before any node is created or linked, so a
    /// failing declaration leaves the tree untouched.
    pub fn command_with(
        &self,
        raw: &str,
        description: Option<&str>,
        mut config: CommandConfig,
    ) -> SetupResult<Arc<Command>> {
        let (path, declaration) = split_head(raw);
        let path = path.to_lowercase();
        if path.is_empty() {
            return Err(SetupError::InvalidCommandName(raw.to_string()));
        }
        let arguments = ArgSpec::parse_declaration(declaration).map_err(|reason| {
            SetupError::InvalidDeclaration {
                name: path.clone(),
                reason,
            }
        })?;

        let mut commands = self.app().commands.write();
        let mut plan: Vec<Step> = Vec::new();
        let mut parent: Option<usize> = None;

        for segment in segments(&path) {
            let name = if let Some(rest) = segment.strip_prefix('.') {
                let Some(at) = parent else {
                    return Err(SetupError::invalid_subcommand(segment));
                };
                if rest.is_empty() {
                    return Err(SetupError::InvalidCommandName(path.clone()));
                }
                format!("{}.{rest}", plan[at].name())
            } else {
                segment.strip_prefix('/').unwrap_or(segment).to_string()
            };
            if name.is_empty() {
                return Err(SetupError::InvalidCommandName(path.clone()));
            }

            // A node already visited by this walk would become its own
            // ancestor.
            if plan.iter().any(|step| step.name() == name) {
                return Err(SetupError::invalid_subcommand(name));
            }

            let step = match commands.get(&name) {
                Some(node) => {
                    let mut attach = false;
                    if let Some(at) = parent {
                        match node.parent() {
                            Some(current) if current.name() != plan[at].name() => {
                                return Err(SetupError::invalid_subcommand(name));
                            }
                            Some(_) => {}
                            None => {
                                if is_lineage(&plan, at, &name) {
                                    return Err(SetupError::invalid_subcommand(name));
                                }
                                if !plan[at].scope().contains(node.scope()) {
                                    return Err(SetupError::invalid_context(name));
                                }
                                attach = true;
                            }
                        }
                    }
                    Step::Existing {
                        node: Arc::clone(node),
                        parent,
                        attach,
                    }
                }
                None => {
                    let scope = match parent {
                        Some(at) => self
                            .scope()
                            .intersect(plan[at].scope())
                            .ok_or_else(|| SetupError::invalid_context(name.as_str()))?,
                        None => self.scope().clone(),
                    };
                    Step::New {
                        name,
                        scope,
                        parent,
                    }
                }
            };

            plan.push(step);
            parent = Some(plan.len() - 1);
        }

        // Commit.
        let mut nodes: Vec<Arc<Command>> = Vec::with_capacity(plan.len());
        for step in plan {
            let node = match step {
                Step::Existing {
                    node,
                    parent,
                    attach,
                } => {
                    if attach && let Some(at) = parent {
                        Command::attach(&nodes[at], &node);
                    }
                    node
                }
                Step::New {
                    name,
                    scope,
                    parent,
                } => {
                    let node = Arc::new(Command::new(name, scope));
                    if let Some(at) = parent {
                        Command::attach(&nodes[at], &node);
                    }
                    commands.insert(node.name().to_string(), Arc::clone(&node));
                    debug!(command = node.name(), context = self.id(), "command declared");
                    node
                }
            };
            nodes.push(node);
        }
        drop(commands);

        let Some(last) = nodes.pop() else {
            return Err(SetupError::InvalidCommandName(raw.to_string()));
        };
        if !declaration.is_empty() {
            last.set_declaration(declaration, arguments);
        }
        if let Some(description) = description {
            config.description = Some(description.to_string());
        }
        last.set_config(config);
        Ok(last)
    }

    /// Looks up a command by name.
    ///
    /// With a `session`, commands whose scope does not admit it are hidden.
    pub fn get_command(&self, name: &str, session: Option<&Session>) -> Option<Arc<Command>> {
        let command = self.app().commands.get(name)?;
        match session {
            Some(session) if !command.matches(session) => None,
            _ => Some(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::App;
    use crate::context::AppOptions;

    fn app() -> App {
        App::new(AppOptions::default())
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("a.b/c"), vec!["a", ".b", "/c"]);
        assert_eq!(segments("/c"), vec!["/c"]);
        assert_eq!(segments("a"), vec!["a"]);
        assert_eq!(segments("a..b"), vec!["a", ".", ".b"]);
    }

    #[test]
    fn test_path_builds_chain() {
        let app = app();
        let c = app.command("A.b/C <x>").unwrap();

        assert_eq!(c.name(), "c");
        assert_eq!(c.declaration(), "<x>");
        let ab = c.parent().unwrap();
        assert_eq!(ab.name(), "a.b");
        assert_eq!(ab.parent().unwrap().name(), "a");
        assert_eq!(app.app().commands().names(), vec!["a", "a.b", "c"]);
    }

    #[test]
    fn test_redeclaration_returns_same_node() {
        let app = app();
        let first = app.group(&[1, 2]).command("a.b").unwrap();
        let second = app.group(&[1]).command("a.b").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_new_child_is_restricted_to_parent() {
        let app = app();
        app.group(&[1, 2]).command("a").unwrap();
        let child = app.group(&[2, 3]).command("a/b").unwrap();
        assert_eq!(child.scope().groups, cordon_core::ScopeSet::only([2]));
        assert!(!child.scope().private);

        let err = app.group(&[3]).command("a/z").unwrap_err();
        assert!(matches!(err, SetupError::InvalidContext { .. }));
        assert!(app.get_command("z", None).is_none());
    }

    #[test]
    fn test_uncontained_attach_creates_nothing() {
        let app = app();
        app.group(&[1]).command("a.b").unwrap();
        app.command("c").unwrap();

        let err = app.command("a.b/c").unwrap_err();
        assert!(matches!(err, SetupError::InvalidContext { ref name } if name == "c"));
        assert!(app.get_command("c", None).unwrap().parent().is_none());
        assert!(app.get_command("a.b", None).unwrap().children().is_empty());

        let err = app.command("a.x/c").unwrap_err();
        assert!(matches!(err, SetupError::InvalidContext { .. }));
        assert!(app.get_command("a.x", None).is_none());
    }

    #[test]
    fn test_contained_attach() {
        let app = app();
        app.command("a").unwrap();
        let c = app.group(&[1]).command("c").unwrap();

        let attached = app.command("a/c").unwrap();
        assert!(Arc::ptr_eq(&attached, &c));
        assert_eq!(c.parent().unwrap().name(), "a");
        assert_eq!(app.get_command("a", None).unwrap().children().len(), 1);
    }

    #[test]
    fn test_invalid_subcommands() {
        let app = app();
        assert!(matches!(
            app.command(".b").unwrap_err(),
            SetupError::InvalidSubcommand { .. }
        ));
        assert!(matches!(
            app.command("a/a").unwrap_err(),
            SetupError::InvalidSubcommand { .. }
        ));

        app.command("x/y").unwrap();
        assert!(matches!(
            app.command("z/y").unwrap_err(),
            SetupError::InvalidSubcommand { .. }
        ));
        assert!(app.get_command("z", None).is_none());

        // y already hangs under x, so x cannot move under y.
        assert!(matches!(
            app.command("y/x").unwrap_err(),
            SetupError::InvalidSubcommand { .. }
        ));

        assert!(matches!(
            app.command("  ").unwrap_err(),
            SetupError::InvalidCommandName(_)
        ));
        assert!(matches!(
            app.command("a..b").unwrap_err(),
            SetupError::InvalidCommandName(_)
        ));
    }

    #[test]
    fn test_description_and_config_merge() {
        let app = app();
        app.command_with(
            "echo <text>",
            Some("repeat text"),
            CommandConfig::default().with_allow_unprefixed(true),
        )
        .unwrap();
        let echo = app.command_with("echo", None, CommandConfig::default().with_hidden(true)).unwrap();

        assert_eq!(echo.description().as_deref(), Some("repeat text"));
        assert!(echo.allows_unprefixed());
        assert!(echo.is_hidden());
        assert_eq!(echo.declaration(), "<text>");
    }

    #[test]
    fn test_subcommand_and_visibility() {
        let app = app();
        let admin = app.group(&[1]).command("admin").unwrap();
        let ban = admin.subcommand(&app.group(&[1]), "ban <user>").unwrap();
        assert_eq!(ban.parent().unwrap().name(), "admin");
        assert!(ban.usage().ends_with("ban <user>"));

        assert!(app.get_command("BAN", Some(&Session::group(9, 1, 5, ""))).is_some());
        assert!(app.get_command("ban", Some(&Session::group(9, 2, 5, ""))).is_none());
        assert!(app.get_command("ban", Some(&Session::private(9, 5, ""))).is_none());
    }

    #[test]
    fn test_invalid_declaration_leaves_tree_untouched() {
        let app = app();
        let err = app.command("deploy/now <target> junk").unwrap_err();
        assert!(matches!(err, SetupError::InvalidDeclaration { ref name, .. } if name == "deploy/now"));
        assert!(app.app().commands().is_empty());

        let deploy = app.command("deploy <target> --force").unwrap();
        assert_eq!(deploy.arguments().len(), 2);
        assert!(app.command("deploy [target] <env>").is_err());
        assert_eq!(deploy.declaration(), "<target> --force");
    }
}
