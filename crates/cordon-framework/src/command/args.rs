//! Argument declarations and their clap form.
//!
//! A declaration lists positional arguments and long options:
//!
//! - `<name>` is a required positional, `[name]` an optional one;
//! - `<name...>` / `[...name]` collect the remaining positionals and must
//!   come last;
//! - `--name` is a boolean flag;
//! - `--name <value>` is an option taking one value.
//!
//! Each command node turns its declaration into a [`clap::Command`], which
//! does the actual parsing and renders usage and error text.

use clap::{Arg, ArgAction, ArgMatches};
use serde_json::{Map, Value};

/// How a declared argument appears on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    /// A positional argument.
    Positional {
        /// `<name>` is required, `[name]` is not.
        required: bool,
        /// Collects every remaining positional token.
        variadic: bool,
    },
    /// `--name`, set to `true` when present.
    Flag,
    /// `--name <value>`, taking one value.
    Value {
        /// Placeholder shown in usage text.
        value_name: String,
    },
}

/// One argument in a command declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    /// Argument name, also the key under which its value is reported.
    pub name: String,
    /// How the argument is given.
    pub kind: ArgKind,
}

impl ArgSpec {
    /// Reads the argument tokens of a declaration such as
    /// `"<target> [count] --force --env <name>"`.
    ///
    /// Fails on unbracketed tokens, empty or repeated names, a required
    /// positional after an optional one, and anything after a variadic
    /// positional. `help` is reserved for the generated help flag.
    pub fn parse_declaration(declaration: &str) -> Result<Vec<Self>, String> {
        let mut specs: Vec<Self> = Vec::new();
        let mut tokens = declaration.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            let spec = if let Some(long) = token.strip_prefix("--") {
                let kind = match tokens.next_if(|next| bracketed(next).is_some()) {
                    Some(value) => ArgKind::Value {
                        value_name: bracketed(value).map_or_else(String::new, |(inner, _)| {
                            inner.trim_matches('.').to_string()
                        }),
                    },
                    None => ArgKind::Flag,
                };
                Self {
                    name: long.to_string(),
                    kind,
                }
            } else {
                let (inner, required) =
                    bracketed(token).ok_or_else(|| format!("unexpected token {token:?}"))?;
                let (name, variadic) = match inner.strip_prefix("...") {
                    Some(name) => (name, true),
                    None => match inner.strip_suffix("...") {
                        Some(name) => (name, true),
                        None => (inner, false),
                    },
                };
                Self {
                    name: name.to_string(),
                    kind: ArgKind::Positional { required, variadic },
                }
            };

            if spec.name.is_empty() || spec.name.starts_with('-') || spec.name.contains('=') {
                return Err(format!("invalid argument name in {token:?}"));
            }
            if spec.name == "help" {
                return Err("\"help\" is reserved".to_string());
            }
            if specs.iter().any(|other| other.name == spec.name) {
                return Err(format!("duplicate argument \"{}\"", spec.name));
            }
            if let ArgKind::Positional { required, .. } = spec.kind {
                for other in &specs {
                    match other.kind {
                        ArgKind::Positional { variadic: true, .. } => {
                            return Err(format!(
                                "\"{}\" follows variadic \"{}\"",
                                spec.name, other.name
                            ));
                        }
                        ArgKind::Positional {
                            required: false, ..
                        } if required => {
                            return Err(format!(
                                "required \"{}\" follows optional \"{}\"",
                                spec.name, other.name
                            ));
                        }
                        _ => {}
                    }
                }
            }
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Returns `true` for positional arguments.
    pub fn is_positional(&self) -> bool {
        matches!(self.kind, ArgKind::Positional { .. })
    }

    /// The clap argument for this spec.
    pub fn to_arg(&self) -> Arg {
        let arg = Arg::new(self.name.clone());
        match &self.kind {
            ArgKind::Positional { required, variadic } => {
                let arg = arg
                    .value_name(self.name.clone())
                    .required(*required)
                    .allow_negative_numbers(true);
                if *variadic {
                    arg.num_args(1..).action(ArgAction::Append)
                } else {
                    arg.action(ArgAction::Set)
                }
            }
            ArgKind::Flag => arg.long(self.name.clone()).action(ArgAction::SetTrue),
            ArgKind::Value { value_name } => arg
                .long(self.name.clone())
                .value_name(value_name.clone())
                .action(ArgAction::Set),
        }
    }
}

fn bracketed(token: &str) -> Option<(&str, bool)> {
    if let Some(inner) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Some((inner, true));
    }
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    Some((inner, false))
}

/// Positional arguments and options read back from clap matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    /// Positional values, in declaration order.
    pub args: Vec<String>,
    /// Flags (always present, `true` or `false`) and given option values.
    pub options: Map<String, Value>,
}

impl ParsedArgs {
    /// Collects the values of `specs` from `matches`.
    pub fn from_matches(specs: &[ArgSpec], matches: &ArgMatches) -> Self {
        let mut parsed = Self::default();
        for spec in specs {
            match spec.kind {
                ArgKind::Positional { .. } => {
                    if let Some(values) = matches.get_many::<String>(&spec.name) {
                        parsed.args.extend(values.cloned());
                    }
                }
                ArgKind::Flag => {
                    parsed
                        .options
                        .insert(spec.name.clone(), Value::Bool(matches.get_flag(&spec.name)));
                }
                ArgKind::Value { .. } => {
                    if let Some(value) = matches.get_one::<String>(&spec.name) {
                        parsed
                            .options
                            .insert(spec.name.clone(), Value::String(value.clone()));
                    }
                }
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clap_command(declaration: &str) -> (Vec<ArgSpec>, clap::Command) {
        let specs = ArgSpec::parse_declaration(declaration).unwrap();
        let command = clap::Command::new("test")
            .no_binary_name(true)
            .args(specs.iter().map(ArgSpec::to_arg));
        (specs, command)
    }

    #[test]
    fn test_declaration_parsing() {
        let specs = ArgSpec::parse_declaration("<target> [count] --force --env <name> [...rest]")
            .unwrap();
        let names: Vec<_> = specs.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, vec!["target", "count", "force", "env", "rest"]);
        assert_eq!(
            specs[0].kind,
            ArgKind::Positional {
                required: true,
                variadic: false
            }
        );
        assert_eq!(specs[2].kind, ArgKind::Flag);
        assert_eq!(
            specs[3].kind,
            ArgKind::Value {
                value_name: "name".into()
            }
        );
        assert_eq!(
            specs[4].kind,
            ArgKind::Positional {
                required: false,
                variadic: true
            }
        );
        assert_eq!(specs.iter().filter(|spec| spec.is_positional()).count(), 3);
    }

    #[test]
    fn test_declaration_errors() {
        assert!(ArgSpec::parse_declaration("junk").is_err());
        assert!(ArgSpec::parse_declaration("<a> <a>").is_err());
        assert!(ArgSpec::parse_declaration("[a] <b>").is_err());
        assert!(ArgSpec::parse_declaration("<a...> [b]").is_err());
        assert!(ArgSpec::parse_declaration("--help").is_err());
        assert!(ArgSpec::parse_declaration("<>").is_err());
        assert_eq!(ArgSpec::parse_declaration("  ").unwrap(), Vec::new());
    }

    #[test]
    fn test_matches_collect_args_and_options() {
        let (specs, command) = clap_command("<target> [count] --force --env <name>");
        let matches = command
            .try_get_matches_from(["web", "-3", "--env", "prod"])
            .unwrap();
        let parsed = ParsedArgs::from_matches(&specs, &matches);

        assert_eq!(parsed.args, vec!["web", "-3"]);
        assert_eq!(parsed.options["force"], json!(false));
        assert_eq!(parsed.options["env"], json!("prod"));
    }

    #[test]
    fn test_variadic_collects_rest() {
        let (specs, command) = clap_command("<words...>");
        let matches = command
            .try_get_matches_from(["hello", "big", "world"])
            .unwrap();
        let parsed = ParsedArgs::from_matches(&specs, &matches);
        assert_eq!(parsed.args, vec!["hello", "big", "world"]);
    }

    #[test]
    fn test_missing_and_unexpected_arguments() {
        use clap::error::ErrorKind;

        let (_, command) = clap_command("<target>");
        let err = command.clone().try_get_matches_from(Vec::<String>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = command.try_get_matches_from(["a", "b"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }
}
