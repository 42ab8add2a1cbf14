//! Server-side parsing of the remote command string into a typed request.

use std::collections::BTreeMap;

use crate::error::{ParseError, ValidationError};
use crate::services::{
    AddEnvironmentRequest, AddProjectRequest, GetSecretRequest, InjectRequest,
    ListEnvironmentRequest, ListSecretRequest, RemoveEnvironmentRequest, RemoveProjectRequest,
    RemoveSecretRequest, RenameEnvironmentRequest, RenameProjectRequest, SetSecretRequest,
    Validate,
};

const PROJECT_FLAG: &str = "project";
const ENVIRONMENT_FLAG: &str = "environment";

/// A parsed command, one variant per verb path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register,
    AddProject(AddProjectRequest),
    RemoveProject(RemoveProjectRequest),
    RenameProject(RenameProjectRequest),
    ListProjects,
    AddEnvironment(AddEnvironmentRequest),
    RemoveEnvironment(RemoveEnvironmentRequest),
    RenameEnvironment(RenameEnvironmentRequest),
    ListEnvironments(ListEnvironmentRequest),
    SetSecret(SetSecretRequest),
    GetSecret(GetSecretRequest),
    RemoveSecret(RemoveSecretRequest),
    ListSecrets(ListSecretRequest),
    Inject(InjectRequest),
}

impl Request {
    /// Verb path, as used in logs.
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Register => "register",
            Request::AddProject(_) => "project add",
            Request::RemoveProject(_) => "project remove",
            Request::RenameProject(_) => "project rename",
            Request::ListProjects => "project list",
            Request::AddEnvironment(_) => "environment add",
            Request::RemoveEnvironment(_) => "environment remove",
            Request::RenameEnvironment(_) => "environment rename",
            Request::ListEnvironments(_) => "environment list",
            Request::SetSecret(_) => "secret set",
            Request::GetSecret(_) => "secret get",
            Request::RemoveSecret(_) => "secret remove",
            Request::ListSecrets(_) => "secret list",
            Request::Inject(_) => "inject",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Request::Register | Request::ListProjects => Ok(()),
            Request::AddProject(r) => r.validate(),
            Request::RemoveProject(r) => r.validate(),
            Request::RenameProject(r) => r.validate(),
            Request::AddEnvironment(r) => r.validate(),
            Request::RemoveEnvironment(r) => r.validate(),
            Request::RenameEnvironment(r) => r.validate(),
            Request::ListEnvironments(r) => r.validate(),
            Request::SetSecret(r) => r.validate(),
            Request::GetSecret(r) => r.validate(),
            Request::RemoveSecret(r) => r.validate(),
            Request::ListSecrets(r) => r.validate(),
            Request::Inject(r) => r.validate(),
        }
    }
}

/// Positional arguments and flags following the verb path.
struct Tokens {
    args: std::vec::IntoIter<String>,
    flags: BTreeMap<String, String>,
}

impl Tokens {
    fn split<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Self, ParseError> {
        let mut args = Vec::new();
        let mut flags = BTreeMap::new();
        let mut tokens = tokens.peekable();

        while let Some(token) = tokens.next() {
            let name = if let Some(long) = token.strip_prefix("--") {
                long
            } else if let Some(short) = token.strip_prefix('-')
                && !short.is_empty()
            {
                match short {
                    "p" => PROJECT_FLAG,
                    "e" => ENVIRONMENT_FLAG,
                    other => return Err(ParseError::UnknownFlag(other.to_string())),
                }
            } else {
                args.push(token.to_string());
                continue;
            };

            let (name, value) = match name.split_once('=') {
                Some((name, value)) => (name, value.to_string()),
                None => match tokens.next() {
                    Some(value) => (name, value.to_string()),
                    None => return Err(ParseError::MissingFlagValue(name.to_string())),
                },
            };
            flags.insert(name.to_string(), value);
        }

        Ok(Self {
            args: args.into_iter(),
            flags,
        })
    }

    fn arg(&mut self, label: &'static str) -> Result<String, ParseError> {
        self.args.next().ok_or(ParseError::MissingArgument(label))
    }

    /// A flag value; absent flags become empty and are reported by validation.
    fn flag(&mut self, name: &str) -> String {
        self.flags.remove(name).unwrap_or_default()
    }

    fn done(mut self, request: Request) -> Result<Request, ParseError> {
        if let Some(extra) = self.args.next() {
            return Err(ParseError::UnexpectedArgument(extra));
        }
        if let Some(name) = self.flags.into_keys().next() {
            return Err(ParseError::UnknownFlag(name));
        }
        Ok(request)
    }
}

/// Parse a remote command line.
pub fn parse(line: &str) -> Result<Request, ParseError> {
    let mut words = line.split_whitespace();
    let root = words.next().ok_or(ParseError::Empty)?;

    let sub = match root {
        "register" | "inject" => None,
        "project" | "environment" | "secret" => words.next(),
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    let mut t = Tokens::split(words)?;

    let request = match (root, sub) {
        ("register", _) => Request::Register,
        ("inject", _) => Request::Inject(InjectRequest {
            project: t.flag(PROJECT_FLAG),
            environment: t.flag(ENVIRONMENT_FLAG),
        }),

        ("project", Some("add")) => Request::AddProject(AddProjectRequest {
            name: t.arg("project name")?,
        }),
        ("project", Some("remove")) => Request::RemoveProject(RemoveProjectRequest {
            name: t.arg("project name")?,
        }),
        ("project", Some("rename")) => Request::RenameProject(RenameProjectRequest {
            name: t.arg("project name")?,
            new_name: t.arg("new project name")?,
        }),
        ("project", Some("list")) => Request::ListProjects,

        ("environment", Some("add")) => Request::AddEnvironment(AddEnvironmentRequest {
            name: t.arg("environment name")?,
            project_name: t.flag(PROJECT_FLAG),
        }),
        ("environment", Some("remove")) => Request::RemoveEnvironment(RemoveEnvironmentRequest {
            name: t.arg("environment name")?,
            project_name: t.flag(PROJECT_FLAG),
        }),
        ("environment", Some("rename")) => Request::RenameEnvironment(RenameEnvironmentRequest {
            name: t.arg("environment name")?,
            new_name: t.arg("new environment name")?,
            project_name: t.flag(PROJECT_FLAG),
        }),
        ("environment", Some("list")) => Request::ListEnvironments(ListEnvironmentRequest {
            project_name: t.flag(PROJECT_FLAG),
        }),

        ("secret", Some("set")) => Request::SetSecret(SetSecretRequest {
            key: t.arg("secret key")?,
            value: t.arg("secret value")?,
            project: t.flag(PROJECT_FLAG),
            environment: t.flag(ENVIRONMENT_FLAG),
        }),
        ("secret", Some("get")) => Request::GetSecret(GetSecretRequest {
            key: t.arg("secret key")?,
            project: t.flag(PROJECT_FLAG),
            environment: t.flag(ENVIRONMENT_FLAG),
        }),
        ("secret", Some("remove")) => Request::RemoveSecret(RemoveSecretRequest {
            key: t.arg("secret key")?,
            project: t.flag(PROJECT_FLAG),
            environment: t.flag(ENVIRONMENT_FLAG),
        }),
        ("secret", Some("list")) => Request::ListSecrets(ListSecretRequest {
            project: t.flag(PROJECT_FLAG),
            environment: t.flag(ENVIRONMENT_FLAG),
        }),

        (root, Some(sub)) => return Err(ParseError::UnknownCommand(format!("{} {}", root, sub))),
        (root, None) => return Err(ParseError::UnknownCommand(root.to_string())),
    };

    t.done(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod grammar {
        use super::*;

        #[test]
        fn test_register() {
            assert_eq!(parse("register").unwrap(), Request::Register);
        }

        #[test]
        fn test_project_commands() {
            assert_eq!(
                parse("project add web").unwrap(),
                Request::AddProject(AddProjectRequest {
                    name: "web".to_string()
                })
            );
            assert_eq!(
                parse("project rename web site").unwrap(),
                Request::RenameProject(RenameProjectRequest {
                    name: "web".to_string(),
                    new_name: "site".to_string(),
                })
            );
            assert_eq!(parse("  project   list ").unwrap(), Request::ListProjects);
        }

        #[test]
        fn test_flags_anywhere_after_path() {
            let expected = Request::AddEnvironment(AddEnvironmentRequest {
                name: "prod".to_string(),
                project_name: "web".to_string(),
            });
            assert_eq!(parse("environment add prod --project web").unwrap(), expected);
            assert_eq!(parse("environment add --project web prod").unwrap(), expected);
            assert_eq!(parse("environment add prod -p web").unwrap(), expected);
            assert_eq!(parse("environment add prod --project=web").unwrap(), expected);
        }

        #[test]
        fn test_secret_set() {
            assert_eq!(
                parse("secret set API_KEY c2VhbGVk== --environment prod --project web").unwrap(),
                Request::SetSecret(SetSecretRequest {
                    project: "web".to_string(),
                    environment: "prod".to_string(),
                    key: "API_KEY".to_string(),
                    value: "c2VhbGVk==".to_string(),
                })
            );
        }

        #[test]
        fn test_inject_with_short_flags() {
            assert_eq!(
                parse("inject -p web -e prod").unwrap(),
                Request::Inject(InjectRequest {
                    project: "web".to_string(),
                    environment: "prod".to_string(),
                })
            );
        }

        #[test]
        fn test_missing_flag_is_left_to_validation() {
            let request = parse("secret list --project web").unwrap();
            let err = request.validate().unwrap_err();
            assert_eq!(err.to_string(), "environment name is required");
        }

        #[test]
        fn test_verb_names_match_paths() {
            assert_eq!(parse("secret list -p a -e b").unwrap().verb(), "secret list");
            assert_eq!(parse("inject").unwrap().verb(), "inject");
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_empty() {
            assert_eq!(parse("   "), Err(ParseError::Empty));
        }

        #[test]
        fn test_unknown_command() {
            assert_eq!(
                parse("shell"),
                Err(ParseError::UnknownCommand("shell".to_string()))
            );
            assert_eq!(
                parse("project delete web"),
                Err(ParseError::UnknownCommand("project delete".to_string()))
            );
            assert_eq!(
                parse("secret"),
                Err(ParseError::UnknownCommand("secret".to_string()))
            );
        }

        #[test]
        fn test_missing_argument() {
            assert_eq!(
                parse("project rename web"),
                Err(ParseError::MissingArgument("new project name"))
            );
        }

        #[test]
        fn test_unexpected_argument() {
            assert_eq!(
                parse("project list extra"),
                Err(ParseError::UnexpectedArgument("extra".to_string()))
            );
        }

        #[test]
        fn test_unknown_flag() {
            assert_eq!(
                parse("project add web --force yes"),
                Err(ParseError::UnknownFlag("force".to_string()))
            );
            assert_eq!(
                parse("inject -x web"),
                Err(ParseError::UnknownFlag("x".to_string()))
            );
        }

        #[test]
        fn test_flag_without_value() {
            assert_eq!(
                parse("environment list --project"),
                Err(ParseError::MissingFlagValue("project".to_string()))
            );
        }
    }
}
