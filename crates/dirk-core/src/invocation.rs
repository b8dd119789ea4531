//! Command vectors handed to the execution engine.

use serde::{Deserialize, Serialize};

use crate::secrets::SecretRef;

/// Placeholder shown wherever a secret argument is rendered.
pub const REDACTED: &str = "***";

/// One element of an argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Plain(String),
    /// Resolved to plaintext by the engine at execution time.
    Secret(SecretRef),
}

impl Arg {
    /// Render for logs and reports.
    pub fn redacted(&self) -> &str {
        match self {
            Arg::Plain(s) => s,
            Arg::Secret(_) => REDACTED,
        }
    }
}

/// An argument vector. No shell interpretation is applied by anyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    args: Vec<Arg>,
}

impl Invocation {
    /// Start a vector with its program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![Arg::Plain(program.into())],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|a| Arg::Plain(a.into())));
        self
    }

    pub fn secret(mut self, secret: SecretRef) -> Self {
        self.args.push(Arg::Secret(secret));
        self
    }

    /// Append every argument of `other`, program included.
    pub fn chain(mut self, other: Invocation) -> Self {
        self.args.extend(other.args);
        self
    }

    pub fn as_args(&self) -> &[Arg] {
        &self.args
    }

    pub fn program(&self) -> Option<&str> {
        self.args.first().map(Arg::redacted)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The vector with secrets replaced by [`REDACTED`].
    pub fn redacted(&self) -> Vec<String> {
        self.args.iter().map(|a| a.redacted().to_string()).collect()
    }

    /// Whether any plain argument equals `needle`.
    pub fn has_flag(&self, needle: &str) -> bool {
        self.args
            .iter()
            .any(|a| matches!(a, Arg::Plain(s) if s == needle))
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.redacted().join(" "))
    }
}
