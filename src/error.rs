use std::error;
use std::fmt;

/// An error of kind `T`, annotated with the tree node it was raised for and with what the
/// generator was doing at the time.
#[derive(Debug, Clone)]
pub struct Error<T> {
    pub kind: T,
    node: Option<String>,
    contexts: Vec<String>,
}

impl<T> Error<T> {
    pub const fn new(kind: T) -> Self {
        Self {
            kind,
            node: None,
            contexts: Vec::new(),
        }
    }
    pub fn map_kind<F, U>(self, mapper: F) -> Error<U>
    where
        F: Fn(T) -> U,
    {
        Error {
            kind: mapper(self.kind),
            node: self.node,
            contexts: self.contexts,
        }
    }
    /// The node given is only applied if there was no more specific one
    #[must_use]
    pub fn with_backup_node(self, node: impl fmt::Display) -> Self {
        if self.node.is_some() {
            self
        } else {
            self.with_node(node)
        }
    }
    #[must_use]
    pub fn with_node(mut self, node: impl fmt::Display) -> Self {
        self.node = Some(node.to_string());
        self
    }
    #[must_use]
    pub fn add_context(mut self, ctx: impl Into<String>) -> Self {
        self.contexts.push(ctx.into());
        self
    }
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }
    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.contexts.iter().map(String::as_str)
    }
}

impl<T> From<T> for Error<T> {
    fn from(kind: T) -> Self {
        Self::new(kind)
    }
}

impl<T: error::Error + 'static> error::Error for Error<T> {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl<T: fmt::Display> fmt::Display for Error<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let whiles = self
            .contexts
            .iter()
            .fold(String::new(), |acc, next| acc + "\nwhile " + next);
        match &self.node {
            Some(node) => write!(f, "{}\n   --> at `{}`{}", self.kind, node, whiles),
            None => write!(f, "{}(no node info){}", self.kind, whiles),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_node_and_contexts() {
        let err = Error::new("unknown name `y`")
            .with_backup_node("y := 1")
            .with_backup_node("ignored")
            .add_context("generating function `f`")
            .add_context("generating the program");
        assert_eq!(
            err.to_string(),
            concat!(
                "unknown name `y`\n   --> at `y := 1`\n",
                "while generating function `f`\nwhile generating the program"
            )
        );
        assert_eq!(err.map_kind(str::len).kind, 16);
    }
}
