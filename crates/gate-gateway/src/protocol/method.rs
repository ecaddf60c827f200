//! Dotted method names (`service.action`)

use std::fmt;

/// A client method name split into its routing namespace and action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodName<'a> {
    full: &'a str,
    service: &'a str,
    action: &'a str,
}

/// Method name parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodNameError {
    /// Fewer than two non-empty dot-separated segments
    #[error("method `{0}` is not in `service.action` form")]
    NotNamespaced(String),
}

impl<'a> MethodName<'a> {
    /// Split `service.action`; the action may itself contain dots
    pub fn parse(full: &'a str) -> Result<Self, MethodNameError> {
        match full.split_once('.') {
            Some((service, action)) if !service.is_empty() && !action.is_empty() => Ok(Self {
                full,
                service,
                action,
            }),
            _ => Err(MethodNameError::NotNamespaced(full.to_string())),
        }
    }

    /// The backend service this method is routed to
    #[must_use]
    pub fn service(&self) -> &'a str {
        self.service
    }

    #[must_use]
    pub fn action(&self) -> &'a str {
        self.action
    }

    #[must_use]
    pub fn as_str(&self) -> &'a str {
        self.full
    }
}

impl fmt::Display for MethodName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full)
    }
}
