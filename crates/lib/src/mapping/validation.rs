//! Collecting validation messages while a change is checked.

use std::fmt;

use thiserror::Error;
use tracing::debug;

/// How serious a validation message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The catalogue of validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    EmptyName,
    IllegalIdentifier,
    ReservedIdentifier,
    NonUniqueName,
    NonUniqueNameClass,
    IllegalDocCommentEnd,
    ShadowedName,
}

impl Message {
    pub fn severity(self) -> Severity {
        match self {
            Message::ShadowedName => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Stable identifier of the message, usable as a translation key.
    pub fn key(self) -> &'static str {
        match self {
            Message::EmptyName => "empty_name",
            Message::IllegalIdentifier => "illegal_identifier",
            Message::ReservedIdentifier => "reserved_identifier",
            Message::NonUniqueName => "non_unique_name",
            Message::NonUniqueNameClass => "non_unique_name_class",
            Message::IllegalDocCommentEnd => "illegal_doc_comment_end",
            Message::ShadowedName => "shadowed_name",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Message::EmptyName => "Name can't be empty",
            Message::IllegalIdentifier => "Invalid identifier '{}': illegal character '{}' at {}",
            Message::ReservedIdentifier => "Identifier '{}' is a reserved word",
            Message::NonUniqueName => "Name '{}' is already used",
            Message::NonUniqueNameClass => "Name '{}' is already used in class '{}'",
            Message::IllegalDocCommentEnd => "Documentation can't contain '*/'",
            Message::ShadowedName => "Name '{}' shadows a name in '{}'",
        }
    }
}

/// A message together with the values substituted into its template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterizedMessage {
    message: Message,
    params: Vec<String>,
}

impl ParameterizedMessage {
    pub fn new(message: Message, params: Vec<String>) -> Self {
        Self { message, params }
    }

    pub fn message(&self) -> Message {
        self.message
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn severity(&self) -> Severity {
        self.message.severity()
    }
}

impl fmt::Display for ParameterizedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = self.params.iter();
        let mut pieces = self.message.template().split("{}");
        if let Some(first) = pieces.next() {
            f.write_str(first)?;
        }
        for piece in pieces {
            match params.next() {
                Some(param) => f.write_str(param)?,
                None => f.write_str("?")?,
            }
            f.write_str(piece)?;
        }
        Ok(())
    }
}

/// Accumulates the messages raised while validating a change.
///
/// The same message with the same parameters is only recorded once. A context can
/// proceed as long as no error-severity message was raised.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    messages: Vec<ParameterizedMessage>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, message: Message, params: Vec<String>) {
        let message = ParameterizedMessage::new(message, params);
        if self.messages.contains(&message) {
            return;
        }
        debug!(severity = ?message.severity(), "Validation: {message}");
        self.messages.push(message);
    }

    pub fn can_proceed(&self) -> bool {
        !self
            .messages
            .iter()
            .any(|message| message.severity() == Severity::Error)
    }

    pub fn messages(&self) -> &[ParameterizedMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Turn the collected messages into a result: `Err` if any of them blocks the change.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.can_proceed() {
            Ok(())
        } else {
            Err(ValidationError::Rejected {
                messages: self.messages,
            })
        }
    }
}

/// A change that failed validation.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Change rejected: {}", format_messages(.messages))]
    Rejected { messages: Vec<ParameterizedMessage> },
}

impl ValidationError {
    pub fn messages(&self) -> &[ParameterizedMessage] {
        match self {
            ValidationError::Rejected { messages } => messages,
        }
    }

    /// Check if any of the messages is `message`.
    pub fn contains(&self, message: Message) -> bool {
        self.messages()
            .iter()
            .any(|raised| raised.message() == message)
    }
}

fn format_messages(messages: &[ParameterizedMessage]) -> String {
    messages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_messages_are_collapsed() {
        let mut vc = ValidationContext::new();
        vc.raise(Message::NonUniqueName, vec!["a".into()]);
        vc.raise(Message::NonUniqueName, vec!["a".into()]);
        vc.raise(Message::NonUniqueName, vec!["b".into()]);

        assert_eq!(vc.messages().len(), 2);
    }

    #[test]
    fn test_warnings_do_not_block() {
        let mut vc = ValidationContext::new();
        assert!(vc.can_proceed());

        vc.raise(Message::ShadowedName, vec!["a".into(), "b".into()]);
        assert!(vc.can_proceed());

        vc.raise(Message::EmptyName, Vec::new());
        assert!(!vc.can_proceed());

        let err = vc.into_result().unwrap_err();
        assert!(err.contains(Message::EmptyName));
        assert!(!err.contains(Message::IllegalIdentifier));
    }

    #[test]
    fn test_message_formatting() {
        let message = ParameterizedMessage::new(
            Message::NonUniqueNameClass,
            vec!["foo".into(), "a/b".into()],
        );
        assert_eq!(message.to_string(), "Name 'foo' is already used in class 'a/b'");

        let missing = ParameterizedMessage::new(Message::ReservedIdentifier, Vec::new());
        assert_eq!(missing.to_string(), "Identifier '?' is a reserved word");
    }
}
