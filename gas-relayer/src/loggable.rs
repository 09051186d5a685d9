use std::fmt::{Display, Formatter};
use std::panic::Location;

use error_stack::{AttachmentKind, FrameKind, Report};
use itertools::Itertools;
use valuable::Valuable;

/// Structured view of an `error_stack::Report` so that a full error chain can be emitted as a
/// single tracing field.
#[derive(Valuable, PartialEq, Eq, Debug, Default)]
pub struct LoggableError {
    pub msg: String,
    pub attachments: Vec<String>,
    pub location: String,
    pub cause: Option<Box<LoggableError>>,
}

impl Display for LoggableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)?;

        if !self.attachments.is_empty() {
            write!(f, " ({})", self.attachments.iter().join(", "))?;
        }

        match &self.cause {
            Some(cause) => write!(f, ": {cause}"),
            None => Ok(()),
        }
    }
}

impl<C> From<&Report<C>> for LoggableError {
    fn from(report: &Report<C>) -> Self {
        // frames are yielded outermost first: the attachments of a context precede the context
        // itself, so every context frame closes one level of the chain
        let mut levels: Vec<LoggableError> = Vec::new();
        let mut current = LoggableError::default();

        for frame in report.frames() {
            match frame.kind() {
                FrameKind::Context(context) => {
                    current.msg = context.to_string();
                    current.attachments.reverse();
                    levels.push(std::mem::take(&mut current));
                }
                FrameKind::Attachment(AttachmentKind::Printable(printable)) => {
                    current.attachments.push(printable.to_string())
                }
                FrameKind::Attachment(_) => {
                    if let Some(location) = frame.downcast_ref::<Location>() {
                        current.location = location.to_string();
                    }
                }
            }
        }

        levels
            .into_iter()
            .rev()
            .fold(None, |cause: Option<LoggableError>, mut level| {
                level.cause = cause.map(Box::new);
                Some(level)
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use error_stack::Report;
    use thiserror::Error;

    use super::LoggableError;

    #[derive(Error, Debug)]
    enum Error {
        #[error("{0}")]
        Msg(&'static str),
    }

    #[test]
    fn report_should_become_nested_causes() {
        let report = Report::new(Error::Msg("node unreachable"))
            .attach_printable("eth_getCode")
            .change_context(Error::Msg("bytecode check failed"))
            .attach_printable("first")
            .attach_printable("second");

        let err = LoggableError::from(&report);

        assert_eq!(err.msg, "bytecode check failed");
        assert_eq!(err.attachments, vec!["first", "second"]);
        assert!(err.location.contains("loggable.rs"));

        let cause = err.cause.as_ref().unwrap();
        assert_eq!(cause.msg, "node unreachable");
        assert_eq!(cause.attachments, vec!["eth_getCode"]);
        assert!(cause.cause.is_none());

        assert_eq!(
            err.to_string(),
            "bytecode check failed (first, second): node unreachable (eth_getCode)"
        );
    }
}
