//! Line-oriented streaming protocol.
//!
//! Every pipeline event becomes one message terminated by `\n`:
//!
//! - `PROGRESS:<completed>/<total>`
//! - `SUMMARY:<escaped text>`
//! - `ERROR:<escaped message>`
//!
//! Payload newlines are written as the two characters `\` `n` so a message never spans
//! lines. Nothing else is escaped; [`unescape`] reverses exactly that substitution.

use futures_core::Stream;
use futures_util::StreamExt;
use std::fmt;
use thiserror::Error;

use crate::processing::{PipelineError, PipelineEvent, PipelineResult};

const PROGRESS_PREFIX: &str = "PROGRESS:";
const SUMMARY_PREFIX: &str = "SUMMARY:";
const ERROR_PREFIX: &str = "ERROR:";

/// Errors raised while parsing a protocol line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line does not start with a known message prefix.
    #[error("Unrecognized protocol message: {0}")]
    UnknownMessage(String),
    /// A progress message whose counters could not be parsed.
    #[error("Malformed progress message: {0}")]
    MalformedProgress(String),
}

/// One decoded protocol message, payloads unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Map-phase progress.
    Progress {
        /// Index of the chunk that just finished.
        completed: usize,
        /// Chunk count for the run.
        total: usize,
    },
    /// Final summary.
    Summary(String),
    /// Terminal failure.
    Error(String),
}

impl From<&PipelineEvent> for ProtocolMessage {
    fn from(event: &PipelineEvent) -> Self {
        match event {
            PipelineEvent::Progress(progress) => Self::Progress {
                completed: progress.completed,
                total: progress.total,
            },
            PipelineEvent::Finished(PipelineResult::Success { text }) => {
                Self::Summary(text.clone())
            }
            PipelineEvent::Finished(PipelineResult::Failure { message }) => {
                Self::Error(message.clone())
            }
        }
    }
}

impl fmt::Display for ProtocolMessage {
    /// Writes the message without its trailing newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress { completed, total } => {
                write!(f, "{PROGRESS_PREFIX}{completed}/{total}")
            }
            Self::Summary(text) => write!(f, "{SUMMARY_PREFIX}{}", escape(text)),
            Self::Error(message) => write!(f, "{ERROR_PREFIX}{}", escape(message)),
        }
    }
}

/// Replace every newline with the two-character sequence `\n`.
pub fn escape(text: &str) -> String {
    text.replace('\n', "\\n")
}

/// Inverse of [`escape`].
pub fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Encode an event as a framed message, trailing newline included.
pub fn encode(event: &PipelineEvent) -> String {
    format!("{}\n", ProtocolMessage::from(event))
}

/// Parse one message. A single trailing `\n` is ignored.
///
/// Text payloads keep any other trailing characters, `\r` included, since only newlines
/// are escaped on the wire. Progress counters tolerate surrounding whitespace.
pub fn decode_line(line: &str) -> Result<ProtocolMessage, ProtocolError> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    if let Some(counters) = line.strip_prefix(PROGRESS_PREFIX) {
        let malformed = || ProtocolError::MalformedProgress(line.trim_end().to_string());
        let (completed, total) = counters.trim().split_once('/').ok_or_else(malformed)?;
        return Ok(ProtocolMessage::Progress {
            completed: completed.parse().map_err(|_| malformed())?,
            total: total.parse().map_err(|_| malformed())?,
        });
    }
    if let Some(text) = line.strip_prefix(SUMMARY_PREFIX) {
        return Ok(ProtocolMessage::Summary(unescape(text)));
    }
    if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
        return Ok(ProtocolMessage::Error(unescape(message)));
    }
    Err(ProtocolError::UnknownMessage(line.to_string()))
}

/// Turn a pipeline event stream into framed protocol lines. Stream errors pass through
/// untouched; they are not protocol messages.
pub fn encode_events<S>(events: S) -> impl Stream<Item = Result<String, PipelineError>>
where
    S: Stream<Item = Result<PipelineEvent, PipelineError>>,
{
    events.map(|item| item.map(|event| encode(&event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ProgressEvent;

    #[test]
    fn progress_is_completed_over_total() {
        let event = PipelineEvent::Progress(ProgressEvent {
            completed: 2,
            total: 3,
        });
        assert_eq!(encode(&event), "PROGRESS:2/3\n");
    }

    #[test]
    fn summary_newlines_are_escaped_onto_one_line() {
        let event = PipelineEvent::Finished(PipelineResult::Success {
            text: "First paragraph.\n\nSecond paragraph.".into(),
        });
        let line = encode(&event);
        assert_eq!(line, "SUMMARY:First paragraph.\\n\\nSecond paragraph.\n");
        assert_eq!(line.matches('\n').count(), 1);

        assert_eq!(
            decode_line(&line),
            Ok(ProtocolMessage::Summary(
                "First paragraph.\n\nSecond paragraph.".into(),
            ))
        );
    }

    #[test]
    fn error_messages_are_escaped_too() {
        let event = PipelineEvent::Finished(PipelineResult::Failure {
            message: "Could not generate final summary. Error: line one\nline two".into(),
        });
        assert_eq!(
            encode(&event),
            "ERROR:Could not generate final summary. Error: line one\\nline two\n"
        );
    }

    #[test]
    fn decode_accepts_progress_and_crlf() {
        assert_eq!(
            decode_line("PROGRESS:10/12\r\n"),
            Ok(ProtocolMessage::Progress {
                completed: 10,
                total: 12
            })
        );
        assert_eq!(
            decode_line("ERROR:Invalid model choice: unknown"),
            Ok(ProtocolMessage::Error("Invalid model choice: unknown".into()))
        );
    }

    #[test]
    fn summary_trailing_carriage_return_survives_decoding() {
        let event = PipelineEvent::Finished(PipelineResult::Success {
            text: "Windows line\r".into(),
        });
        assert_eq!(
            decode_line(&encode(&event)),
            Ok(ProtocolMessage::Summary("Windows line\r".into()))
        );
    }

    #[test]
    fn decode_rejects_malformed_lines() {
        assert_eq!(
            decode_line("PROGRESS:two/3"),
            Err(ProtocolError::MalformedProgress("PROGRESS:two/3".into()))
        );
        assert_eq!(
            decode_line("PROGRESS:3"),
            Err(ProtocolError::MalformedProgress("PROGRESS:3".into()))
        );
        assert!(matches!(
            decode_line("hello"),
            Err(ProtocolError::UnknownMessage(_))
        ));
    }

    #[tokio::test]
    async fn event_stream_becomes_lines() {
        let events = futures_util::stream::iter(vec![
            Ok(PipelineEvent::Progress(ProgressEvent {
                completed: 1,
                total: 1,
            })),
            Ok(PipelineEvent::Finished(PipelineResult::Success {
                text: "Done.".into(),
            })),
        ]);
        let lines: Vec<String> = encode_events(events)
            .map(|line| line.expect("line"))
            .collect()
            .await;
        assert_eq!(lines, vec!["PROGRESS:1/1\n", "SUMMARY:Done.\n"]);
    }
}
