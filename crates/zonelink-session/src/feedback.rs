//! Sinks for lines users address to the feedback pseudo-user.

use std::future::Future;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::SessionError;

/// Append-only store for feedback lines.
pub trait FeedbackSink: Send + Sync + 'static {
    /// Stores one line of feedback from `from`.
    fn append(
        &self,
        from: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Appends `"<name>: <text>"` lines to a file, creating it if needed.
#[derive(Debug)]
pub struct FileFeedbackSink {
    path: PathBuf,
    // Serializes appends so lines from concurrent users never interleave.
    write: Mutex<()>,
}

impl FileFeedbackSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }
}

impl FeedbackSink for FileFeedbackSink {
    async fn append(&self, from: &str, text: &str) -> Result<(), SessionError> {
        let line = format!("{from}: {}\n", text.trim_end_matches('\0'));
        let _guard = self.write.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(SessionError::Feedback)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(SessionError::Feedback)?;
        file.flush().await.map_err(SessionError::Feedback)
    }
}

/// Logs feedback and keeps nothing. Used when no feedback file is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFeedbackSink;

impl FeedbackSink for NullFeedbackSink {
    async fn append(&self, from: &str, text: &str) -> Result<(), SessionError> {
        tracing::info!(from, text, "feedback received (not stored)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_feedback_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!(
            "zonelink-feedback-{}-{}.txt",
            std::process::id(),
            line!()
        ));
        let _ = std::fs::remove_file(&path);

        let sink = FileFeedbackSink::new(&path);
        sink.append("alice", "more maps please").await.unwrap();
        sink.append("bob", "lag\0").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "alice: more maps please\nbob: lag\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_file_feedback_sink_bad_path_returns_error() {
        let sink = FileFeedbackSink::new("/nonexistent-dir/zonelink/feedback.txt");
        let err = sink.append("a", "b").await.unwrap_err();
        assert!(matches!(err, SessionError::Feedback(_)));
    }
}
