//! File attachments appended to a question.
//!
//! Text files are included (first [`MAX_ATTACHMENT_CHARS`] characters) and go
//! through masking with the rest of the question. Anything else is noted by
//! name and size only; its bytes are never read into the question.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CliError;

/// Characters of a text attachment included in the question.
pub const MAX_ATTACHMENT_CHARS: usize = 5000;

/// What was read from an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentBody {
    /// UTF-8 text, possibly cut to the limit.
    Text {
        /// Included text
        text: String,
        /// Whether the file was longer than the limit
        truncated: bool,
    },
    /// Not text; only metadata is included.
    Binary,
}

/// One attached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown in the question
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Contents
    pub body: AttachmentBody,
}

/// Read an attachment from `path`.
///
/// # Errors
///
/// [`CliError::Attachment`] if the file cannot be read.
pub async fn load_attachment(path: &Path) -> Result<Attachment, CliError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::Attachment {
            path: path.to_path_buf(),
            source,
        })?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let size = bytes.len() as u64;

    let body = match String::from_utf8(bytes) {
        Ok(text) if !text.contains('\0') => {
            let truncated = text.chars().count() > MAX_ATTACHMENT_CHARS;
            let text = if truncated {
                text.chars().take(MAX_ATTACHMENT_CHARS).collect()
            } else {
                text
            };
            AttachmentBody::Text { text, truncated }
        }
        _ => AttachmentBody::Binary,
    };
    debug!(
        name = %name,
        size,
        text = matches!(body, AttachmentBody::Text { .. }),
        "Attachment loaded"
    );
    Ok(Attachment { name, size, body })
}

/// Read every attachment in order.
///
/// # Errors
///
/// The first unreadable file.
pub async fn load_all(paths: &[PathBuf]) -> Result<Vec<Attachment>, CliError> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        attachments.push(load_attachment(path).await?);
    }
    Ok(attachments)
}

/// Append attachments to `question`.
#[must_use]
pub fn compose_question(question: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return question.to_string();
    }
    let parts: Vec<String> = attachments
        .iter()
        .map(|a| match &a.body {
            AttachmentBody::Text { text, truncated } => {
                let note = if *truncated {
                    format!(" (first {MAX_ATTACHMENT_CHARS} characters)")
                } else {
                    String::new()
                };
                format!("**{}**{note}:\n```\n{text}\n```", a.name)
            }
            AttachmentBody::Binary => {
                format!("**{}**: [binary file, {} bytes, not included]", a.name, a.size)
            }
        })
        .collect();
    format!("{question}\n\n--- Attached files ---\n{}", parts.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_text_attachment_is_included() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Contact Jane Doe about the merger.").unwrap();

        let attachment = load_attachment(file.path()).await.unwrap();
        assert_eq!(
            attachment.body,
            AttachmentBody::Text {
                text: "Contact Jane Doe about the merger.".to_string(),
                truncated: false
            }
        );

        let question = compose_question("Summarize this", &[attachment]);
        assert!(question.starts_with("Summarize this\n\n--- Attached files ---\n"));
        assert!(question.contains("```\nContact Jane Doe about the merger.\n```"));
    }

    #[tokio::test]
    async fn test_long_text_is_truncated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", "é".repeat(MAX_ATTACHMENT_CHARS + 10)).unwrap();

        let attachment = load_attachment(file.path()).await.unwrap();
        match &attachment.body {
            AttachmentBody::Text { text, truncated } => {
                assert!(truncated);
                assert_eq!(text.chars().count(), MAX_ATTACHMENT_CHARS);
            }
            AttachmentBody::Binary => panic!("expected text"),
        }
        assert!(compose_question("q", &[attachment]).contains("(first 5000 characters)"));
    }

    #[tokio::test]
    async fn test_binary_attachment_is_noted_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x25, 0x50, 0x44, 0x46, 0x00, 0xff, 0xfe]).unwrap();

        let attachment = load_attachment(file.path()).await.unwrap();
        assert_eq!(attachment.body, AttachmentBody::Binary);
        assert_eq!(attachment.size, 7);
        assert!(
            compose_question("q", &[attachment]).contains("[binary file, 7 bytes, not included]")
        );
    }

    #[tokio::test]
    async fn test_missing_attachment_is_error() {
        let err = load_attachment(Path::new("/nonexistent/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Attachment { .. }));
    }

    #[test]
    fn test_no_attachments_leaves_question() {
        assert_eq!(compose_question("q", &[]), "q");
    }
}
