use serde::{Deserialize, Serialize};

use crate::types::{Document, SourceType};

pub const DEFAULT_MAX_COMMENTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    pub author: Option<String>,
    pub body: String,
}

/// An issue and the head of its discussion, as fetched from a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueThread {
    /// `owner/name`.
    pub repository: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: String,
    pub author: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub comments: Vec<IssueComment>,
    pub url: String,
}

impl IssueThread {
    pub fn document_id(&self) -> String {
        format!("github:{}#{}", self.repository, self.number)
    }

    /// Title as H1, metadata lines, then `## Description` and `## Comments`
    /// sections so the chunker keeps the discussion apart from the report.
    pub fn to_markdown(&self, max_comments: usize) -> String {
        let mut parts = vec![format!("# {}", self.title)];
        if !self.labels.is_empty() {
            parts.push(format!("**Labels:** {}", self.labels.join(", ")));
        }
        parts.push(format!("**State:** {}", self.state));
        parts.push(format!("**Author:** @{}", self.author.as_deref().unwrap_or("unknown")));

        let body = self.body.as_deref().unwrap_or_default().trim();
        if !body.is_empty() {
            parts.push(format!("## Description\n\n{body}"));
        }

        let comments: Vec<String> = self
            .comments
            .iter()
            .take(max_comments)
            .filter(|c| !c.body.trim().is_empty())
            .map(|c| format!("**Comment by @{}:**\n{}", c.author.as_deref().unwrap_or("unknown"), c.body.trim()))
            .collect();
        if !comments.is_empty() {
            parts.push(format!("## Comments\n\n{}", comments.join("\n\n---\n\n")));
        }
        parts.join("\n\n")
    }

    pub fn into_document(self, project: impl Into<String>, max_comments: usize) -> Document {
        let content = self.to_markdown(max_comments);
        Document::new(self.document_id(), SourceType::Issues, project, self.url, self.title, content)
    }
}
