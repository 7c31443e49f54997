use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

/// Describes how a single recipient handle (the local-part of the `to` address) should be
/// processed once it passes the rest of the ingress pipeline.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HandleConfig {
    /// Human-readable name of the handler this handle routes to (e.g. `ask`, `summarise`).
    pub handler: String,
    /// Whether attachments are accepted for this handle at all.
    pub accepts_attachments: bool,
}

/// Configuration for the `/process-email` ingress pipeline.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IngressConfig {
    /// Shared secret expected in the `x-api-key` header.
    pub api_key: String,
    /// Directory attachments are persisted to, keyed by the generated email id.
    pub attachments_path: PathBuf,
    /// Per-file attachment size cap, in bytes.
    pub max_attachment_size: u64,
    /// Maximum number of attachments accepted per request.
    pub max_attachments_count: usize,
    /// Static alias table resolving the recipient local-part to a handler configuration.
    pub handles: HashMap<String, HandleConfig>,
    /// The handle new scheduled re-executions are redirected to regardless of the original alias.
    pub generic_ask_handle: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        // Every alias this system recognizes, collapsed onto the handful of canonical handler
        // names. Scheduled re-executions are always redirected to `generic_ask_handle`
        // regardless of which alias a task was originally created under.
        let aliases: &[(&str, &str, bool)] = &[
            ("ask", "ask", true),
            ("summarise", "summarise", true),
            ("summarize", "summarise", true),
            ("summary", "summarise", true),
            ("research", "research", true),
            ("deep-research", "research", true),
            ("simplify", "simplify", true),
            ("eli5", "simplify", true),
            ("explain", "simplify", true),
            ("schedule", "schedule", false),
        ];
        let handles = aliases
            .iter()
            .map(|(alias, handler, accepts_attachments)| {
                (
                    alias.to_string(),
                    HandleConfig {
                        handler: handler.to_string(),
                        accepts_attachments: *accepts_attachments,
                    },
                )
            })
            .collect();

        Self {
            api_key: String::new(),
            attachments_path: PathBuf::from("./attachments"),
            max_attachment_size: 10 * 1024 * 1024,
            max_attachments_count: 10,
            handles,
            generic_ask_handle: "ask".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IngressConfig;

    #[test]
    fn default_handles_include_ask() {
        let config = IngressConfig::default();
        assert!(config.handles.contains_key("ask"));
        assert_eq!(config.generic_ask_handle, "ask");
    }
}
