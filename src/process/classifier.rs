//! First-chunk readiness policy
//!
//! Neither gaiad nor gaiacli expose a readiness protocol. The only signal is
//! the text they print, so the harness looks at the first chunk a child
//! writes to stdout and decides once. Anything printed later is never
//! reconsidered: a child that flushes a banner before its real status line
//! will be classified on the banner.

/// Classification of a child's first stdout chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessSignal {
    /// The process is up; carries the chunk text
    Ready(String),
    /// A failure marker was found; carries the chunk text
    Failed(String),
    /// Neither ready nor failed; the outcome is decided by the exit status
    Pending(String),
}

/// Named readiness policy applied to the first stdout chunk
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirstChunkClassifier {
    failure_markers: Vec<String>,
    required_prefix: Option<String>,
}

impl FirstChunkClassifier {
    /// Ready unless the chunk contains one of `markers`
    pub fn with_markers<S: AsRef<str>>(markers: &[S]) -> Self {
        Self {
            failure_markers: markers.iter().map(|m| m.as_ref().to_string()).collect(),
            required_prefix: None,
        }
    }

    /// Ready only when the chunk opens a JSON object
    pub fn json_object() -> Self {
        Self {
            failure_markers: Vec::new(),
            required_prefix: Some("{".to_string()),
        }
    }

    pub fn failure_markers(&self) -> &[String] {
        &self.failure_markers
    }

    pub fn classify(&self, chunk: &str) -> ReadinessSignal {
        if self.failure_markers.iter().any(|m| chunk.contains(m.as_str())) {
            return ReadinessSignal::Failed(chunk.to_string());
        }
        match &self.required_prefix {
            Some(prefix) if !chunk.starts_with(prefix.as_str()) => {
                ReadinessSignal::Pending(chunk.to_string())
            }
            _ => ReadinessSignal::Ready(chunk.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> FirstChunkClassifier {
        FirstChunkClassifier::with_markers(&["Failed", "Error"])
    }

    #[test]
    fn test_clean_chunk_is_ready() {
        assert_eq!(
            markers().classify("{\"ok\":true}"),
            ReadinessSignal::Ready("{\"ok\":true}".to_string())
        );
        assert_eq!(
            markers().classify("I[01-01|00:00:00.000] Starting ABCI"),
            ReadinessSignal::Ready("I[01-01|00:00:00.000] Starting ABCI".to_string())
        );
    }

    #[test]
    fn test_markers_anywhere_in_chunk() {
        assert!(matches!(
            markers().classify("Error: bad state"),
            ReadinessSignal::Failed(_)
        ));
        assert!(matches!(
            markers().classify("init: Failed to write genesis"),
            ReadinessSignal::Failed(_)
        ));
        // matching is case sensitive
        assert!(matches!(
            markers().classify("no error here"),
            ReadinessSignal::Ready(_)
        ));
    }

    #[test]
    fn test_json_object_requires_brace() {
        let classifier = FirstChunkClassifier::json_object();
        assert!(matches!(
            classifier.classify("{\"name\":\"testkey\"}"),
            ReadinessSignal::Ready(_)
        ));
        assert_eq!(
            classifier.classify("Enter a passphrase:"),
            ReadinessSignal::Pending("Enter a passphrase:".to_string())
        );
        // leading whitespace is not skipped
        assert!(matches!(
            classifier.classify(" {}"),
            ReadinessSignal::Pending(_)
        ));
    }
}
