#![forbid(unsafe_code)]

pub mod graph;

pub mod cancel {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Cooperative cancellation flag for long reads. Clones share one flag.
    #[derive(Clone, Debug, Default)]
    pub struct CancelToken {
        flag: Arc<AtomicBool>,
    }

    impl CancelToken {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn cancel(&self) {
            self.flag.store(true, Ordering::Release);
        }

        pub fn is_cancelled(&self) -> bool {
            self.flag.load(Ordering::Acquire)
        }
    }

}

pub mod naming {
    /// Display name for an entity row: explicit `name`, then `title`, then the logical id.
    pub fn display_name(fields: &serde_json::Map<String, serde_json::Value>, logical_id: &str) -> String {
        for key in ["name", "title"] {
            if let Some(value) = fields.get(key).and_then(|v| v.as_str()) {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
        logical_id.to_string()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn display_name_prefers_name_then_title() {
            let mut fields = serde_json::Map::new();
            assert_eq!(display_name(&fields, "scene-1"), "scene-1");
            fields.insert("title".to_string(), json!("Opening"));
            assert_eq!(display_name(&fields, "scene-1"), "Opening");
            fields.insert("name".to_string(), json!("  "));
            assert_eq!(display_name(&fields, "scene-1"), "Opening");
            fields.insert("name".to_string(), json!("The Gate"));
            assert_eq!(display_name(&fields, "scene-1"), "The Gate");
        }
    }
}
