//! Per-wallet report lines, flushed as one summary when a wallet is done.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{QueueError, Store};

/// Accumulated outcome lines for one wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub texts: Vec<String>,
    /// `[successes, attempts]`.
    pub tally: [u32; 2],
}

impl ReportEntry {
    fn push(&mut self, text: &str, success: Option<bool>) {
        match success {
            Some(true) => {
                self.texts.push(format!("✅ {}", text));
                self.tally[0] += 1;
                self.tally[1] += 1;
            }
            Some(false) => {
                self.texts.push(format!("❌ {}", text));
                self.tally[1] += 1;
            }
            None => self.texts.push(text.to_string()),
        }
    }

    fn render(&self) -> String {
        let mut body = self.texts.join("\n");
        if self.tally[1] > 0 {
            body.push_str(&format!(
                "\n\nSuccess rate {}/{}",
                self.tally[0], self.tally[1]
            ));
        }
        body
    }
}

/// Destination for finished wallet summaries.
///
/// Delivery failures are the implementation's concern; they never reach the run.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, text: String);
}

impl Store {
    /// Add a line to a wallet's report. `Some(_)` counts as an attempt.
    pub async fn append_report(
        &self,
        encrypted_key: &str,
        text: &str,
        success: Option<bool>,
    ) -> Result<(), QueueError> {
        let _guard = self.lock().await;
        let mut doc = self.read_reports().await?;
        doc.entry(encrypted_key.to_string())
            .or_default()
            .push(text, success);
        self.write_reports(&doc).await
    }

    /// Remove a wallet's report and render it as a summary message.
    pub async fn drain_report(
        &self,
        encrypted_key: &str,
        address: &str,
        done: usize,
        total: usize,
    ) -> Result<String, QueueError> {
        let _guard = self.lock().await;
        let mut doc = self.read_reports().await?;

        let body = match doc.remove(encrypted_key) {
            Some(entry) => {
                self.write_reports(&doc).await?;
                entry.render()
            }
            None => "No actions".to_string(),
        };

        Ok(format!("[{}/{}] <b>{}</b>\n\n{}", done, total, address, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreOptions;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), StoreOptions::default()).await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_push_counts_attempts() {
        let mut entry = ReportEntry::default();
        entry.push("swap 0.001 ETH -> USDC", Some(true));
        entry.push("bridge failed", Some(false));
        entry.push("register without ref code", None);

        assert_eq!(entry.tally, [1, 2]);
        assert_eq!(
            entry.texts,
            vec![
                "✅ swap 0.001 ETH -> USDC",
                "❌ bridge failed",
                "register without ref code"
            ]
        );
    }

    #[test]
    fn test_tally_serializes_as_pair() {
        let entry = ReportEntry {
            texts: vec!["x".into()],
            tally: [2, 3],
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"texts": ["x"], "tally": [2, 3]}));
    }

    #[tokio::test]
    async fn test_drain_report_format() {
        let (_dir, store) = store().await;
        store.append_report("k", "swapped", Some(true)).await.unwrap();
        store.append_report("k", "reverted", Some(false)).await.unwrap();

        let text = store.drain_report("k", "0xAbC", 3, 5).await.unwrap();
        assert_eq!(
            text,
            "[3/5] <b>0xAbC</b>\n\n✅ swapped\n❌ reverted\n\nSuccess rate 1/2"
        );
        assert!(store.read_reports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_report_neutral_only_has_no_rate() {
        let (_dir, store) = store().await;
        store.append_report("k", "points 10", None).await.unwrap();

        let text = store.drain_report("k", "0xAbC", 1, 1).await.unwrap();
        assert_eq!(text, "[1/1] <b>0xAbC</b>\n\npoints 10");
    }

    #[tokio::test]
    async fn test_drain_missing_report() {
        let (_dir, store) = store().await;
        let text = store.drain_report("k", "0xAbC", 0, 2).await.unwrap();
        assert_eq!(text, "[0/2] <b>0xAbC</b>\n\nNo actions");
    }
}
