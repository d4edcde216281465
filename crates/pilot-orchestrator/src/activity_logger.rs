//! Activity Logger - human-readable run log in `activity.md`
//!
//! Records run start, each completed cycle with the operations it executed
//! and the completion verdict, notes from the state machine, and the final
//! summary. Every write is fail-open: a broken log never stops a run.

use chrono::Utc;
use pilot_agent::Verdict;
use pilot_core::{fail_open, HistoryRecord};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Maximum characters of an operation result shown in the log
const RESULT_PREVIEW_CHARS: usize = 300;

pub struct ActivityLogger {
    dir: PathBuf,
    output_path: PathBuf,
}

impl ActivityLogger {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            output_path: dir.join("activity.md"),
            dir,
        }
    }

    /// Start a fresh log for a run, replacing the previous one
    pub async fn log_run_start(&self, run_id: &Uuid, task: &str, max_iterations: usize) {
        fail_open("activity_logger::log_run_start", || async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

            let content = format!(
                "# Pilot Activity Log\n\n## Task: {}\n**Run**: {}\n**Started**: {}\n**Max Iterations**: {}\n\n---\n\n",
                task.lines().next().unwrap_or(task),
                run_id,
                timestamp,
                max_iterations
            );

            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.output_path)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            Ok(())
        })
        .await;
    }

    /// Log one completed cycle
    ///
    /// `records` are the history entries added during the cycle; failures that
    /// led to a re-plan show up here next to the final success.
    pub async fn log_iteration_complete(
        &self,
        iteration: usize,
        max: usize,
        records: &[HistoryRecord],
        verdict: &Verdict,
    ) {
        fail_open("activity_logger::log_iteration_complete", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let mut content = format!("### Iteration {}/{}\n**Time**: {}\n\n", iteration, max, timestamp);

            if !records.is_empty() {
                content.push_str("**Operations**:\n");
                for record in records {
                    let status = if record.result.is_error() { "✗" } else { "✓" };
                    content.push_str(&format!(
                        "- {} `{}` {}: {}\n",
                        status,
                        record.operation.action,
                        serde_json::Value::Object(record.operation.params.clone()),
                        preview(&record.result.describe())
                    ));
                }
                content.push('\n');
            }

            let verdict_text = match verdict {
                Verdict::Complete { answer } => format!("complete ({})", preview(answer.trim())),
                Verdict::Incomplete => "not complete".to_string(),
                Verdict::Undetermined => "undetermined".to_string(),
            };
            content.push_str(&format!("**Verdict**: {}\n\n---\n\n", verdict_text));

            self.append_internal(&content).await
        })
        .await;
    }

    /// Log a free-form note
    pub async fn log_note(&self, message: &str) {
        fail_open("activity_logger::log_note", || async {
            self.append_internal(&format!("> {}\n\n", message)).await
        })
        .await;
    }

    /// Log the run summary
    pub async fn log_run_complete(
        &self,
        total_iterations: usize,
        success: bool,
        stop_reason: &str,
        summary: &str,
    ) {
        fail_open("activity_logger::log_run_complete", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let success_icon = if success { "✓" } else { "✗" };

            let content = format!(
                "## Run Summary\n\n\
                **Completed**: {}\n\
                **Total Iterations**: {}\n\
                **Success**: {}\n\
                **Stop Reason**: {}\n\n\
                {}\n",
                timestamp, total_iterations, success_icon, stop_reason, summary
            );

            self.append_internal(&content).await
        })
        .await;
    }

    async fn append_internal(&self, content: &str) -> pilot_core::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn preview(text: &str) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() > RESULT_PREVIEW_CHARS {
        let truncated: String = single_line.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        single_line
    }
}
