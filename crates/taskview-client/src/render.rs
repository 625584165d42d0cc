//! Renderer that reports each view through `tracing`.

use std::collections::BTreeMap;

use taskview_core::{RenderFrame, Renderer, View};
use tracing::{error, info};

/// Logs a one-line summary per render and keeps the last summary around.
///
/// There is no real layout behind it, so scroll offsets are simply stored and
/// every restore succeeds.
#[derive(Debug, Default)]
pub struct LogRenderer {
    renders: usize,
    last_summary: Option<String>,
    offsets: BTreeMap<String, f64>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn last_summary(&self) -> Option<&str> {
        self.last_summary.as_deref()
    }

    fn summarize(frame: &RenderFrame<'_>) -> String {
        let project = frame
            .project
            .map(|project| project.project_name.as_str())
            .unwrap_or("?");

        match frame.state.view {
            View::Tasks => {
                let mut summary = format!(
                    "{} [{}]: {} task(s) visible",
                    project, frame.current_tag, frame.visible_count
                );
                if frame.state.filters.is_active() {
                    summary.push_str(" (filtered)");
                }
                if let Some(task) = frame.selected_task {
                    summary.push_str(&format!(
                        ", selected {} \"{}\" ({})",
                        task.id, task.title, task.status
                    ));
                }
                summary
            }
            View::Documents => {
                let mut summary = format!("{}: {} document(s)", project, frame.documents.len());
                if let Some(document) = frame.document {
                    summary.push_str(&format!(
                        ", open {} ({} bytes)",
                        document.filename,
                        document.content.len()
                    ));
                }
                summary
            }
        }
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &RenderFrame<'_>) {
        self.renders += 1;
        let summary = Self::summarize(frame);
        info!("{}", summary);
        self.last_summary = Some(summary);
    }

    fn render_error(&mut self, message: &str) {
        error!("{}", message);
        self.last_summary = Some(message.to_string());
    }

    fn scroll_offsets(&self) -> BTreeMap<String, f64> {
        self.offsets.clone()
    }

    fn restore_scroll(&mut self, view: &str, offset: f64) -> bool {
        self.offsets.insert(view.to_string(), offset);
        true
    }
}
