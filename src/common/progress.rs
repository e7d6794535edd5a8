use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::install::{Phase, ProgressEvent, RunSummary};
use crate::ui::prelude::*;
use crate::ui::{color_enabled, is_debug_enabled};

pub fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠁⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠙⠚");
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn create_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{bar:40.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ");
    pb.set_style(style);
    pb
}

/// Presents orchestrator events: a 0–100 bar plus one line per finished item
/// in text mode, one `install.progress` object per event in JSON mode.
///
/// Also folds the stream into a [`RunSummary`].
pub struct ProgressRenderer {
    bar: Option<ProgressBar>,
    summary: RunSummary,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        // Child output is passed through in debug mode and would tear the bar
        let bar = match get_output_format() {
            OutputFormat::Text if !is_debug_enabled() => Some(create_bar()),
            _ => None,
        };
        Self {
            bar,
            summary: RunSummary::default(),
        }
    }

    pub fn handle(&mut self, event: &ProgressEvent) {
        self.summary.record(event);

        if get_output_format() == OutputFormat::Json {
            emit(
                Level::Info,
                "install.progress",
                &format!("{} {}", event.status(), event.current_item),
                serde_json::to_value(event).ok(),
            );
            return;
        }

        if event.is_item_terminal() {
            self.print_line(&item_line(event));
        } else if event.phase == Phase::Cancelled {
            self.print_line(&format!("{} {}", icon(NerdFont::Stop), event.current_item));
        }

        match &self.bar {
            Some(bar) => {
                bar.set_position(event.percent.round() as u64);
                bar.set_message(format!("{} {}", event.status(), event.current_item));
            }
            None if !event.is_item_terminal() && event.phase != Phase::Cancelled => {
                let glyph = match event.phase {
                    Phase::Downloading => icon(NerdFont::Download),
                    _ => icon(NerdFont::Gear),
                };
                emit(
                    Level::Debug,
                    "install.progress",
                    &format!(
                        "{glyph} {:>3.0}% {} {}",
                        event.percent,
                        event.status(),
                        event.current_item
                    ),
                    None,
                );
            }
            None => {}
        }
    }

    pub fn finish(self) -> RunSummary {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
        self.summary
    }

    fn print_line(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn item_line(event: &ProgressEvent) -> String {
    let (glyph, text) = match event.phase {
        Phase::Completed => (icon(NerdFont::Check), event.current_item.normal()),
        _ => (icon(NerdFont::Cross), event.current_item.red()),
    };
    if color_enabled() {
        format!("{glyph} {text}")
    } else {
        format!("{glyph} {}", event.current_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn item(phase: Phase, label: &str, index: usize) -> ProgressEvent {
        ProgressEvent::new(50.0, phase, label, 2).for_item(index)
    }

    #[test]
    #[serial]
    fn item_lines_without_color_use_ascii_icons() {
        crate::ui::init(OutputFormat::Text, false);
        assert_eq!(item_line(&item(Phase::Completed, "Firefox", 0)), "[ok] Firefox");
        assert_eq!(
            item_line(&item(Phase::Failed, "7zip - Installer failed", 1)),
            "[x] 7zip - Installer failed"
        );
        crate::ui::init(OutputFormat::Text, true);
    }

    #[test]
    #[serial]
    fn renderer_folds_summary() {
        crate::ui::init(OutputFormat::Json, false);
        let mut renderer = ProgressRenderer::new();
        renderer.handle(&ProgressEvent::new(0.0, Phase::Connecting, "a", 2).for_item(0));
        renderer.handle(&item(Phase::Completed, "a", 0));
        renderer.handle(&item(Phase::Error, "b - disk full", 1));
        renderer.handle(&ProgressEvent::new(100.0, Phase::Completed, "All installations completed", 0));
        let summary = renderer.finish();
        crate::ui::init(OutputFormat::Text, true);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.cancelled);
    }
}
