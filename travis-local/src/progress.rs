//! Image build progress
//!
//! Understands both builder output formats:
//!
//! - classic: `Step 3/11 : WORKDIR /build`
//! - BuildKit: `#7 [3/11] WORKDIR /build`

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::sync::LazyLock;

static CLASSIC_STEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Step\s+(\d+)/(\d+)\s*:").expect("step pattern is valid"));

static BUILDKIT_STEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\d+\s+\[(?:[^\]\s]+\s+)?(\d+)/(\d+)\]").expect("step pattern is valid"));

/// Longest directive shown next to the bar
const MESSAGE_WIDTH: usize = 60;

/// Position reported by one builder line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepUpdate {
    /// 1-based step number
    pub step: u64,
    /// Number of steps
    pub total: u64,
}

/// Step position of a build output line, if it reports one
pub fn parse_step(line: &str) -> Option<StepUpdate> {
    let captures = CLASSIC_STEP
        .captures(line)
        .or_else(|| BUILDKIT_STEP.captures(line.trim_start()))?;
    Some(StepUpdate {
        step: captures[1].parse().ok()?,
        total: captures[2].parse().ok()?,
    })
}

/// Progress bar fed with builder output
#[derive(Debug)]
pub struct BuildProgress {
    bar: ProgressBar,
    directives: Vec<String>,
}

impl BuildProgress {
    /// Bar over `directives`; hidden unless `visible`
    pub fn new(directives: Vec<String>, visible: bool) -> Self {
        let length = directives.len() as u64;
        let bar = if visible {
            ProgressBar::new(length)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_length(length);
        Self { bar, directives }
    }

    /// Feed one output line
    pub fn observe(&self, line: &str) {
        let Some(update) = parse_step(line) else {
            return;
        };
        if self.bar.length() != Some(update.total) {
            self.bar.set_length(update.total);
        }
        self.bar.set_position(update.step);

        let index = usize::try_from(update.step.saturating_sub(1)).unwrap_or(usize::MAX);
        if let Some(directive) = self.directives.get(index) {
            self.bar.set_message(directive.chars().take(MESSAGE_WIDTH).collect::<String>());
        }
    }

    /// Current step
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Build succeeded
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Build failed; leave the bar where it stopped
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
