//! Line-count based progress estimation.
//!
//! The engine gives no structured completion signal, so progress is estimated by
//! counting output lines against calibrated per-operation baselines. One
//! [`ProgressContext`] lives for a whole command and accumulates completed lines
//! across its sub-steps, which keeps the percentage non-decreasing even when a
//! step produces more or fewer lines than estimated.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// Operations with calibrated output baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init,
    Deploy,
    Destroy,
    Start,
    Stop,
    Other,
}

impl Operation {
    /// `(base lines, additional lines per extra node)`.
    fn calibration(&self) -> (u64, u64) {
        match self {
            Operation::Init => (26, 0),
            Operation::Deploy => (994, 306),
            Operation::Destroy => (808, 327),
            Operation::Start | Operation::Stop => (100, 50),
            Operation::Other => (100, 0),
        }
    }
}

impl FromStr for Operation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "init" => Operation::Init,
            "deploy" => Operation::Deploy,
            "destroy" => Operation::Destroy,
            "start" => Operation::Start,
            "stop" => Operation::Stop,
            _ => Operation::Other,
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Init => "init",
            Operation::Deploy => "deploy",
            Operation::Destroy => "destroy",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Other => "other",
        };
        f.write_str(name)
    }
}

/// Expected number of output lines of `operation` on a cluster of `node_count` nodes.
pub fn estimate_total(operation: Operation, node_count: u32) -> u64 {
    let (base, per_node) = operation.calibration();
    base + per_node * u64::from(node_count.max(1) - 1)
}

/// Cumulative progress of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct ProgressContext {
    total: u64,
    completed: u64,
}

impl ProgressContext {
    pub fn new(total: u64) -> Self {
        let mut ctx = Self::default();
        ctx.init_cumulative(total);
        ctx
    }

    /// Resets completed lines and sets the denominator for the whole command.
    pub fn init_cumulative(&mut self, total: u64) {
        self.total = total;
        self.completed = 0;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Lines attributed to finished steps.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn percent(&self) -> u8 {
        percent_of(self.completed, self.total)
    }

    /// Starts tracking one sub-step expected to print `estimated_lines` lines.
    pub fn begin_step(&mut self, estimated_lines: u64) -> StepProgress<'_> {
        StepProgress {
            ctx: self,
            estimated: estimated_lines,
            seen: 0,
            finished: false,
        }
    }

    /// Copies `reader` to `writer` line by line, prefixing each line with the
    /// running percentage. Lines are flushed as they arrive.
    ///
    /// Returns the number of lines seen.
    pub fn stream_with_progress<R: BufRead, W: Write>(
        &mut self,
        estimated_lines: u64,
        reader: R,
        writer: &mut W,
    ) -> io::Result<u64> {
        let mut step = self.begin_step(estimated_lines);
        for line in reader.lines() {
            let line = line?;
            writeln!(writer, "{}", step.prefix(&line))?;
            writer.flush()?;
        }
        Ok(step.finish())
    }
}

/// One sub-step of a [`ProgressContext`].
///
/// Finishing the step advances the context by the lines actually seen. A step
/// dropped without finishing (the stream failed) advances by its estimate, or
/// by the lines seen if that is larger.
pub struct StepProgress<'a> {
    ctx: &'a mut ProgressContext,
    estimated: u64,
    seen: u64,
    finished: bool,
}

impl StepProgress<'_> {
    /// Counts one line and returns it with its `NNN% | ` prefix.
    pub fn prefix(&mut self, line: &str) -> String {
        self.seen += 1;
        format!("{:>3}% | {}", self.percent(), line)
    }

    pub fn percent(&self) -> u8 {
        percent_of(self.ctx.completed + self.seen, self.ctx.total)
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Marks the step complete and returns the observed line count.
    pub fn finish(mut self) -> u64 {
        self.finished = true;
        self.seen
    }
}

impl Drop for StepProgress<'_> {
    fn drop(&mut self) {
        let advance = if self.finished {
            self.seen
        } else {
            self.seen.max(self.estimated)
        };
        self.ctx.completed += advance;
    }
}

fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}
