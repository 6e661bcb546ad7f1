use crate::{RawErrorEvent, StackFrame, TraceError};

/// Computes the ordered frame list for a raw event.
///
/// Implementations are synchronous and must not block on I/O; the normalizer
/// calls them on the capture path.
pub trait TraceComputer: Send + Sync {
    fn compute(&self, raw: &RawErrorEvent) -> Result<Vec<StackFrame>, TraceError>;
}

/// Parses the textual stack carried in [`RawErrorEvent::stack`].
///
/// Understands the std `Backtrace` display layout:
///
/// ```text
///    0: app::worker::run
///              at ./src/worker.rs:42:9
/// ```
///
/// as well as single-line `function@file:line:col` and `at function (file:line:col)`
/// frames. Lines that match none of these (headers such as `Error: boom`) are skipped.
/// Frames keep the order of the text; std backtraces list the innermost call first.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextTraceComputer {
    max_frames: Option<usize>,
}

impl TextTraceComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the first `max` frames of very deep traces.
    pub fn max_frames(mut self, max: usize) -> Self {
        self.max_frames = Some(max);
        self
    }

    pub fn parse(&self, text: &str) -> Result<Vec<StackFrame>, TraceError> {
        let mut frames: Vec<StackFrame> = Vec::new();
        let mut saw_content = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            saw_content = true;

            if let Some(name) = numbered_frame(line) {
                frames.push(StackFrame::new(name));
            } else if let Some(rest) = line.strip_prefix("at ") {
                match frames.last_mut() {
                    // Location line of a numbered frame.
                    Some(last) if last.file_name.is_none() && !rest.ends_with(')') => {
                        apply_location(last, rest);
                    }
                    _ => frames.push(parenthesized_frame(rest)),
                }
            } else if let Some((name, location)) = line
                .rsplit_once('@')
                .filter(|(_, location)| has_line_suffix(location))
            {
                let mut frame = StackFrame::default();
                if !name.is_empty() {
                    frame.function_name = Some(name.to_string());
                }
                apply_location(&mut frame, location);
                frames.push(frame);
            }

            if let Some(max) = self.max_frames {
                if frames.len() > max {
                    frames.truncate(max);
                    break;
                }
            }
        }

        if saw_content && frames.is_empty() {
            return Err(TraceError::Unparseable {
                reason: format!(
                    "no frames recognized in {} line(s) of stack text",
                    text.lines().count()
                ),
            });
        }
        Ok(frames)
    }
}

impl TraceComputer for TextTraceComputer {
    fn compute(&self, raw: &RawErrorEvent) -> Result<Vec<StackFrame>, TraceError> {
        match raw.stack.as_deref() {
            Some(text) => self.parse(text),
            None => Ok(Vec::new()),
        }
    }
}

fn numbered_frame(line: &str) -> Option<&str> {
    let (index, name) = line.split_once(':')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

fn parenthesized_frame(rest: &str) -> StackFrame {
    let mut frame = StackFrame::default();
    match rest.strip_suffix(')').and_then(|r| r.rsplit_once(" (")) {
        Some((name, location)) => {
            frame.function_name = Some(name.to_string());
            apply_location(&mut frame, location);
        }
        None => apply_location(&mut frame, rest),
    }
    frame
}

fn apply_location(frame: &mut StackFrame, location: &str) {
    let location = location.trim();
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next();
    let middle = parts.next();
    let head = parts.next();

    match (head, middle, last) {
        (Some(file), Some(line), Some(col)) if is_number(line) && is_number(col) => {
            frame.file_name = Some(file.to_string());
            frame.line_number = line.parse().ok();
            frame.column_number = col.parse().ok();
        }
        (_, Some(_), Some(line)) if is_number(line) => {
            let file = location.rsplit_once(':').map_or(location, |(file, _)| file);
            frame.file_name = Some(file.to_string());
            frame.line_number = line.parse().ok();
        }
        _ => frame.file_name = Some(location.to_string()),
    }
}

/// `true` for `file:line` and `file:line:col`.
fn has_line_suffix(location: &str) -> bool {
    location
        .trim()
        .rsplit_once(':')
        .is_some_and(|(file, line)| !file.is_empty() && is_number(line))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
