use std::io::{self, Write};

use colored::Colorize;
use tracing::debug;

use crate::{Finding, LineEvent, LineRecord, LineSink, StreamKind};

/// Styles one event for the terminal. Styling never touches captured bytes.
pub fn styled_line(event: &LineEvent) -> String {
    match (&event.record, event.stream) {
        (LineRecord::Output(text), StreamKind::Primary) => text.clone(),
        (LineRecord::Output(text), StreamKind::Secondary) => text.red().to_string(),
        (LineRecord::Diagnostic(text), _) => text.bright_yellow().to_string(),
    }
}

/// Line sink that writes every event as one line to `out` (stdout by default).
pub struct ConsoleSink<W = io::Stdout> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send + 'static> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send + 'static> LineSink for ConsoleSink<W> {
    fn emit(&mut self, event: LineEvent) {
        let line = styled_line(&event);
        if let Err(err) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            debug!(error = %err, "console write failed");
        }
    }
}

pub fn report_status<W: Write>(out: &mut W, exit_code: i32) -> io::Result<()> {
    let label = if exit_code == 0 {
        "(success)".bright_green()
    } else {
        "(failed)".bright_red()
    };
    writeln!(
        out,
        "{}{}",
        format!("==> Plugin exited with status: {exit_code} ").bright_cyan(),
        label
    )
}

pub fn report_findings<W: Write>(out: &mut W, findings: &[Finding]) -> io::Result<()> {
    for finding in findings {
        writeln!(
            out,
            "{}{}",
            "--> Error: ".bright_red(),
            finding.to_string().bright_yellow()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn status_line_labels_success_and_failure() {
        plain();
        let mut out = Vec::new();
        report_status(&mut out, 0).unwrap();
        report_status(&mut out, 2).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "==> Plugin exited with status: 0 (success)\n==> Plugin exited with status: 2 (failed)\n"
        );
    }

    #[test]
    fn each_finding_is_its_own_line() {
        plain();
        let mut out = Vec::new();
        report_findings(
            &mut out,
            &[
                Finding::document("missing required property 'errors'"),
                Finding::new("/truncated", "value must be false"),
            ],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--> Error: at '': missing required property 'errors'\n\
             --> Error: at '/truncated': value must be false\n"
        );
    }

    #[test]
    fn primary_output_is_printed_verbatim() {
        plain();
        let event = LineEvent {
            stream: StreamKind::Primary,
            record: LineRecord::Output("{\"success\": true}".to_string()),
        };
        assert_eq!(styled_line(&event), "{\"success\": true}");
    }
}
