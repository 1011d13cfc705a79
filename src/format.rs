//! Text rendering of test results.
//!
//! The summary is three bordered blocks (header, per-spec rows, totals) that
//! share column widths, so the totals stay visually separate while lining
//! up with the rows above.

use unicode_width::UnicodeWidthStr;

use crate::results::TestResults;

const PASS_GLYPH: &str = "✔";
const FAIL_GLYPH: &str = "✖";

/// Spaces added to every column's content width.
pub const COLUMN_PADDING: usize = 2;

/// Formats milliseconds as `mm:ss.SSS`.
///
/// Minutes are not wrapped into hours, so an hour renders as `60:00.000`.
pub fn format_duration(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
}

/// Failure percentage rounded to the nearest integer, 0 without tests.
pub fn failure_percentage(total_failed: u64, total_tests: u64) -> u64 {
    if total_tests == 0 {
        return 0;
    }
    (total_failed as f64 / total_tests as f64 * 100.0).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders [`TestResults`] as a fixed-width summary table.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultFormatter;

impl ResultFormatter {
    /// Creates a formatter.
    pub fn new() -> Self {
        Self
    }

    /// Renders the header, data and footer blocks joined by newlines.
    pub fn format(&self, results: &TestResults) -> String {
        let show_skipped = results.runs.iter().any(|run| run.skip_count > 0);

        let mut header: Vec<String> = ["", "Spec", "", "Tests", "Passing", "Failing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if show_skipped {
            header.push("Skipped".to_string());
        }

        let rows: Vec<Vec<String>> = results
            .runs
            .iter()
            .map(|run| {
                let glyph = if run.fail_count > 0 { FAIL_GLYPH } else { PASS_GLYPH };
                let mut row = vec![
                    glyph.to_string(),
                    run.spec_name.clone(),
                    format_duration(run.wall_clock_duration_ms),
                    run.test_count.to_string(),
                    run.pass_count.to_string(),
                    run.fail_count.to_string(),
                ];
                if show_skipped {
                    row.push(run.skip_count.to_string());
                }
                row
            })
            .collect();

        let footer = {
            let (glyph, summary) = if results.total_failed == 0 {
                (PASS_GLYPH, "All specs passed!".to_string())
            } else {
                (
                    FAIL_GLYPH,
                    format!(
                        "{} of {} failed ({}%)",
                        results.total_failed,
                        results.total_tests,
                        failure_percentage(results.total_failed, results.total_tests)
                    ),
                )
            };
            let mut row = vec![
                glyph.to_string(),
                summary,
                format_duration(results.total_duration),
                results.total_tests.to_string(),
                results.total_passed.to_string(),
                results.total_failed.to_string(),
            ];
            if show_skipped {
                row.push(results.total_skipped.to_string());
            }
            row
        };

        let widths = column_widths(&header, &rows, &footer);
        let aligns: Vec<Align> = (0..header.len())
            .map(|i| if i == 1 { Align::Left } else { Align::Right })
            .collect();

        let blocks = [
            render_block(std::slice::from_ref(&header), &widths, &aligns),
            render_block(&rows, &widths, &aligns),
            render_block(std::slice::from_ref(&footer), &widths, &aligns),
        ];
        blocks.join("\n")
    }
}

fn column_widths(header: &[String], rows: &[Vec<String>], footer: &[String]) -> Vec<usize> {
    let mut widths: Vec<usize> = header.iter().map(|cell| cell.width()).collect();
    for row in rows.iter().map(Vec::as_slice).chain(std::iter::once(footer)) {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }
    widths.iter().map(|w| w + COLUMN_PADDING).collect()
}

fn render_block(rows: &[Vec<String>], widths: &[usize], aligns: &[Align]) -> String {
    let inner: usize = widths.iter().sum();
    let mut lines = Vec::with_capacity(rows.len() + 2);

    lines.push(format!("┌{}┐", "─".repeat(inner)));
    for row in rows {
        let mut line = String::from("│");
        for ((cell, width), align) in row.iter().zip(widths).zip(aligns) {
            line.push_str(&pad_cell(cell, *width, *align));
        }
        line.push('│');
        lines.push(line);
    }
    lines.push(format!("└{}┘", "─".repeat(inner)));

    lines.join("\n")
}

fn pad_cell(content: &str, width: usize, align: Align) -> String {
    // One space of the padding goes on each side; the rest fills toward the
    // alignment edge.
    let fill = width.saturating_sub(content.width() + COLUMN_PADDING);
    match align {
        Align::Left => format!(" {}{} ", content, " ".repeat(fill)),
        Align::Right => format!(" {}{} ", " ".repeat(fill), content),
    }
}
