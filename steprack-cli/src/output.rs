// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Plain-text rendering: aligned tables, a one-line motion readout and a
//! progress bar for long operations.

use std::io::Write as _;
use steprack_protocol::State;

/// Print rows as an aligned table with a header and a separator line.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }
    let line = |cells: Vec<&str>| {
        let rendered: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", rendered.join("  ").trim_end());
    };
    line(headers.to_vec());
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("--")
    );
    for row in rows {
        line(row.iter().map(String::as_str).collect());
    }
}

/// Single-line, carriage-return refreshed readout of a motion in
/// progress: one `name [start => target] current` cell per axis.
pub struct MotionReadout {
    names: Vec<String>,
    start: Vec<i64>,
    target: Vec<i64>,
    width: usize,
}

impl MotionReadout {
    pub fn new(names: &[String], start: &[i64], target: &[i64]) -> MotionReadout {
        MotionReadout {
            names: names.to_vec(),
            start: start.to_vec(),
            target: target.to_vec(),
            width: 0,
        }
    }

    pub fn update(&mut self, states: &[State], positions: &[i64]) {
        let cells: Vec<String> = (0..self.names.len())
            .map(|i| {
                let marker = if states.get(i).map(|s| s.is_moving()).unwrap_or(false) {
                    ">"
                } else {
                    " "
                };
                format!(
                    "{}{} [{} => {}] {}",
                    marker,
                    self.names[i],
                    self.start[i],
                    self.target[i],
                    positions.get(i).copied().unwrap_or_default(),
                )
            })
            .collect();
        let line = cells.join("  |  ");
        self.width = self.width.max(line.len());
        eprint!("\r{line:<width$}", width = self.width);
        let _ = std::io::stderr().flush();
    }

    pub fn finish(&self) {
        eprintln!();
    }
}

/// Plain progress bar, refreshed in place.
pub fn progress_bar(count: f64, total: f64, status: &str) {
    const BAR_LEN: usize = 60;
    let fraction = if total > 0.0 {
        (count / total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (BAR_LEN as f64 * fraction).round() as usize;
    let bar = format!("{}{}", "=".repeat(filled), "-".repeat(BAR_LEN - filled));
    eprint!("\r[{bar}] {:.1}% < {status} >", fraction * 100.0);
    let _ = std::io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rendering_does_not_panic() {
        print_table(
            &["Axis", "Name"],
            &[
                vec!["1".to_string(), "th".to_string()],
                vec!["151".to_string(), "a-very-long-name".to_string()],
            ],
        );
    }

    #[test]
    fn readout_tracks_width() {
        let mut readout = MotionReadout::new(
            &["th".to_string()],
            &[0],
            &[100],
        );
        readout.update(&[State::new(1 << 10)], &[50]);
        assert!(readout.width > 0);
        readout.finish();
    }
}
