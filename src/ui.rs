use std::io::{self, Write};

use crossterm::style::Stylize;

use crate::catalog::{Item, Level};
use crate::engine::HintRenderer;
use crate::events::RunEvent;
use crate::progress::{Progress, RunRecord};
use crate::runtime::pick_key;
use crate::state::RunSummary;

const HINT_NAMES: [&str; 4] = ["rotation centres", "mirror lines", "glide axes", "answer"];

pub fn hint_name(order: u8) -> &'static str {
    usize::from(order)
        .checked_sub(1)
        .and_then(|i| HINT_NAMES.get(i))
        .copied()
        .unwrap_or("hint")
}

pub fn level_lines(levels: &[Level], progress: &Progress) -> Vec<String> {
    levels
        .iter()
        .map(|level| {
            let lock = if progress.is_unlocked(&level.id) {
                " "
            } else {
                "#"
            };
            format!(
                "{lock} {:<12} {:<20} {:>2} items  {:>4.0}s  gate: {:.0}% correct, median < {:.1}s",
                level.id,
                level.label,
                level.pool_size,
                level.run_duration_secs,
                level.gate.min_accuracy * 100.0,
                level.gate.max_median_item_secs
            )
        })
        .collect()
}

/// The category menu for a level, one `key) name` entry per category.
pub fn category_menu(level: &Level) -> String {
    level
        .categories
        .iter()
        .enumerate()
        .filter_map(|(i, c)| pick_key(i).map(|k| format!("{k}) {c}")))
        .collect::<Vec<String>>()
        .join("  ")
}

pub fn item_lines(item: &Item, index: usize, count: usize, level: &Level) -> Vec<String> {
    vec![
        format!("[{}/{}] {}", index + 1, count, item.content),
        category_menu(level),
        "space) hint   q) quit".to_string(),
    ]
}

/// One line per event worth showing. Ticks go through [`ClockDisplay`].
pub fn event_line(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::RunStarted { level, run } => Some(format!(
            "{} - {} items, {:.0}s on the clock",
            level.label.as_str().bold(),
            run.item_count,
            run.run_time_remaining
        )),
        RunEvent::GuessEvaluated {
            guess,
            correct: false,
            result,
            ..
        } => Some(format!("{} {guess} (wrong #{})", "✗".red(), result.wrongs)),
        RunEvent::HintUsed { order, .. } => {
            Some(format!("hint {order}: {}", hint_name(*order).yellow()))
        }
        RunEvent::ItemResolved {
            result, reason, ..
        } => Some(format!(
            "{} {} in {:.1}s, +{} ({reason})",
            if result.is_correct() {
                "✓".green()
            } else {
                "·".dim()
            },
            result.truth,
            result.item_time_ms as f64 / 1000.0,
            result.points
        )),
        RunEvent::ScoreUpdated { score, run } => Some(format!(
            "score {score}  streak {}  {:.0}s left",
            run.streak, run.run_time_remaining
        )),
        _ => None,
    }
}

/// Shows the run clock once per whole second instead of on every tick.
#[derive(Debug, Default)]
pub struct ClockDisplay {
    shown: Option<u64>,
}

impl ClockDisplay {
    /// A `"{n}s left"` line when the remaining time has entered a new whole
    /// second since the last call.
    pub fn update(&mut self, run_time_remaining: f64) -> Option<String> {
        let secs = run_time_remaining.max(0.0).ceil() as u64;
        if self.shown == Some(secs) {
            return None;
        }
        self.shown = Some(secs);
        Some(format!("{}", format!("{secs}s left").dim()))
    }
}

pub fn summary_lines(summary: &RunSummary, gate_passed: bool) -> Vec<String> {
    vec![
        format!("run over: {}", summary.reason),
        format!("score      {}", summary.total_score),
        format!(
            "accuracy   {:.0}% ({}/{})",
            summary.accuracy * 100.0,
            summary.correct,
            summary.attempted
        ),
        format!("median     {:.2}s", summary.median_item_secs),
        format!("best streak {}", summary.longest_streak),
        if gate_passed {
            "gate passed".to_string()
        } else {
            "gate not passed".to_string()
        },
    ]
}

pub fn progress_lines(progress: &Progress) -> Vec<String> {
    let mut lines = vec![
        format!("unlocked: {}", progress.unlocked_levels.join(", ")),
        format!(
            "hints opened: rotations {}, mirrors {}, glides {}",
            progress.feature_weakness.rotations,
            progress.feature_weakness.mirrors,
            progress.feature_weakness.glides
        ),
    ];
    let confusions = progress.top_confusions(5);
    if !confusions.is_empty() {
        lines.push("most confused:".to_string());
        lines.extend(
            confusions
                .into_iter()
                .map(|(truth, picked, n)| format!("  {truth} taken for {picked} x{n}")),
        );
    }
    lines
}

pub fn history_lines(history: &[RunRecord]) -> Vec<String> {
    history
        .iter()
        .map(|r| {
            format!(
                "{}  {:<12} score {:>4}  acc {:>3.0}%  median {:>5.2}s  {}",
                r.finished_at.format("%Y-%m-%d %H:%M"),
                r.summary.level_id,
                r.summary.total_score,
                r.summary.accuracy * 100.0,
                r.summary.median_item_secs,
                if r.gate_passed { "pass" } else { "-" }
            )
        })
        .collect()
}

/// Write run history as CSV.
pub fn write_history_csv<W: Write>(history: &[RunRecord], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "finished_at",
        "level",
        "score",
        "accuracy",
        "median_item_secs",
        "longest_streak",
        "reason",
        "gate_passed",
    ])?;
    for r in history {
        writer.write_record([
            r.finished_at.to_rfc3339(),
            r.summary.level_id.clone(),
            r.summary.total_score.to_string(),
            format!("{:.3}", r.summary.accuracy),
            format!("{:.3}", r.summary.median_item_secs),
            r.summary.longest_streak.to_string(),
            r.summary.reason.to_string(),
            r.gate_passed.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Raw-mode terminal output needs explicit carriage returns.
pub fn print_lines<I, S>(lines: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stdout = io::stdout().lock();
    for line in lines {
        write!(stdout, "{}\r\n", line.as_ref())?;
    }
    stdout.flush()
}

/// Prints each granted hint's overlay reference.
#[derive(Debug, Default)]
pub struct TerminalHintRenderer;

impl HintRenderer for TerminalHintRenderer {
    fn render(&mut self, order: u8, _item: &Item, payload: Option<&str>) {
        let line = format!("  overlay ({}): {}", hint_name(order), payload.unwrap_or("-"));
        // Drawing is best effort; the run goes on without the overlay.
        let _ = print_lines([line]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::state::EndReason;
    use chrono::Local;

    fn summary() -> RunSummary {
        RunSummary {
            level_id: "basics".into(),
            total_score: 321,
            attempted: 8,
            correct: 6,
            accuracy: 0.75,
            median_item_secs: 2.5,
            longest_streak: 4,
            reason: EndReason::Completed,
        }
    }

    #[test]
    fn locked_levels_are_marked() {
        let catalog = Catalog::embedded().unwrap();
        let progress = Progress::for_catalog(&catalog);
        let lines = level_lines(catalog.levels(), &progress);
        assert!(lines[0].starts_with("  basics"));
        assert!(lines[1].starts_with("# reflections"));
    }

    #[test]
    fn category_menu_uses_pick_keys() {
        let catalog = Catalog::embedded().unwrap();
        let menu = category_menu(catalog.level("basics").unwrap());
        assert_eq!(menu, "1) p1  2) p2  3) pm  4) pg");
        let all = category_menu(catalog.level("all-groups").unwrap());
        assert!(all.contains("h) p6m"));
    }

    #[test]
    fn summary_mentions_gate() {
        let lines = summary_lines(&summary(), true);
        assert!(lines.iter().any(|l| l.contains("75%")));
        assert_eq!(lines.last().unwrap(), "gate passed");
    }

    #[test]
    fn history_csv_has_header_and_rows() {
        let record = RunRecord {
            user_id: "ada".into(),
            finished_at: Local::now(),
            gate_passed: true,
            summary: summary(),
        };
        let mut buf = Vec::new();
        write_history_csv(&[record], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("finished_at,level,score"));
        let row = lines.next().unwrap();
        assert!(row.contains(",basics,321,0.750,2.500,4,completed,true"));
    }

    #[test]
    fn clock_display_shows_each_second_once() {
        let mut clock = ClockDisplay::default();
        assert!(clock.update(30.0).unwrap().contains("30s left"));
        assert_eq!(clock.update(29.95), None);
        assert_eq!(clock.update(29.05), None);
        assert!(clock.update(28.9).unwrap().contains("29s left"));
        assert_eq!(clock.update(28.1), None);
        assert!(clock.update(-0.5).unwrap().contains("0s left"));
    }

    #[test]
    fn hint_names() {
        assert_eq!(hint_name(1), "rotation centres");
        assert_eq!(hint_name(4), "answer");
        assert_eq!(hint_name(0), "hint");
    }
}
