use std::fmt::Write as _;

use anstyle::{AnsiColor, Effects, Style};

use auh_engine::RunStatistics;

fn success_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Green.into()))
        .effects(Effects::BOLD)
}

fn failure_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Red.into()))
        .effects(Effects::BOLD)
}

fn skipped_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Yellow.into()))
}

fn colorize(style: Style, text: &str, colored: bool) -> String {
    if colored {
        format!("{}{}{}", style.render(), text, style.render_reset())
    } else {
        text.to_string()
    }
}

/// Renders the end-of-run summary. `colored` is decided by the caller
/// from the output target.
pub fn render_summary(stats: &RunStatistics, colored: bool) -> String {
    let mut text = format!("\nUpgrade run finished: {} attempted\n", stats.attempted);
    let _ = writeln!(
        text,
        "  {}",
        colorize(
            success_style(),
            &format!("{} succeeded", stats.succeeded),
            colored
        )
    );
    let _ = writeln!(
        text,
        "  {}",
        colorize(failure_style(), &format!("{} failed", stats.failed), colored)
    );
    let _ = writeln!(
        text,
        "  {}",
        colorize(
            skipped_style(),
            &format!("{} skipped", stats.skipped),
            colored
        )
    );

    if !stats.by_maintainer.is_empty() {
        text.push_str("\nPer maintainer:\n");
        for (maintainer, tally) in &stats.by_maintainer {
            let _ = writeln!(
                text,
                "  {maintainer}: {} succeeded, {} failed",
                tally.succeeded, tally.failed
            );
        }
    }
    text
}
