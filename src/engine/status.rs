//! One-line run status rendering: `[n/total] name   message`, with a
//! textual progress bar, throughput and ETA during the full-hash stage.

use std::io::{self, Write};

const MIB: f64 = 1024.0 * 1024.0;

/// Re-renders a single terminal line per candidate file.
pub struct StatusLine {
    cols: usize,
    total: usize,
}

impl StatusLine {
    pub fn new(total: usize) -> Self {
        let cols = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|c| *c >= 40)
            .unwrap_or(80);
        Self { cols, total }
    }

    /// Overwrite the current line with `[no/total] name   msg`, eliding the
    /// middle of the name when space runs out.
    pub fn print(&self, no: usize, name: &str, msg: &str) {
        let width = self.total.to_string().len();
        let stat = format!("[{:>width$}/{}] ", no, self.total, width = width);
        // 1 before the name + 3 after + 1 at the end of the line
        let room = self.cols.saturating_sub(msg.len() + stat.len() + 5).max(4);
        let shown = elide_middle(name, room);
        print!("\r{} {:<room$}   {}", stat, shown, msg, room = room);
        let _ = io::stdout().flush();
    }

    /// Move on to the next line, keeping whatever was last rendered.
    pub fn newline(&self) {
        println!();
    }
}

fn elide_middle(name: &str, room: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= room {
        return name.to_string();
    }
    let half = (room.saturating_sub(1)) / 2;
    let mut out: String = chars[..half].iter().collect();
    out.push('~');
    out.extend(&chars[chars.len() - half..]);
    out
}

/// `[====== 50% -----]` style bar. `width` includes the brackets.
pub fn progress_bar(percent: u64, width: usize) -> String {
    let inner = width.saturating_sub(2);
    let mark = format!(" {}% ", percent);
    if mark.len() >= inner {
        return format!("[{:^inner$}]", mark.trim(), inner = inner);
    }
    let ticks = 1 + inner - mark.len();
    let mut done = (ticks as u64 * percent / 100) as usize;
    if done == ticks {
        done -= 1;
    }
    let mut bar = "=".repeat(done);
    bar.push_str(&mark);
    let fill = inner - bar.len();
    bar.push_str(&"-".repeat(fill));
    format!("[{}]", bar)
}

/// Progress message for the poll loop: optional advisory marker, bar,
/// MB/s and an `MM:SS` ETA over the whole remaining run.
pub fn progress_message(
    processed: u64,
    file_size: u64,
    prev_bytes: u64,
    total_bytes: u64,
    elapsed_secs: f64,
    advisory: bool,
) -> String {
    let percent = if file_size == 0 {
        100
    } else {
        (processed * 100 / file_size).min(100)
    };
    let speed = if elapsed_secs > 0.0 {
        (prev_bytes + processed) as f64 / (MIB * elapsed_secs)
    } else {
        0.0
    };
    let (speed_mb, eta) = if speed > 0.0 {
        let remaining = total_bytes.saturating_sub(prev_bytes + processed) as f64;
        let eta_secs = (remaining / (MIB * speed)) as u64;
        (
            speed as u64,
            format!(" {:02}:{:02}", eta_secs / 60, eta_secs % 60),
        )
    } else {
        (0, " --:--".to_string())
    };
    format!(
        "{}{} {:3}MB/s{}",
        if advisory { "* " } else { "" },
        progress_bar(percent, 21),
        speed_mb,
        eta
    )
}
