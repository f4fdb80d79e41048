//! Report display and formatting

use crate::sim::{IntervalReport, SimReport};
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format simulated duration with millisecond precision
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = secs / 60;

    if minutes > 0 {
        format!("{}m {:02}.{:03}s", minutes, secs % 60, millis)
    } else {
        format!("{}.{:03}s", secs, millis)
    }
}

/// RTCP fraction lost (0-255) as a percentage
pub fn format_fraction_lost(fraction: u8) -> String {
    format!("{:.1}%", fraction as f64 * 100.0 / 256.0)
}

/// Jitter in timestamp units as milliseconds
pub fn format_jitter(jitter: u32, clock_rate: u32) -> String {
    if clock_rate == 0 {
        return format!("{} units", jitter);
    }
    format!("{:.2}ms", jitter as f64 * 1000.0 / clock_rate as f64)
}

/// Ratio of `part` to `whole` as a percentage
pub fn format_percent(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "N/A".to_string();
    }
    format!("{:.2}%", part as f64 * 100.0 / whole as f64)
}

/// Display the final report
pub fn display_report(report: &SimReport, clock_rate: u32) {
    let link = &report.link;
    let queue = &report.queue;

    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ SIMULATION REPORT                                           │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Duration:   {}", format_duration(report.duration));
    println!(
        "│ Link:       {} sent / {} dropped ({}) / {} reordered / {} duplicated",
        link.packets_sent,
        link.packets_dropped,
        format_percent(link.packets_dropped, link.packets_sent + link.packets_retransmitted),
        link.packets_reordered,
        link.packets_duplicated
    );
    println!(
        "│ NACK:       {} requested / {} retransmitted / {} unanswered",
        queue.nacks_requested, link.packets_retransmitted, link.nacks_unanswered
    );
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ RECEIVE QUEUE                                               │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!(
        "│ Packets:    {} received / {} recovered / {} lost",
        queue.packets_received, queue.packets_recovered, queue.packets_lost
    );
    println!(
        "│ Dropped:    {} duplicate / {} stale / {} discarded",
        queue.packets_duplicate, queue.packets_stale, queue.packets_discarded
    );
    println!(
        "│ Frames:     {} delivered ({} key) / {}",
        report.frames_delivered,
        report.keyframes_delivered,
        format_bytes(report.bytes_delivered)
    );
    println!(
        "│ Key frames: {} requested",
        report.keyframe_requests
    );
    println!(
        "│ Jitter:     {}",
        format_jitter(queue.jitter, clock_rate)
    );
    println!(
        "│ Highest:    {} (extended)",
        queue.extended_highest_sequence
    );
    println!("└─────────────────────────────────────────────────────────────┘");

    if !report.intervals.is_empty() {
        println!("\n┌──────────────┬──────────┬──────────┬──────────┬────────────┐");
        println!("│ Time         │ Lost     │ Cum.lost │ Jitter   │ Highest    │");
        println!("├──────────────┼──────────┼──────────┼──────────┼────────────┤");

        for interval in &report.intervals {
            display_interval_row(interval, clock_rate);
        }

        println!("└──────────────┴──────────┴──────────┴──────────┴────────────┘");
    }
}

/// Display one receiver report as a table row
fn display_interval_row(interval: &IntervalReport, clock_rate: u32) {
    println!(
        "│ {:12} │ {:8} │ {:8} │ {:8} │ {:10} │",
        format_duration(interval.at),
        format_fraction_lost(interval.fraction_lost),
        interval.cumulative_lost,
        format_jitter(interval.jitter, clock_rate),
        interval.extended_highest_sequence
    );
}
