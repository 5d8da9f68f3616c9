//! Full rescans triggered by the server (startup in open mode, sign-in).

use std::time::Instant;

use crate::cache::{PageCache, ScanReport};
use crate::logger::{status_error, status_success};

/// Rescan the whole tree and report the outcome. Returns `None` when the
/// root could not be walked; the snapshot is untouched in that case.
pub fn rescan_all(cache: &PageCache) -> Option<ScanReport> {
    let started = Instant::now();
    match cache.rescan_all() {
        Ok(report) => {
            report_scan(&report, started);
            Some(report)
        }
        Err(e) => {
            status_error("scan failed", &e.to_string());
            None
        }
    }
}

fn report_scan(report: &ScanReport, started: Instant) {
    let elapsed = started.elapsed().as_millis();
    if !report.failed.is_empty() {
        let detail: Vec<String> = report.failed.iter().map(ToString::to_string).collect();
        status_error(
            &format!(
                "{} of {} page(s) failed to render",
                report.failed.len(),
                report.discovered
            ),
            &detail.join("\n"),
        );
        return;
    }

    let mut message = format!("{} page(s) scanned in {}ms", report.discovered, elapsed);
    if report.rendered > 0 {
        message.push_str(&format!(", {} rendered", report.rendered));
    }
    if report.removed > 0 {
        message.push_str(&format!(", {} removed", report.removed));
    }
    status_success(&message);
}
