//! Text-based rendering for reports

use crate::models::{Confidence, ProcessEntry, ProcessRecord};
use crate::report::Report;
use time::format_description::well_known::Rfc3339;

const MAX_COMMAND_WIDTH: usize = 100;

/// Render a human-readable narrative report
pub fn render_human(report: &Report) -> String {
    let mut out = String::new();
    let proc = &report.process;

    out.push_str(&format!("─── Query: {} ───\n\n", report.target));

    out.push_str(&format!("Process: {} (PID {})\n", proc.name(), proc.pid));
    if let Some(path) = &proc.exe_path {
        out.push_str(&format!("  Path: {}\n", path));
    }
    if !proc.cmdline.is_empty() {
        out.push_str(&format!("  Command: {}\n", truncate(&proc.cmdline, MAX_COMMAND_WIDTH)));
    }
    if let Some(user) = &proc.user {
        out.push_str(&format!("  User: {}\n", user));
    }
    if let Some(start) = &proc.start_time {
        if let Ok(formatted) = start.format(&Rfc3339) {
            out.push_str(&format!("  Started: {}\n", formatted));
        }
    }
    if let Some(dir) = &proc.working_dir {
        out.push_str(&format!("  Working Dir: {}\n", dir));
    }
    if !proc.listening_ports.is_empty() {
        let listeners: Vec<String> = proc
            .listening_ports
            .iter()
            .map(|p| p.to_string())
            .collect();
        out.push_str(&format!("  Listening: {}", listeners.join(", ")));
        if !proc.bind_addresses.is_empty() {
            let addrs: Vec<&str> = proc.bind_addresses.iter().map(String::as_str).collect();
            out.push_str(&format!(" on {}", addrs.join(", ")));
        }
        out.push('\n');
    }
    out.push_str(&format!("  Health: {}\n", proc.health));

    out.push_str(&format!(
        "\nWhy It Exists:\n  {}\n",
        lineage_line(&report.ancestry.records)
    ));
    if report.restart_count > 0 {
        out.push_str(&format!("  Restarts: {}\n", report.restart_count));
    }

    out.push_str(&format!(
        "\nSource: {} ({}, {} confidence)\n",
        report.source.kind,
        report.source.label,
        report.source.level()
    ));
    out.push_str(&format!("  {}\n", report.source.description));

    if let Some(socket) = &report.socket {
        out.push_str(&format!(
            "\nSocket: {} {} -> {}\n",
            socket.state, socket.local_addr, socket.remote_addr
        ));
        if let Some(explanation) = &socket.explanation {
            out.push_str(&format!("  {}\n", explanation));
        }
        if let Some(workaround) = &socket.workaround {
            out.push_str(&format!("  Hint: {}\n", workaround));
        }
    }

    if let Some(files) = &report.file_context {
        out.push_str("\nOpen Files:\n");
        match files.usage_percent() {
            Some(pct) => out.push_str(&format!(
                "  {} of {} ({:.0}%)\n",
                files.open_files, files.file_limit, pct
            )),
            None => out.push_str(&format!("  {}\n", files.open_files)),
        }
        for lock in &files.locked_files {
            out.push_str(&format!("  Lock: {}\n", lock));
        }
    }

    if !report.children.is_empty() {
        out.push('\n');
        out.push_str(&render_children(proc, &report.children));
    }

    if !report.evidence.is_empty() {
        out.push_str("\nEvidence:\n");
        for ev in &report.evidence {
            let conf_marker = match ev.confidence {
                Confidence::High => "●",
                Confidence::Medium => "◐",
                Confidence::Low => "○",
            };
            out.push_str(&format!("  {} {} (via {})\n", conf_marker, ev.fact, ev.source));
            if let Some(detail) = &ev.details {
                out.push_str(&format!("      {}\n", detail));
            }
        }
    }

    if !report.warnings.is_empty() {
        out.push('\n');
        out.push_str(&render_warnings(report));
    }

    out
}

/// Render the lineage as an indented tree, target last
pub fn render_tree(report: &Report) -> String {
    let records = &report.ancestry.records;
    if records.is_empty() {
        return format!("No process tree available for {}\n", report.target);
    }

    let mut out = format!("Process tree for {}:\n\n", report.target);
    let last = records.len() - 1;
    for (i, record) in records.iter().enumerate() {
        let indent = "  ".repeat(i);
        let connector = if i == 0 { "" } else { "└─ " };
        let marker = if i == last { "▶ " } else { "" };
        out.push_str(&format!(
            "{}{}{}{}\n",
            indent,
            connector,
            marker,
            record_label(record)
        ));
    }

    if !report.children.is_empty() {
        let indent = "  ".repeat(records.len());
        let count = report.children.len();
        for (i, child) in report.children.iter().enumerate() {
            let connector = if i + 1 == count { "└─ " } else { "├─ " };
            out.push_str(&format!(
                "{}{}{} (PID {})\n",
                indent, connector, child.command_name, child.pid
            ));
        }
    }

    out.push_str(&format!(
        "\n  Source: {} ({} confidence)\n",
        report.source.kind,
        report.source.level()
    ));
    for warning in &report.warnings {
        out.push_str(&format!("  ⚠ {}\n", warning));
    }

    out
}

/// Render a single-line lineage summary
pub fn render_short(report: &Report) -> String {
    let warn_indicator = if report.has_warnings() {
        format!(" [{}⚠]", report.warnings.len())
    } else {
        String::new()
    };

    format!(
        "{} → {} ({}){}",
        lineage_line(&report.ancestry.records),
        report.source.kind,
        report.source.level(),
        warn_indicator
    )
}

/// Warnings only, one per line
pub fn render_warnings(report: &Report) -> String {
    if report.warnings.is_empty() {
        return "No warnings.\n".to_string();
    }
    report
        .warnings
        .iter()
        .map(|w| format!("⚠ {}\n", w))
        .collect()
}

/// Command line and environment of the resolved process
pub fn render_env(record: &ProcessRecord) -> String {
    let mut out = format!("Command     : {}\n", record.cmdline);
    if record.environment.is_empty() {
        out.push_str("No environment variables found.\n");
    } else {
        out.push_str("Environment :\n");
        for var in &record.environment {
            out.push_str(&format!("  {}\n", var));
        }
    }
    out
}

/// Direct children of a process as a small tree
pub fn render_children(parent: &ProcessRecord, children: &[ProcessEntry]) -> String {
    let mut out = format!("Children of {} (PID {}):\n", parent.name(), parent.pid);
    if children.is_empty() {
        out.push_str("  No child processes found.\n");
        return out;
    }
    for (i, child) in children.iter().enumerate() {
        let connector = if i + 1 == children.len() { "└─" } else { "├─" };
        out.push_str(&format!(
            "  {} {} (PID {})\n",
            connector, child.command_name, child.pid
        ));
    }
    out
}

/// `systemd (PID 1) → sshd (PID 812) → bash (PID 900)`
fn lineage_line(records: &[ProcessRecord]) -> String {
    records
        .iter()
        .map(record_label)
        .collect::<Vec<_>>()
        .join(" → ")
}

fn record_label(record: &ProcessRecord) -> String {
    if record.synthetic {
        format!("<unreadable> (PID {})", record.pid)
    } else {
        format!("{} (PID {})", record.name(), record.pid)
    }
}

/// Cut `s` to `width` characters, marking the cut with "..."
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let cut: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestry::AncestryChain;
    use crate::models::{Query, SourceClassification, SourceKind, Warning};

    fn sample_report() -> Report {
        let mut init = ProcessRecord::new(1, 0, "systemd");
        init.cmdline = "/sbin/init".to_string();
        let mut shell = ProcessRecord::new(900, 1, "bash");
        shell.cmdline = "-bash".to_string();
        let mut target = ProcessRecord::new(1234, 900, "vim");
        target.cmdline = "vim notes.txt".to_string();
        target.exe_path = Some("/usr/bin/vim".to_string());
        target.user = Some("alice".to_string());
        target.environment = vec!["HOME=/home/alice".to_string(), "TERM=xterm".to_string()];

        let chain = AncestryChain {
            records: vec![init, shell, target.clone()],
            stop: None,
        };
        let mut report = Report::new(Query::pid("1234"), target, chain);
        report.source = SourceClassification {
            kind: SourceKind::InteractiveShell,
            label: "bash".to_string(),
            confidence: 0.85,
            description: "Started interactively from bash".to_string(),
        };
        report
    }

    #[test]
    fn test_render_short() {
        let output = render_short(&sample_report());
        assert_eq!(
            output,
            "systemd (PID 1) → bash (PID 900) → vim (PID 1234) → Interactive Shell (high)"
        );
    }

    #[test]
    fn test_render_human_contains_process() {
        let output = render_human(&sample_report());
        assert!(output.contains("Process: vim (PID 1234)"));
        assert!(output.contains("Path: /usr/bin/vim"));
        assert!(output.contains("Interactive Shell (bash, high confidence)"));
        assert!(!output.contains("Restarts"));
    }

    #[test]
    fn test_render_tree_marks_target() {
        let output = render_tree(&sample_report());
        assert!(output.contains("systemd (PID 1)"));
        assert!(output.contains("    └─ ▶ vim (PID 1234)"));
    }

    #[test]
    fn test_render_warnings() {
        let mut report = sample_report();
        assert_eq!(render_warnings(&report), "No warnings.\n");
        report.add_warning(Warning::RunningAsRoot);
        assert_eq!(render_warnings(&report), "⚠ Process is running as root\n");
        assert!(render_short(&report).ends_with("[1⚠]"));
    }

    #[test]
    fn test_render_env_keeps_order() {
        let report = sample_report();
        let output = render_env(&report.process);
        assert!(output.starts_with("Command     : vim notes.txt\n"));
        let home = output.find("HOME=").unwrap();
        let term = output.find("TERM=").unwrap();
        assert!(home < term);

        let bare = ProcessRecord::new(5, 1, "x");
        assert!(render_env(&bare).contains("No environment variables found."));
    }

    #[test]
    fn test_render_children() {
        let parent = ProcessRecord::new(700, 1, "nginx");
        let children = vec![
            ProcessEntry {
                pid: 701,
                parent_pid: 700,
                command_name: "nginx".to_string(),
            },
            ProcessEntry {
                pid: 702,
                parent_pid: 700,
                command_name: "nginx".to_string(),
            },
        ];
        let output = render_children(&parent, &children);
        assert!(output.contains("├─ nginx (PID 701)"));
        assert!(output.contains("└─ nginx (PID 702)"));
        assert!(render_children(&parent, &[]).contains("No child processes found."));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("short", 8), "short");
    }
}
