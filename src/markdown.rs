use chrono::Local;

use crate::report::{ReportSummary, SAMPLE_COLUMNS};

fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

pub fn render_markdown(rep: &ReportSummary) -> String {
    let mut s = String::new();
    s.push_str("# Incident Report\n\n");
    s.push_str(&format!("Source: {} ({} layout)\n\n", rep.source, rep.shape));
    s.push_str(&format!("Generated: {}\n\n", Local::now().format("%Y-%m-%d %H:%M")));

    s.push_str("## Summary\n");
    s.push_str(&format!("- Total Incidents: {}\n", rep.total));
    s.push_str(&format!("- Scanned: {}\n", rep.scanned));
    s.push_str(&format!("- Dropped (implausible date): {}\n\n", rep.dropped));

    s.push_str("## Sample\n");
    if rep.samples.is_empty() { s.push_str("None\n\n"); } else {
        let hdr: Vec<&str> = SAMPLE_COLUMNS.iter().map(|(h, _)| *h).collect();
        s.push_str(&format!("| {} |\n", hdr.join(" | ")));
        s.push_str(&format!("|{}\n", "---|".repeat(hdr.len())));
        for r in &rep.samples {
            let row: Vec<String> = SAMPLE_COLUMNS.iter().map(|(_, f)| md_cell(r.field(f).unwrap_or_default())).collect();
            s.push_str(&format!("| {} |\n", row.join(" | ")));
        }
        s.push('\n');
    }

    for st in &rep.stats {
        s.push_str(&format!("## By {}\n", st.field.label()));
        for (v, c) in &st.entries { s.push_str(&format!("- {} ({})\n", md_cell(v), c)); }
        s.push('\n');
    }
    s
}
