use std::collections::HashMap;

use clap::ValueEnum;
use comfy_table::{ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use crate::normalizer::{Normalized, ShapeKind};
use crate::paint;
use crate::record::IncidentRecord;

pub const DEFAULT_SAMPLE_COUNT: usize = 10;
pub const DEFAULT_TOP: usize = 10;
pub const NO_VALID_INCIDENTS: &str = "No valid incidents found.";

/// Heading and canonical field of each column in tabular sample output.
pub const SAMPLE_COLUMNS: [(&str, &str); 10] = [
    ("Timestamp", "timestamp_label"),
    ("Name", "name"),
    ("Room", "room"),
    ("Date", "date"),
    ("Time", "time"),
    ("Team", "team"),
    ("Type", "type"),
    ("Priority", "priority"),
    ("Description", "description"),
    ("Comments", "comments"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupField { Team, Type, Priority, Room }

impl GroupField {
    pub const DEFAULT: [GroupField; 4] = [GroupField::Team, GroupField::Type, GroupField::Priority, GroupField::Room];

    pub fn label(self) -> &'static str {
        match self { GroupField::Team => "Team", GroupField::Type => "Type", GroupField::Priority => "Priority", GroupField::Room => "Room" }
    }

    pub fn value(self, r: &IncidentRecord) -> &str {
        match self { GroupField::Team => &r.team, GroupField::Type => &r.kind, GroupField::Priority => &r.priority, GroupField::Room => &r.room }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    pub field: GroupField,
    pub entries: Vec<(String, usize)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportSummary {
    pub source: String,
    pub shape: ShapeKind,
    pub scanned: usize,
    pub total: usize,
    pub dropped: usize,
    pub samples: Vec<IncidentRecord>,
    pub stats: Vec<FieldStats>,
}

/// Counts of each distinct non-empty value, most frequent first.
/// Equal counts keep first-seen order.
pub fn frequency_table(records: &[IncidentRecord], field: GroupField) -> Vec<(String, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for r in records {
        let v = field.value(r);
        if v.is_empty() { continue; }
        match index.get(v) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(v, counts.len());
                counts.push((v.to_string(), 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Top `top` entries per field; fields with no values are left out.
pub fn field_stats(records: &[IncidentRecord], fields: &[GroupField], top: usize) -> Vec<FieldStats> {
    let mut out = Vec::new();
    for &field in fields {
        let mut entries = frequency_table(records, field);
        entries.truncate(top);
        if entries.is_empty() { continue; }
        out.push(FieldStats { field, entries });
    }
    out
}

pub fn build_summary(source: &str, normalized: &Normalized, sample_count: usize, fields: &[GroupField], top: usize) -> ReportSummary {
    let records = &normalized.records;
    ReportSummary {
        source: source.to_string(),
        shape: normalized.shape,
        scanned: normalized.scanned,
        total: records.len(),
        dropped: normalized.dropped(),
        samples: records.iter().take(sample_count).cloned().collect(),
        stats: field_stats(records, fields, top),
    }
}

/// Text output when no record survived the date filter.
pub fn render_empty(scanned: usize, no_header: bool) -> String {
    let mut s = format!("{}\n", paint(NO_VALID_INCIDENTS, "1;33"));
    if !no_header && scanned > 0 { s.push_str(&format!("{}\n", paint(&format!("All {} scanned incidents had an implausible date.", scanned), "2"))); }
    s
}

pub fn render_sample(records: &[IncidentRecord], limit: usize, no_header: bool) -> String {
    let shown = records.len().min(limit);
    let mut s = String::new();
    if !no_header { s.push_str(&format!("{}\n", paint(&format!("Incident sample ({} of {}):", shown, records.len()), "1;36"))); }
    for (i, r) in records.iter().take(limit).enumerate() {
        s.push_str(&format!("{} {}\n", paint(&format!("#{}", i + 1), "1"), r.timestamp_label));
        s.push_str(&format!("  Name: {}\n", r.name));
        s.push_str(&format!("  Room: {}\n", r.room));
        s.push_str(&format!("  Date: {}\n", r.date));
        s.push_str(&format!("  Time: {}\n", r.time));
        s.push_str(&format!("  Team: {}\n", r.team));
        s.push_str(&format!("  Type: {}\n", r.kind));
        s.push_str(&format!("  Priority: {}\n", r.priority));
        s.push_str(&format!("  Description: {}\n", r.description.replace('\n', " ")));
        if !r.comments.is_empty() { s.push_str(&format!("  Comments: {}\n", r.comments.replace('\n', " "))); }
        s.push('\n');
    }
    s
}

pub fn render_stats(records: &[IncidentRecord], fields: &[GroupField], top: usize, no_header: bool) -> String {
    let mut s = String::new();
    s.push_str(&format!("{} {}\n", paint("Total incidents:", "1"), records.len()));
    for st in field_stats(records, fields, top) {
        if !no_header { s.push_str(&format!("{}\n", paint(&format!("{}:", st.field.label()), "1"))); }
        for (v, c) in &st.entries { s.push_str(&format!("• {} ({})\n", v, c)); }
    }
    s
}

pub fn render_sample_table(records: &[IncidentRecord], limit: usize, desc_width: Option<usize>) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(SAMPLE_COLUMNS.iter().map(|(h, _)| paint(h, "1")).collect::<Vec<_>>());
    for r in records.iter().take(limit) {
        let row: Vec<String> = SAMPLE_COLUMNS.iter().map(|(_, f)| {
            let v = r.field(f).unwrap_or_default();
            match desc_width { Some(w) if *f == "description" => truncate(v, w), _ => v.to_string() }
        }).collect();
        table.add_row(row);
    }
    table.to_string()
}

pub fn render_stats_table(records: &[IncidentRecord], fields: &[GroupField], top: usize) -> String {
    let mut s = format!("{} {}\n", paint("Total incidents:", "1"), records.len());
    for st in field_stats(records, fields, top) {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![paint(st.field.label(), "1"), paint("Count", "1")]);
        for (v, c) in &st.entries { table.add_row(vec![v.clone(), c.to_string()]); }
        s.push_str(&format!("{}\n", table));
    }
    s
}

pub fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(team: &str, kind: &str, priority: &str, room: &str) -> IncidentRecord {
        IncidentRecord { team: team.to_string(), kind: kind.to_string(), priority: priority.to_string(), room: room.to_string(), ..Default::default() }
    }

    #[test]
    fn team_frequencies_are_counted_and_ordered() {
        let rs = vec![rec("A", "", "", ""), rec("A", "", "", ""), rec("B", "", "", "")];
        assert_eq!(frequency_table(&rs, GroupField::Team), vec![("A".to_string(), 2), ("B".to_string(), 1)]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let rs = vec![rec("", "", "", "C"), rec("", "", "", "A"), rec("", "", "", "B"), rec("", "", "", "A"), rec("", "", "", "B")];
        let t = frequency_table(&rs, GroupField::Room);
        let keys: Vec<&str> = t.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }

    #[test]
    fn stats_skip_empty_fields_and_cap_entries() {
        let rs: Vec<IncidentRecord> = (0..15).map(|i| rec(&format!("T{}", i), "Bug", "", "")).collect();
        let st = field_stats(&rs, &GroupField::DEFAULT, DEFAULT_TOP);
        let fields: Vec<GroupField> = st.iter().map(|s| s.field).collect();
        assert_eq!(fields, vec![GroupField::Team, GroupField::Type]);
        assert_eq!(st[0].entries.len(), 10);
        assert_eq!(st[1].entries, vec![("Bug".to_string(), 15)]);
    }

    #[test]
    fn zero_top_prints_no_sections() {
        let rs = vec![rec("A", "Bug", "1", "R1")];
        assert!(field_stats(&rs, &GroupField::DEFAULT, 0).is_empty());
        assert_eq!(render_stats(&rs, &GroupField::DEFAULT, 0, false), "Total incidents: 1\n");
        assert!(!render_stats_table(&rs, &GroupField::DEFAULT, 0).contains("Count"));
    }

    #[test]
    fn empty_result_message() {
        assert_eq!(render_empty(0, false), "No valid incidents found.\n");
        let out = render_empty(4, false);
        assert!(out.starts_with(NO_VALID_INCIDENTS));
        assert!(out.contains("All 4 scanned incidents had an implausible date."));
        assert_eq!(render_empty(4, true), "No valid incidents found.\n");
    }

    #[test]
    fn stats_text_lists_total_and_sections() {
        let rs = vec![rec("A", "", "", ""), rec("A", "", "", ""), rec("B", "", "", "")];
        let out = render_stats(&rs, &GroupField::DEFAULT, DEFAULT_TOP, false);
        assert!(out.contains("Total incidents: 3"));
        assert!(out.contains("Team:\n• A (2)\n• B (1)\n"));
        assert!(!out.contains("Room:"));
    }

    #[test]
    fn sample_respects_limit_and_optional_comments() {
        let mut rs: Vec<IncidentRecord> = (0..12).map(|i| IncidentRecord { name: format!("N{}", i), ..Default::default() }).collect();
        rs[0].comments = "check cable".to_string();
        let out = render_sample(&rs, DEFAULT_SAMPLE_COUNT, false);
        assert!(out.contains("Incident sample (10 of 12):"));
        assert!(out.contains("Name: N9"));
        assert!(!out.contains("Name: N10"));
        assert_eq!(out.matches("Comments:").count(), 1);
        assert!(out.contains("Comments: check cable"));
    }

    #[test]
    fn summary_counts_and_samples() {
        let normalized = Normalized { shape: ShapeKind::Clean, scanned: 5, records: vec![rec("A", "Bug", "1", "R1"); 3] };
        let rep = build_summary("x.xml", &normalized, 2, &GroupField::DEFAULT, DEFAULT_TOP);
        assert_eq!(rep.total, 3);
        assert_eq!(rep.dropped, 2);
        assert_eq!(rep.samples.len(), 2);
        assert_eq!(rep.stats.len(), 4);
        let v = serde_json::to_value(&rep).unwrap();
        assert_eq!(v["shape"], "clean");
        assert_eq!(v["stats"][0]["field"], "team");
    }

    #[test]
    fn table_layouts_contain_values() {
        let mut r = rec("A", "Bug", "1", "R1");
        r.description = "a very long description".to_string();
        let t = render_sample_table(&[r.clone()], 10, Some(6));
        assert!(t.contains("Bug"));
        assert!(!t.contains("long"));
        let st = render_stats_table(&[r], &GroupField::DEFAULT, 10);
        assert!(st.contains("Total incidents: 1"));
        assert!(st.contains("Bug"));
    }

    #[test]
    fn truncate_handles_multibyte() {
        let t = truncate("Descripció", 9);
        assert_eq!(t, "Descripci...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
