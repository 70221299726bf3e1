use serde::{Deserialize, Serialize};

pub const FIELD_COUNT: usize = 11;

/// Canonical field order. Tabular rows map onto it positionally.
pub const CANONICAL_FIELDS: [&str; FIELD_COUNT] = [
    "timestamp_label",
    "name",
    "email",
    "room",
    "date",
    "time",
    "team",
    "type",
    "description",
    "priority",
    "comments",
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    pub timestamp_label: String,
    pub name: String,
    pub email: String,
    pub room: String,
    pub date: String,
    pub time: String,
    pub team: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub priority: String,
    pub comments: String,
}

impl IncidentRecord {
    /// Builds a record from values given in `CANONICAL_FIELDS` order.
    pub fn from_fields(id: String, values: [String; FIELD_COUNT]) -> Self {
        let [timestamp_label, name, email, room, date, time, team, kind, description, priority, comments] = values;
        IncidentRecord { id, timestamp_label, name, email, room, date, time, team, kind, description, priority, comments }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        let v = match name {
            "id" => &self.id,
            "timestamp_label" => &self.timestamp_label,
            "name" => &self.name,
            "email" => &self.email,
            "room" => &self.room,
            "date" => &self.date,
            "time" => &self.time,
            "team" => &self.team,
            "type" => &self.kind,
            "description" => &self.description,
            "priority" => &self.priority,
            "comments" => &self.comments,
            _ => return None,
        };
        Some(v.as_str())
    }
}
