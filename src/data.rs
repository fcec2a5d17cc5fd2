use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// (module_id, group_id, instructor_id): one weekly requirement.
pub type RequirementKey<'a> = (&'a str, &'a str, &'a str);

/// (day, start_time, end_time) borrowed from a session.
pub type SlotKey<'a> = (&'a str, &'a str, &'a str);

/// A required teaching unit as delivered by the roster collaborator.
///
/// Missing fields deserialize to empty strings. Placeholder values such as
/// `"-"`, `"TBD"` or `"--"` are kept verbatim and compared like any other
/// string.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Session {
    pub course_id: String,
    pub course_name: String,
    pub module_id: String,
    pub module_name: String,
    pub group_id: String,
    pub group_name: String,
    pub instructor_id: String,
    pub instructor_name: String,
    pub location: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    /// Calendar match resolved upstream; never inspected by the optimizer.
    pub event: Option<serde_json::Value>,
}

impl Session {
    pub fn requirement_key(&self) -> RequirementKey<'_> {
        (&self.module_id, &self.group_id, &self.instructor_id)
    }

    /// Key used to drop repeated entries after a crossover splice.
    pub fn splice_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.module_id,
            &self.group_id,
            &self.day,
            &self.start_time,
            &self.instructor_id,
        )
    }

    /// Key used to look a scheduled session back up in the roster.
    pub fn enrichment_key(&self) -> (&str, &str, &str, &str) {
        (&self.module_id, &self.group_id, &self.day, &self.start_time)
    }

    pub fn slot_key(&self) -> SlotKey<'_> {
        (&self.day, &self.start_time, &self.end_time)
    }

    pub fn slot(&self) -> Slot {
        Slot {
            day: self.day.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }

    /// Returns a copy of this session placed in `slot`.
    pub fn with_slot(self, slot: &Slot) -> Session {
        Session {
            day: slot.day.clone(),
            start_time: slot.start_time.clone(),
            end_time: slot.end_time.clone(),
            ..self
        }
    }
}

/// A position in the weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Slot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.day, self.start_time, self.end_time)
    }
}

/// One candidate timetable. Order only matters for crossover splitting.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timetable {
    sessions: Vec<Session>,
}

impl Timetable {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn into_sessions(self) -> Vec<Session> {
        self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Session> {
        self.sessions.iter()
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.sessions.swap(a, b);
    }
}

impl From<Vec<Session>> for Timetable {
    fn from(sessions: Vec<Session>) -> Self {
        Self::new(sessions)
    }
}

impl<'a> IntoIterator for &'a Timetable {
    type Item = &'a Session;
    type IntoIter = std::slice::Iter<'a, Session>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}

/// Category of a residual penalty found by the fitness evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    InstructorClash,
    GroupClash,
    RoomClash,
    SlotOverlap,
    DailyOverload,
    SparseWeek,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::InstructorClash => "Instructor Clash",
            ViolationKind::GroupClash => "Group Clash",
            ViolationKind::RoomClash => "Room Clash",
            ViolationKind::SlotOverlap => "Slot Overlap",
            ViolationKind::DailyOverload => "Daily Overload",
            ViolationKind::SparseWeek => "Sparse Week",
        };
        f.write_str(name)
    }
}

/// Describes one penalty that contributed to a timetable's fitness.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    pub penalty: u32,
    pub description: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (+{})", self.kind, self.description, self.penalty)
    }
}

/// Score of a timetable plus the penalties that make it up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitnessReport {
    pub score: u32,
    pub violations: Vec<Violation>,
}

/// Structural problem found by the conflict checker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictIssue {
    pub module_id: String,
    pub issue: String,
}

/// The best timetable of a run, enriched with calendar events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestSchedule {
    #[serde(rename = "userEmail")]
    pub owner: String,
    pub generated_by: String,
    pub fitness_score: u32,
    pub batch_id: String,
    pub generated_at: DateTime<Utc>,
    pub timetable: Timetable,
}

/// One member of the final generation with its position in the ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSchedule {
    #[serde(rename = "userEmail")]
    pub owner: String,
    pub batch_id: String,
    pub rank: usize,
    pub fitness_score: u32,
    pub generated_at: DateTime<Utc>,
    pub timetable: Timetable,
}

/// Everything one run hands to the persistence collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub best: BestSchedule,
    pub ranked: Vec<RankedSchedule>,
}
