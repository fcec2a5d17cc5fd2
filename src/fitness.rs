use itertools::Itertools;
use std::collections::HashSet;

use crate::config::{FitnessWeights, GaConfig, LoadPolicy};
use crate::data::{
    ConflictIssue, FitnessReport, Session, SlotKey, Timetable, Violation, ViolationKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entity {
    Group,
    Instructor,
}

impl Entity {
    fn id(self, session: &Session) -> &str {
        match self {
            Entity::Group => &session.group_id,
            Entity::Instructor => &session.instructor_id,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Entity::Group => "Group",
            Entity::Instructor => "Instructor",
        }
    }
}

/// A single penalised observation on a timetable.
enum Finding<'a> {
    Clash {
        kind: ViolationKind,
        value: &'a str,
        slot: SlotKey<'a>,
    },
    Overlap {
        slot: SlotKey<'a>,
        sessions: usize,
    },
    Overload {
        entity: Entity,
        id: &'a str,
        day: &'a str,
        count: usize,
    },
    Sparse {
        entity: Entity,
        id: &'a str,
        active_days: usize,
    },
}

/// Scores timetables; lower is better and 0 is a clean week.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitnessEvaluator {
    weights: FitnessWeights,
    load: LoadPolicy,
}

impl FitnessEvaluator {
    pub fn new(weights: FitnessWeights, load: LoadPolicy) -> Self {
        Self { weights, load }
    }

    pub fn from_config(config: &GaConfig) -> Self {
        Self::new(config.weights, config.load)
    }

    pub fn fitness(&self, timetable: &Timetable) -> u32 {
        let mut total = 0;
        self.walk(timetable, |finding| total = self.penalty(&finding).saturating_add(total));
        total
    }

    /// Same score as [`fitness`](Self::fitness), itemised.
    pub fn evaluate(&self, timetable: &Timetable) -> FitnessReport {
        let mut violations = Vec::new();
        self.walk(timetable, |finding| {
            violations.push(Violation {
                kind: self.kind(&finding),
                penalty: self.penalty(&finding),
                description: self.describe(&finding),
            })
        });
        FitnessReport {
            score: violations
                .iter()
                .fold(0u32, |total, v| total.saturating_add(v.penalty)),
            violations,
        }
    }

    fn walk<'a>(&self, timetable: &'a Timetable, mut emit: impl FnMut(Finding<'a>)) {
        let by_slot = timetable.iter().map(|s| (s.slot_key(), s)).into_group_map();

        for (slot, sessions) in by_slot.into_iter().sorted_by_key(|(slot, _)| *slot) {
            let mut instructors = HashSet::new();
            let mut groups = HashSet::new();
            let mut rooms = HashSet::new();

            for &s in &sessions {
                if !instructors.insert(s.instructor_id.as_str()) {
                    emit(Finding::Clash {
                        kind: ViolationKind::InstructorClash,
                        value: &s.instructor_id,
                        slot,
                    });
                }
                if !groups.insert(s.group_id.as_str()) {
                    emit(Finding::Clash {
                        kind: ViolationKind::GroupClash,
                        value: &s.group_id,
                        slot,
                    });
                }
                if !rooms.insert(s.location.as_str()) {
                    emit(Finding::Clash {
                        kind: ViolationKind::RoomClash,
                        value: &s.location,
                        slot,
                    });
                }
            }

            if sessions.len() > 1 {
                emit(Finding::Overlap {
                    slot,
                    sessions: sessions.len(),
                });
            }
        }

        for entity in [Entity::Group, Entity::Instructor] {
            let days_by_owner = timetable
                .iter()
                .map(|s| (entity.id(s), s.day.as_str()))
                .into_group_map();

            for (id, days) in days_by_owner.into_iter().sorted_by_key(|(id, _)| *id) {
                let per_day = days.iter().copied().counts();
                for (day, count) in per_day.iter().sorted_by_key(|(day, _)| **day) {
                    if *count > self.load.max_sessions_per_day {
                        emit(Finding::Overload {
                            entity,
                            id,
                            day: *day,
                            count: *count,
                        });
                    }
                }
                if days.len() >= self.load.min_active_days
                    && per_day.len() < self.load.min_active_days
                {
                    emit(Finding::Sparse {
                        entity,
                        id,
                        active_days: per_day.len(),
                    });
                }
            }
        }
    }

    fn penalty(&self, finding: &Finding<'_>) -> u32 {
        let w = &self.weights;
        match finding {
            Finding::Clash { kind, .. } => match kind {
                ViolationKind::InstructorClash => w.instructor_clash,
                ViolationKind::GroupClash => w.group_clash,
                _ => w.room_clash,
            },
            Finding::Overlap { sessions, .. } => (*sessions as u32 - 1).saturating_mul(w.overlap),
            Finding::Overload { count, .. } => {
                ((*count - self.load.max_sessions_per_day) as u32).saturating_mul(w.overload)
            }
            Finding::Sparse { .. } => w.sparse,
        }
    }

    fn kind(&self, finding: &Finding<'_>) -> ViolationKind {
        match finding {
            Finding::Clash { kind, .. } => *kind,
            Finding::Overlap { .. } => ViolationKind::SlotOverlap,
            Finding::Overload { .. } => ViolationKind::DailyOverload,
            Finding::Sparse { .. } => ViolationKind::SparseWeek,
        }
    }

    fn describe(&self, finding: &Finding<'_>) -> String {
        match finding {
            Finding::Clash { kind, value, slot } => format!(
                "{} '{}' is booked more than once on {} {}-{}.",
                match kind {
                    ViolationKind::InstructorClash => "Instructor",
                    ViolationKind::GroupClash => "Group",
                    _ => "Room",
                },
                value,
                slot.0,
                slot.1,
                slot.2
            ),
            Finding::Overlap { slot, sessions } => format!(
                "{} sessions share {} {}-{}.",
                sessions, slot.0, slot.1, slot.2
            ),
            Finding::Overload {
                entity,
                id,
                day,
                count,
            } => format!(
                "{} '{}' has {} sessions on {}, more than the limit of {}.",
                entity.label(),
                id,
                count,
                day,
                self.load.max_sessions_per_day
            ),
            Finding::Sparse {
                entity,
                id,
                active_days,
            } => format!(
                "{} '{}' is only active on {} day(s); at least {} expected.",
                entity.label(),
                id,
                active_days,
                self.load.min_active_days
            ),
        }
    }
}

/// Structural checks on a stored timetable: a slot used twice, or a session
/// with no module name.
pub fn detect_conflicts(timetable: &Timetable) -> Vec<ConflictIssue> {
    let mut issues = Vec::new();
    let mut used = HashSet::new();

    for s in timetable {
        let (day, start, end) = s.slot_key();
        if !used.insert(s.slot_key()) {
            issues.push(ConflictIssue {
                module_id: s.module_id.clone(),
                issue: format!("Duplicate session at {day}-{start}-{end}"),
            });
        }
        if s.module_name.trim().is_empty() {
            issues.push(ConflictIssue {
                module_id: s.module_id.clone(),
                issue: "Missing moduleName in session".to_string(),
            });
        }
    }

    issues
}
