use itertools::Itertools;
use log::trace;
use rand::Rng;
use std::collections::{HashMap, HashSet};

use crate::data::{Session, Slot};

/// The fixed weekly grid: every day crossed with each pair of consecutive hours.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotGrid {
    days: Vec<String>,
    hours: Vec<String>,
}

impl SlotGrid {
    /// `hours` must hold at least two entries and `days` at least one;
    /// `GaConfig::validate` checks both before a grid is built.
    pub fn new(days: Vec<String>, hours: Vec<String>) -> Self {
        Self { days, hours }
    }

    pub fn len(&self) -> usize {
        self.days.len() * self.hours.len().saturating_sub(1)
    }

    pub fn random_slot<R: Rng + ?Sized>(&self, rng: &mut R) -> Slot {
        let day = &self.days[rng.random_range(0..self.days.len())];
        let start = rng.random_range(0..self.hours.len() - 1);
        Slot {
            day: day.clone(),
            start_time: self.hours[start].clone(),
            end_time: self.hours[start + 1].clone(),
        }
    }

    pub fn contains(&self, session: &Session) -> bool {
        self.days.contains(&session.day)
            && self
                .hours
                .iter()
                .tuple_windows::<(_, _)>()
                .any(|(start, end)| *start == session.start_time && *end == session.end_time)
    }
}

#[cfg(test)]
impl SlotGrid {
    pub fn slots(&self) -> Vec<Slot> {
        let windows: Vec<(&String, &String)> = self.hours.iter().tuple_windows().collect();
        self.days
            .iter()
            .cartesian_product(windows)
            .map(|(day, (start, end))| Slot {
                day: day.clone(),
                start_time: start.clone(),
                end_time: end.clone(),
            })
            .collect()
    }
}

/// Places sessions on the grid while steering clear of slots already used by
/// the same group or instructor.
///
/// Policy: best-effort bounded randomized local search with fallback-accept.
/// Each session gets up to `max_attempts` random draws; the first draw free
/// for both its group and its instructor wins. When the budget runs out the
/// last draw is kept even though it clashes, leaving the clash for the
/// fitness evaluator to score. Assignment itself never fails.
#[derive(Debug, Clone)]
pub struct SlotAssigner {
    grid: SlotGrid,
    max_attempts: usize,
}

impl SlotAssigner {
    pub fn new(grid: SlotGrid, max_attempts: usize) -> Self {
        Self {
            grid,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    /// Reassigns every session. Occupancy registries live only for this call.
    pub fn assign<R: Rng + ?Sized>(&self, sessions: Vec<Session>, rng: &mut R) -> Vec<Session> {
        let mut group_occupied: HashMap<String, HashSet<Slot>> = HashMap::new();
        let mut instructor_occupied: HashMap<String, HashSet<Slot>> = HashMap::new();
        let mut placed = Vec::with_capacity(sessions.len());

        for session in sessions {
            let mut attempts = 0;
            let slot = loop {
                let candidate = self.grid.random_slot(rng);
                attempts += 1;
                let group_free = group_occupied
                    .get(&session.group_id)
                    .is_none_or(|taken| !taken.contains(&candidate));
                let instructor_free = instructor_occupied
                    .get(&session.instructor_id)
                    .is_none_or(|taken| !taken.contains(&candidate));
                if group_free && instructor_free {
                    break candidate;
                }
                if attempts >= self.max_attempts {
                    trace!(
                        "No free slot for module {} / group {} after {} attempts, keeping {}",
                        session.module_id, session.group_id, attempts, candidate
                    );
                    break candidate;
                }
            };

            group_occupied
                .entry(session.group_id.clone())
                .or_default()
                .insert(slot.clone());
            instructor_occupied
                .entry(session.instructor_id.clone())
                .or_default()
                .insert(slot.clone());
            placed.push(session.with_slot(&slot));
        }

        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GaConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session(module: &str, group: &str, instructor: &str) -> Session {
        Session {
            module_id: module.into(),
            group_id: group.into(),
            instructor_id: instructor.into(),
            day: "TBD".into(),
            start_time: "--".into(),
            end_time: "--".into(),
            ..Default::default()
        }
    }

    fn tiny_grid() -> SlotGrid {
        SlotGrid::new(vec!["Monday".into()], vec!["08:00".into(), "09:00".into()])
    }

    #[test]
    fn test_default_grid_size() {
        let grid = GaConfig::default().grid();
        assert_eq!(grid.len(), 54);
        assert_eq!(grid.slots().len(), 54);
        assert!(grid.slots().iter().all(|s| s.start_time != "17:00"));
    }

    #[test]
    fn test_random_slot_is_on_grid() {
        let grid = GaConfig::default().grid();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let slot = grid.random_slot(&mut rng);
            assert!(grid.slots().contains(&slot));
        }
    }

    #[test]
    fn test_assign_avoids_shared_group_and_instructor() {
        let assigner = SlotAssigner::new(GaConfig::default().grid(), 200);
        let mut rng = StdRng::seed_from_u64(42);
        let sessions: Vec<Session> = (0..10)
            .map(|i| session(&format!("M{i}"), "G1", "I1"))
            .collect();

        let placed = assigner.assign(sessions, &mut rng);
        assert_eq!(placed.len(), 10);
        assert!(placed.iter().all(|s| assigner.grid().contains(s)));
        let distinct: HashSet<Slot> = placed.iter().map(Session::slot).collect();
        assert_eq!(distinct.len(), 10);
    }

    #[test]
    fn test_exhausted_budget_keeps_last_draw() {
        let assigner = SlotAssigner::new(tiny_grid(), 5);
        let mut rng = StdRng::seed_from_u64(3);
        let sessions = vec![
            session("M1", "G1", "I1"),
            session("M2", "G1", "I2"),
            session("M3", "G2", "I1"),
        ];

        let placed = assigner.assign(sessions, &mut rng);
        assert_eq!(placed.len(), 3);
        for s in &placed {
            assert_eq!(s.slot_key(), ("Monday", "08:00", "09:00"));
        }
    }

    #[test]
    fn test_assign_returns_new_values() {
        let assigner = SlotAssigner::new(GaConfig::default().grid(), 200);
        let mut rng = StdRng::seed_from_u64(9);
        let original = vec![session("M1", "G1", "I1")];
        let placed = assigner.assign(original.clone(), &mut rng);
        assert_eq!(original[0].day, "TBD");
        assert_ne!(placed[0].day, "TBD");
    }
}
