use itertools::Itertools;
use log::{trace, warn};
use rand::Rng;
use rand::seq::{SliceRandom, index};
use std::collections::HashSet;

use crate::config::GaConfig;
use crate::data::{Session, Timetable};
use crate::fitness::FitnessEvaluator;
use crate::slots::SlotAssigner;

/// A timetable together with its cached fitness.
#[derive(Debug, Clone)]
pub struct Scored {
    pub fitness: u32,
    pub timetable: Timetable,
}

/// Keeps the first session seen for every (module, group, instructor).
pub fn unique_requirements(roster: &[Session]) -> Vec<Session> {
    let mut seen = HashSet::new();
    roster
        .iter()
        .filter(|s| seen.insert(s.requirement_key()))
        .cloned()
        .collect()
}

/// Drops later sessions repeating an earlier requirement.
pub fn dedup_requirements(sessions: Vec<Session>) -> Vec<Session> {
    let mut seen = HashSet::new();
    let keep: Vec<bool> = sessions
        .iter()
        .map(|s| seen.insert(s.requirement_key()))
        .collect();
    sessions
        .into_iter()
        .zip(keep)
        .filter_map(|(s, keep)| keep.then_some(s))
        .collect()
}

/// With probability `rate`, swaps two distinct random positions.
/// Returns the swapped positions, if any.
pub fn swap_mutation<R: Rng + ?Sized>(
    timetable: &mut Timetable,
    rate: f64,
    rng: &mut R,
) -> Option<(usize, usize)> {
    if timetable.len() < 2 || !rng.random_bool(rate) {
        return None;
    }
    let picked = index::sample(rng, timetable.len(), 2);
    let (a, b) = (picked.index(0), picked.index(1));
    timetable.swap(a, b);
    Some((a, b))
}

/// Population initialisation plus the selection, crossover and mutation
/// operators, all sharing one slot assigner.
#[derive(Debug, Clone)]
pub struct GeneticOperators {
    assigner: SlotAssigner,
    evaluator: FitnessEvaluator,
    mutation_rate: f64,
}

impl GeneticOperators {
    pub fn new(assigner: SlotAssigner, evaluator: FitnessEvaluator, mutation_rate: f64) -> Self {
        Self {
            assigner,
            evaluator,
            mutation_rate,
        }
    }

    pub fn from_config(config: &GaConfig) -> Self {
        Self::new(
            SlotAssigner::new(config.grid(), config.max_slot_attempts),
            FitnessEvaluator::from_config(config),
            config.mutation_rate,
        )
    }

    pub fn evaluator(&self) -> &FitnessEvaluator {
        &self.evaluator
    }

    pub fn score(&self, timetable: Timetable) -> Scored {
        Scored {
            fitness: self.evaluator.fitness(&timetable),
            timetable,
        }
    }

    /// Builds `size` independently placed and shuffled copies of the
    /// deduplicated roster. Empty when the roster yields no requirement.
    pub fn initial_population<R: Rng + ?Sized>(
        &self,
        roster: &[Session],
        size: usize,
        rng: &mut R,
    ) -> Vec<Timetable> {
        let unique = unique_requirements(roster);
        trace!(
            "Roster of {} sessions reduced to {} unique requirements.",
            roster.len(),
            unique.len()
        );
        if unique.is_empty() {
            return Vec::new();
        }

        let capacity = self.assigner.grid().len();
        for (owner, count) in unique
            .iter()
            .flat_map(|s| [s.group_id.as_str(), s.instructor_id.as_str()])
            .counts()
        {
            if count > capacity {
                warn!(
                    "'{}' needs {} sessions but the grid only has {} slots; clashes are unavoidable.",
                    owner, count, capacity
                );
            }
        }

        (0..size)
            .map(|_| {
                let mut sessions = self.assigner.assign(unique.clone(), rng);
                sessions.shuffle(rng);
                Timetable::new(sessions)
            })
            .collect()
    }

    pub fn repair<R: Rng + ?Sized>(&self, timetable: Timetable, rng: &mut R) -> Timetable {
        Timetable::new(self.assigner.assign(timetable.into_sessions(), rng))
    }

    /// Elitist top-2: the two lowest-penalty members, ties going to the
    /// earlier one. A single-member population parents with itself.
    pub fn select_parents<'p>(&self, population: &'p [Scored]) -> Option<(&'p Scored, &'p Scored)> {
        let mut order: Vec<usize> = (0..population.len()).collect();
        order.sort_by_key(|&i| population[i].fitness);
        match order.as_slice() {
            [] => None,
            [only] => Some((&population[*only], &population[*only])),
            [first, second, ..] => Some((&population[*first], &population[*second])),
        }
    }

    /// First half of `a` followed by the second half of `b`, then re-placed.
    ///
    /// Repeated splice keys are dropped first. A requirement that still
    /// appears twice (the parents placed it differently) gives up its second
    /// position to a requirement the splice lost, taken in `b`'s order, so the
    /// child carries every requirement of its parents exactly once. A parent
    /// shorter than two sessions is not split; the other parent is copied.
    pub fn crossover<R: Rng + ?Sized>(&self, a: &Timetable, b: &Timetable, rng: &mut R) -> Timetable {
        if a.len() < 2 || b.len() < 2 {
            return if a.len() >= b.len() { a.clone() } else { b.clone() };
        }

        let mid = a.len() / 2;
        let tail = b.sessions().get(mid..).unwrap_or_default();
        let mut splice_seen = HashSet::new();
        let spliced: Vec<&Session> = a.sessions()[..mid]
            .iter()
            .chain(tail)
            .filter(|s| splice_seen.insert(s.splice_key()))
            .collect();

        let present: HashSet<_> = spliced.iter().map(|s| s.requirement_key()).collect();
        let mut queued = HashSet::new();
        let mut missing = b
            .iter()
            .chain(a.iter())
            .filter(|s| !present.contains(&s.requirement_key()))
            .filter(|s| queued.insert(s.requirement_key()));

        let mut seen = HashSet::new();
        let mut child: Vec<Session> = Vec::with_capacity(a.len());
        for s in spliced {
            if seen.insert(s.requirement_key()) {
                child.push(s.clone());
            } else if let Some(filler) = missing.next() {
                child.push(filler.clone());
            }
        }
        child.extend(missing.cloned());

        self.repair(Timetable::new(child), rng)
    }

    /// Applies [`swap_mutation`], then re-places and deduplicates.
    pub fn mutate<R: Rng + ?Sized>(&self, mut timetable: Timetable, rng: &mut R) -> Timetable {
        if timetable.len() < 2 {
            return timetable;
        }
        swap_mutation(&mut timetable, self.mutation_rate, rng);
        let repaired = self.repair(timetable, rng);
        Timetable::new(dedup_requirements(repaired.into_sessions()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session(module: &str, group: &str, instructor: &str) -> Session {
        Session {
            module_id: module.into(),
            module_name: format!("Module {module}"),
            group_id: group.into(),
            group_name: format!("Group {group}"),
            instructor_id: instructor.into(),
            location: format!("Room {module}"),
            day: "TBD".into(),
            start_time: "--".into(),
            end_time: "--".into(),
            ..Default::default()
        }
    }

    fn roster() -> Vec<Session> {
        vec![
            session("ModA", "Group1", "InstrX"),
            session("ModB", "Group1", "InstrX"),
            session("ModC", "Group2", "InstrY"),
        ]
    }

    fn operators(mutation_rate: f64) -> GeneticOperators {
        GeneticOperators::from_config(&GaConfig {
            mutation_rate,
            ..GaConfig::default()
        })
    }

    fn keys(t: &Timetable) -> Vec<String> {
        t.iter().map(|s| s.module_id.clone()).collect()
    }

    #[test]
    fn test_initial_population_overfull_grid_still_places_all() {
        let ops = GeneticOperators::from_config(&GaConfig {
            days: vec!["Monday".into()],
            hours: vec!["08:00".into(), "09:00".into()],
            ..GaConfig::default()
        });
        assert_eq!(ops.assigner.grid().len(), 1);
        let roster = vec![
            session("M1", "G1", "I1"),
            session("M2", "G1", "I2"),
            session("M3", "G1", "I3"),
        ];
        let mut rng = StdRng::seed_from_u64(8);

        let population = ops.initial_population(&roster, 4, &mut rng);
        assert_eq!(population.len(), 4);
        for t in &population {
            assert_eq!(t.len(), 3);
            assert!(t.iter().all(|s| s.day == "Monday" && s.start_time == "08:00"));
        }
    }

    #[test]
    fn test_initial_population_shape() {
        let ops = operators(0.1);
        let config = GaConfig::default();
        let grid = config.grid();
        let mut rng = StdRng::seed_from_u64(42);

        let population = ops.initial_population(&roster(), config.population_size, &mut rng);
        assert_eq!(population.len(), config.population_size);
        for t in &population {
            assert_eq!(t.len(), 3);
            assert!(t.iter().all(|s| grid.contains(s)));
            let shared: Vec<&Session> = t.iter().filter(|s| s.group_id == "Group1").collect();
            assert_eq!(shared.len(), 2);
            assert_ne!(shared[0].slot(), shared[1].slot());
        }
    }

    #[test]
    fn test_repeated_roster_entries_collapse() {
        let repeated: Vec<Session> = (0..10).map(|_| session("M1", "G1", "I1")).collect();
        assert_eq!(unique_requirements(&repeated).len(), 1);

        let mut rng = StdRng::seed_from_u64(1);
        let population = operators(0.1).initial_population(&repeated, 5, &mut rng);
        assert!(population.iter().all(|t| t.len() == 1));
    }

    #[test]
    fn test_empty_roster_gives_empty_population() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(operators(0.1).initial_population(&[], 20, &mut rng).is_empty());
    }

    #[test]
    fn test_select_parents_prefers_low_penalty_then_order() {
        let ops = operators(0.1);
        let mk = |fitness, module: &str| Scored {
            fitness,
            timetable: Timetable::new(vec![session(module, "G", "I")]),
        };
        let population = vec![mk(30, "a"), mk(10, "b"), mk(20, "c"), mk(10, "d")];
        let (first, second) = ops.select_parents(&population).unwrap();
        assert_eq!(keys(&first.timetable), vec!["b"]);
        assert_eq!(keys(&second.timetable), vec!["d"]);

        assert!(ops.select_parents(&[]).is_none());
        let single = vec![mk(5, "z")];
        let (a, b) = ops.select_parents(&single).unwrap();
        assert_eq!(a.fitness, b.fitness);
    }

    fn requirement_set(t: &Timetable) -> HashSet<(String, String, String)> {
        t.iter()
            .map(|s| (s.module_id.clone(), s.group_id.clone(), s.instructor_id.clone()))
            .collect()
    }

    fn at(mut s: Session, day: &str, start: &str, end: &str) -> Session {
        s.day = day.into();
        s.start_time = start.into();
        s.end_time = end.into();
        s
    }

    #[test]
    fn test_crossover_keeps_every_requirement() {
        let ops = operators(0.1);
        let mut rng = StdRng::seed_from_u64(7);
        let base: Vec<Session> = (0..24)
            .map(|i| session(&format!("M{i}"), &format!("G{}", i % 4), &format!("I{}", i % 3)))
            .collect();
        let population = ops.initial_population(&base, 6, &mut rng);

        for pair in population.windows(2) {
            let child = ops.crossover(&pair[0], &pair[1], &mut rng);
            assert_eq!(child.len(), pair[0].len());
            assert_eq!(requirement_set(&child), requirement_set(&pair[0]));
        }
    }

    #[test]
    fn test_crossover_drops_splice_repeats_and_refills() {
        let ops = operators(0.1);
        let mut rng = StdRng::seed_from_u64(13);
        let [w, x, y, z] = ["W", "X", "Y", "Z"].map(|m| session(m, &format!("G{m}"), &format!("I{m}")));
        let a = Timetable::new(vec![
            at(w.clone(), "Monday", "08:00", "09:00"),
            at(x.clone(), "Monday", "09:00", "10:00"),
            at(y.clone(), "Monday", "10:00", "11:00"),
            at(z.clone(), "Monday", "11:00", "12:00"),
        ]);

        // Tail repeats W and X in the same slots: the splice keys collide.
        let same_slots = Timetable::new(vec![
            at(y.clone(), "Monday", "10:00", "11:00"),
            at(z.clone(), "Monday", "11:00", "12:00"),
            at(w.clone(), "Monday", "08:00", "09:00"),
            at(x.clone(), "Monday", "09:00", "10:00"),
        ]);
        let child = ops.crossover(&a, &same_slots, &mut rng);
        assert_eq!(keys(&child), vec!["W", "X", "Y", "Z"]);

        // Tail repeats W and X elsewhere: the repeats give way to Y and Z.
        let moved = Timetable::new(vec![
            at(y, "Friday", "10:00", "11:00"),
            at(z, "Friday", "11:00", "12:00"),
            at(w, "Friday", "08:00", "09:00"),
            at(x, "Friday", "09:00", "10:00"),
        ]);
        let child = ops.crossover(&a, &moved, &mut rng);
        assert_eq!(keys(&child), vec!["W", "X", "Y", "Z"]);
    }

    #[test]
    fn test_crossover_keeps_halves_when_parents_agree() {
        let ops = operators(0.1);
        let mut rng = StdRng::seed_from_u64(11);
        let parent = Timetable::new(roster());
        let child = ops.crossover(&parent, &parent, &mut rng);
        assert_eq!(keys(&child), keys(&parent));
    }

    #[test]
    fn test_crossover_with_trivial_parent_copies_other() {
        let ops = operators(0.1);
        let mut rng = StdRng::seed_from_u64(2);
        let short = Timetable::new(vec![session("M9", "G9", "I9")]);
        let long = Timetable::new(roster());
        assert_eq!(ops.crossover(&short, &long, &mut rng), long);
        assert_eq!(ops.crossover(&long, &short, &mut rng), long);
    }

    #[test]
    fn test_mutation_rate_zero_keeps_order() {
        let ops = operators(0.0);
        let mut rng = StdRng::seed_from_u64(5);
        let t = Timetable::new(roster());
        for _ in 0..20 {
            let mut copy = t.clone();
            assert_eq!(swap_mutation(&mut copy, 0.0, &mut rng), None);
            assert_eq!(keys(&ops.mutate(t.clone(), &mut rng)), keys(&t));
        }
    }

    #[test]
    fn test_mutation_rate_one_swaps_two_positions() {
        let mut rng = StdRng::seed_from_u64(5);
        let t = Timetable::new(roster());
        for _ in 0..20 {
            let mut copy = t.clone();
            let (a, b) = swap_mutation(&mut copy, 1.0, &mut rng).unwrap();
            assert_ne!(a, b);
            let moved: Vec<usize> = (0..t.len())
                .filter(|&i| t.sessions()[i].module_id != copy.sessions()[i].module_id)
                .collect();
            assert_eq!(moved, {
                let mut v = vec![a, b];
                v.sort();
                v
            });
        }
    }

    #[test]
    fn test_mutation_of_single_session_is_noop() {
        let ops = operators(1.0);
        let mut rng = StdRng::seed_from_u64(5);
        let t = Timetable::new(vec![session("M1", "G1", "I1")]);
        assert_eq!(ops.mutate(t.clone(), &mut rng), t);
    }
}
