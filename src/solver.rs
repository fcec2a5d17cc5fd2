use log::{debug, info};
use rand::Rng;
use serde::Serialize;
use std::time::Instant;

use crate::config::GaConfig;
use crate::data::{Session, Timetable};
use crate::genetic::{GeneticOperators, Scored};

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Initialized,
    Iterating,
    /// Best-ever fitness reached 0.
    Converged,
    /// Generation budget spent without reaching 0.
    Exhausted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Converged | RunState::Exhausted)
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    pub best: Scored,
    /// Final generation, lowest penalty first; ties keep population order.
    pub ranked: Vec<Scored>,
    pub state: RunState,
    pub generations_run: usize,
    /// Best-ever fitness after each completed generation.
    pub history: Vec<u32>,
}

impl EvolutionOutcome {
    pub fn best_timetable(&self) -> &Timetable {
        &self.best.timetable
    }
}

/// Generational loop with elitist parent selection and best-ever tracking.
pub struct Evolution<'r, R: Rng + ?Sized> {
    operators: GeneticOperators,
    population_size: usize,
    generations: usize,
    rng: &'r mut R,
    population: Vec<Scored>,
    best: Scored,
    generation: usize,
    history: Vec<u32>,
    state: RunState,
}

impl<'r, R: Rng + ?Sized> Evolution<'r, R> {
    /// Builds the first population. `None` when the roster holds no usable
    /// requirement, in which case no schedule can be produced.
    pub fn new(roster: &[Session], config: &GaConfig, rng: &'r mut R) -> Option<Self> {
        let operators = GeneticOperators::from_config(config);
        let population: Vec<Scored> = operators
            .initial_population(roster, config.population_size, rng)
            .into_iter()
            .map(|t| operators.score(t))
            .collect();
        let best = population.iter().min_by_key(|s| s.fitness)?.clone();

        info!(
            "Initialised population of {} timetables with {} sessions each, best fitness {}.",
            population.len(),
            best.timetable.len(),
            best.fitness
        );

        Some(Self {
            operators,
            population_size: config.population_size,
            generations: config.generations,
            rng,
            population,
            best,
            generation: 0,
            history: Vec::new(),
            state: RunState::Initialized,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn best(&self) -> &Scored {
        &self.best
    }

    pub fn population(&self) -> &[Scored] {
        &self.population
    }

    /// Advances by at most one generation and returns the new state.
    pub fn step(&mut self) -> RunState {
        if self.state.is_terminal() {
            return self.state;
        }
        if self.best.fitness == 0 {
            self.state = RunState::Converged;
            return self.state;
        }
        if self.generation >= self.generations {
            self.state = RunState::Exhausted;
            return self.state;
        }
        self.state = RunState::Iterating;

        let Some((a, b)) = self.operators.select_parents(&self.population) else {
            self.state = RunState::Exhausted;
            return self.state;
        };
        let (a, b) = (a.timetable.clone(), b.timetable.clone());

        let mut next = Vec::with_capacity(self.population_size);
        while next.len() < self.population_size {
            let child = self.operators.crossover(&a, &b, self.rng);
            let child = self.operators.mutate(child, self.rng);
            next.push(self.operators.score(child));
        }
        self.population = next;
        self.generation += 1;

        if let Some(leader) = self.population.iter().min_by_key(|s| s.fitness) {
            debug!(
                "Generation {} | Best Fitness: {}",
                self.generation, leader.fitness
            );
            if leader.fitness < self.best.fitness {
                self.best = leader.clone();
            }
        }
        self.history.push(self.best.fitness);

        if self.best.fitness == 0 {
            info!("Perfect schedule found at generation {}.", self.generation);
            self.state = RunState::Converged;
        } else if self.generation >= self.generations {
            self.state = RunState::Exhausted;
        }
        self.state
    }

    pub fn run(mut self) -> EvolutionOutcome {
        while !self.step().is_terminal() {}

        let mut ranked = self.population;
        ranked.sort_by_key(|s| s.fitness);

        EvolutionOutcome {
            best: self.best,
            ranked,
            state: self.state,
            generations_run: self.generation,
            history: self.history,
        }
    }
}

/// Runs the genetic algorithm over `roster`. `None` means no schedule was
/// produced because the roster had nothing to place.
pub fn solve<R: Rng + ?Sized>(
    roster: &[Session],
    config: &GaConfig,
    rng: &mut R,
) -> Option<EvolutionOutcome> {
    let start_time = Instant::now();
    info!(
        "Starting genetic search over {} roster sessions ({} individuals, up to {} generations)...",
        roster.len(),
        config.population_size,
        config.generations
    );

    let outcome = Evolution::new(roster, config, rng)?.run();

    info!(
        "Search finished as {:?} after {} generations in {:.2?}, best fitness {}.",
        outcome.state,
        outcome.generations_run,
        start_time.elapsed(),
        outcome.best.fitness
    );
    Some(outcome)
}
