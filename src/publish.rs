use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ConfigError, GaConfig};
use crate::data::{BestSchedule, Publication, RankedSchedule, Session, Timetable};
use crate::fitness::FitnessEvaluator;
use crate::solver::{self, EvolutionOutcome};

pub const GENERATED_BY: &str = "AI Scheduler";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid role '{0}', expected student or lecturer")]
    InvalidRole(String),
    #[error("roster source failed: {0}")]
    Source(String),
    #[error("result sink failed: {0}")]
    Sink(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Whose timetable is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Lecturer,
}

impl FromStr for Role {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "lecturer" => Ok(Role::Lecturer),
            _ => Err(ScheduleError::InvalidRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => f.write_str("student"),
            Role::Lecturer => f.write_str("lecturer"),
        }
    }
}

/// Supplies the roster snapshot for one owner.
pub trait RosterSource {
    fn fetch_sessions(&self, owner: &str, role: Role) -> Result<Vec<Session>, ScheduleError>;
}

/// Persists the documents produced by a run.
pub trait ResultSink {
    fn save_ranked(&mut self, documents: &[RankedSchedule]) -> Result<(), ScheduleError>;
    fn save_best(&mut self, document: &BestSchedule) -> Result<(), ScheduleError>;
}

/// Rosters keyed by owner, used by the HTTP layer and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoster {
    rosters: HashMap<String, Vec<Session>>,
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner: impl Into<String>, sessions: Vec<Session>) {
        self.rosters.insert(owner.into(), sessions);
    }
}

impl RosterSource for InMemoryRoster {
    fn fetch_sessions(&self, owner: &str, _role: Role) -> Result<Vec<Session>, ScheduleError> {
        Ok(self.rosters.get(owner).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    pub ranked: Vec<RankedSchedule>,
    pub best: Vec<BestSchedule>,
}

impl ResultSink for InMemorySink {
    fn save_ranked(&mut self, documents: &[RankedSchedule]) -> Result<(), ScheduleError> {
        self.ranked.extend_from_slice(documents);
        Ok(())
    }

    fn save_best(&mut self, document: &BestSchedule) -> Result<(), ScheduleError> {
        self.best.push(document.clone());
        Ok(())
    }
}

/// Correlates every document of one run, e.g. `ana@uni.edu_gen_20240301_091500`.
pub fn batch_id(owner: &str, at: DateTime<Utc>) -> String {
    format!("{}_gen_{}", owner, at.format("%Y%m%d_%H%M%S"))
}

/// Copies calendar events from the roster onto the scheduled sessions by
/// (module, group, day, start). Sessions without a match get no event.
pub fn enrich(timetable: &Timetable, roster: &[Session]) -> Timetable {
    let events: HashMap<_, _> = roster
        .iter()
        .map(|s| (s.enrichment_key(), s.event.as_ref()))
        .collect();

    timetable
        .iter()
        .map(|s| Session {
            event: events.get(&s.enrichment_key()).copied().flatten().cloned(),
            ..s.clone()
        })
        .collect::<Vec<_>>()
        .into()
}

/// Turns a finished run into the best document and the ranked documents.
pub fn publication(
    owner: &str,
    outcome: &EvolutionOutcome,
    roster: &[Session],
    evaluator: &FitnessEvaluator,
    at: DateTime<Utc>,
) -> Publication {
    let batch = batch_id(owner, at);

    let ranked = outcome
        .ranked
        .iter()
        .enumerate()
        .map(|(i, scored)| RankedSchedule {
            owner: owner.to_string(),
            batch_id: batch.clone(),
            rank: i + 1,
            fitness_score: scored.fitness,
            generated_at: at,
            timetable: scored.timetable.clone(),
        })
        .collect();

    let timetable = enrich(outcome.best_timetable(), roster);
    let best = BestSchedule {
        owner: owner.to_string(),
        generated_by: GENERATED_BY.to_string(),
        fitness_score: evaluator.fitness(&timetable),
        batch_id: batch,
        generated_at: at,
        timetable,
    };

    Publication { best, ranked }
}

/// Fetches, optimises and stores one owner's timetable.
///
/// `Ok(None)` means the roster was empty and nothing was written.
pub fn run_for_owner<R: Rng + ?Sized>(
    owner: &str,
    role: Role,
    source: &impl RosterSource,
    sink: &mut impl ResultSink,
    config: &GaConfig,
    rng: &mut R,
) -> Result<Option<Publication>, ScheduleError> {
    config.validate()?;
    info!("Running scheduler for {} ({})", owner, role);

    let roster = source.fetch_sessions(owner, role)?;
    let Some(outcome) = solver::solve(&roster, config, rng) else {
        warn!("No valid sessions found for {}. Skipping.", owner);
        return Ok(None);
    };

    let published = publication(
        owner,
        &outcome,
        &roster,
        &FitnessEvaluator::from_config(config),
        Utc::now(),
    );
    sink.save_ranked(&published.ranked)?;
    sink.save_best(&published.best)?;
    info!(
        "Best schedule saved for {} | batch {} | fitness {}",
        owner, published.best.batch_id, published.best.fitness_score
    );

    Ok(Some(published))
}

/// Per-owner result of a bulk run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub owner: String,
    pub batch_id: Option<String>,
    pub fitness_score: Option<u32>,
    pub skipped: Option<String>,
}

/// Schedules several owners in turn. Invalid roles and empty rosters are
/// reported and skipped; source and sink failures abort the batch.
pub fn run_bulk<R: Rng + ?Sized>(
    owners: &[(String, String)],
    source: &impl RosterSource,
    sink: &mut impl ResultSink,
    config: &GaConfig,
    rng: &mut R,
) -> Result<Vec<BulkEntry>, ScheduleError> {
    let mut report = Vec::with_capacity(owners.len());

    for (owner, role) in owners {
        let skipped = |reason: String| BulkEntry {
            owner: owner.clone(),
            batch_id: None,
            fitness_score: None,
            skipped: Some(reason),
        };

        let role = match role.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                warn!("Skipping {} due to {}", owner, e);
                report.push(skipped(e.to_string()));
                continue;
            }
        };

        match run_for_owner(owner, role, source, sink, config, rng)? {
            Some(published) => report.push(BulkEntry {
                owner: owner.clone(),
                batch_id: Some(published.best.batch_id),
                fitness_score: Some(published.best.fitness_score),
                skipped: None,
            }),
            None => report.push(skipped("no valid sessions found".to_string())),
        }
    }

    Ok(report)
}
