//! Session state machine driving one reformat.
//!
//! ```text
//! IDLE -> CORRESPONDING -> AMBIGUITY_RESOLUTION -> CACHE_LOOKUP
//!      -> {CACHE_HIT | SYNTHESIZING} -> ASSEMBLED -> EXECUTED
//! ```
//!
//! Each [`Orchestrator`] action runs one transition to completion. Replacing
//! either dataset sends the session back to `IDLE` and drops everything
//! derived from the old pair. Failures of `choose`, `generate` and `run`
//! leave the session where it was so the action can be retried.

use std::fmt;

use log::{info, warn};

use crate::{
    choice::{AmbiguityResolver, ResolvedChoice},
    config::RemapConfig,
    correspond::{ColumnCorrespondence, MappingResolver},
    dataset::Dataset,
    error::{RemapError, RemapResult},
    oracle::{Oracle, OracleAnswer},
    program::MappingCode,
    runner,
    store::{CorrespondenceStore, MappingRecord},
    synth::Synthesizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Corresponding,
    AmbiguityResolution,
    CacheLookup,
    CacheHit,
    Synthesizing,
    Assembled,
    Executed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Idle => "IDLE",
            Stage::Corresponding => "CORRESPONDING",
            Stage::AmbiguityResolution => "AMBIGUITY_RESOLUTION",
            Stage::CacheLookup => "CACHE_LOOKUP",
            Stage::CacheHit => "CACHE_HIT",
            Stage::Synthesizing => "SYNTHESIZING",
            Stage::Assembled => "ASSEMBLED",
            Stage::Executed => "EXECUTED",
        };
        f.write_str(label)
    }
}

/// Reported after each synthesized column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub template_column: String,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Transient per-user state; nothing here is shared between sessions.
#[derive(Debug, Clone)]
pub struct Session {
    template: Option<Dataset>,
    input: Option<Dataset>,
    stage: Stage,
    correspondence: Option<ColumnCorrespondence>,
    choice: Option<ResolvedChoice>,
    code: Option<MappingCode>,
    from_cache: bool,
    output: Option<Dataset>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            template: None,
            input: None,
            stage: Stage::Idle,
            correspondence: None,
            choice: None,
            code: None,
            from_cache: false,
            output: None,
        }
    }

    pub fn with_datasets(template: Dataset, input: Dataset) -> Self {
        let mut session = Session::new();
        session.set_template(template);
        session.set_input(input);
        session
    }

    pub fn set_template(&mut self, template: Dataset) {
        self.template = Some(template);
        self.reset();
    }

    pub fn set_input(&mut self, input: Dataset) {
        self.input = Some(input);
        self.reset();
    }

    fn reset(&mut self) {
        if self.stage != Stage::Idle {
            info!("Dataset changed, discarding the {} session state", self.stage);
        }
        self.stage = Stage::Idle;
        self.correspondence = None;
        self.choice = None;
        self.code = None;
        self.from_cache = false;
        self.output = None;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn template(&self) -> Option<&Dataset> {
        self.template.as_ref()
    }

    pub fn input(&self) -> Option<&Dataset> {
        self.input.as_ref()
    }

    pub fn correspondence(&self) -> Option<&ColumnCorrespondence> {
        self.correspondence.as_ref()
    }

    pub fn choice(&self) -> Option<&ResolvedChoice> {
        self.choice.as_ref()
    }

    pub fn code(&self) -> Option<&MappingCode> {
        self.code.as_ref()
    }

    /// Whether the current code came from the store rather than synthesis.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn output(&self) -> Option<&Dataset> {
        self.output.as_ref()
    }

    fn stage_error(&self, action: &'static str) -> RemapError {
        RemapError::Stage {
            action,
            stage: self.stage.to_string(),
        }
    }
}

fn loaded<'a>(
    template: &'a Option<Dataset>,
    input: &'a Option<Dataset>,
) -> Option<(&'a Dataset, &'a Dataset)> {
    template.as_ref().zip(input.as_ref())
}

pub struct Orchestrator<'o> {
    oracle: &'o dyn Oracle,
    config: RemapConfig,
    store: CorrespondenceStore,
}

impl<'o> Orchestrator<'o> {
    pub fn new(oracle: &'o dyn Oracle, config: RemapConfig) -> Self {
        let store = CorrespondenceStore::new(config.store_dir.clone(), config.lookup);
        Orchestrator {
            oracle,
            config,
            store,
        }
    }

    pub fn config(&self) -> &RemapConfig {
        &self.config
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    /// Asks the oracle for a correspondence. A reply that does not parse
    /// leaves every template column unresolved instead of failing.
    pub fn correspond<'s>(&self, session: &'s mut Session) -> RemapResult<&'s ColumnCorrespondence> {
        let Some((template, input)) = loaded(&session.template, &session.input) else {
            return Err(session.stage_error("correspond"));
        };
        let previous = session.stage;
        session.stage = Stage::Corresponding;
        let resolver = MappingResolver::new(self.oracle, self.config.sample_rows);
        let answer = match resolver.request(template, input) {
            Ok(answer) => answer,
            Err(err) => {
                session.stage = previous;
                return Err(err);
            }
        };
        let correspondence = match answer {
            OracleAnswer::Parsed(correspondence) => correspondence,
            OracleAnswer::Malformed { reason, .. } => {
                warn!("Column map reply could not be parsed ({reason}); every column needs a manual choice");
                ColumnCorrespondence::unresolved(&template.headers)
            }
        };
        info!(
            "Column map has {} entr(ies), {} ambiguous",
            correspondence.len(),
            correspondence.ambiguous_count()
        );
        session.choice = None;
        session.code = None;
        session.from_cache = false;
        session.output = None;
        session.stage = Stage::AmbiguityResolution;
        Ok(session.correspondence.insert(correspondence))
    }

    /// Resolves every entry to one input column. An invalid pick changes nothing.
    pub fn choose<'s>(
        &self,
        session: &'s mut Session,
        resolver: &mut AmbiguityResolver<'_>,
    ) -> RemapResult<&'s ResolvedChoice> {
        let correspondence = match (&session.correspondence, session.stage) {
            (
                Some(correspondence),
                Stage::AmbiguityResolution | Stage::Assembled | Stage::Executed,
            ) => correspondence,
            _ => return Err(session.stage_error("choose")),
        };
        let Some((_, input)) = loaded(&session.template, &session.input) else {
            return Err(session.stage_error("choose"));
        };
        let choice = resolver.resolve_all(correspondence, &input.headers)?;
        session.code = None;
        session.from_cache = false;
        session.output = None;
        session.stage = Stage::AmbiguityResolution;
        Ok(session.choice.insert(choice))
    }

    /// Looks the pair up in the store and synthesizes only on a miss.
    pub fn generate<'s>(
        &self,
        session: &'s mut Session,
        progress: &mut dyn FnMut(&Progress),
    ) -> RemapResult<&'s MappingCode> {
        let choice = match (&session.choice, session.stage) {
            (Some(choice), Stage::AmbiguityResolution) => choice,
            _ => return Err(session.stage_error("generate code")),
        };
        let Some((template, input)) = loaded(&session.template, &session.input) else {
            return Err(session.stage_error("generate code"));
        };
        let previous = session.stage;

        session.stage = Stage::CacheLookup;
        if let Some(code) = self.store.lookup(self.oracle, &template.name, &input.name) {
            info!(
                "Reusing saved mapping for {} -> {}",
                input.name, template.name
            );
            session.from_cache = true;
            session.stage = Stage::Assembled;
            return Ok(session.code.insert(code));
        }

        session.stage = Stage::Synthesizing;
        let synthesizer = Synthesizer::new(self.oracle, &self.config);
        let total = choice.len();
        let mut fragments = Vec::with_capacity(total);
        for (idx, (template_column, input_column)) in choice.entries().iter().enumerate() {
            match synthesizer.synthesize(template, input, template_column, input_column) {
                Ok(fragment) => fragments.push(fragment),
                Err(err) => {
                    session.stage = previous;
                    return Err(err);
                }
            }
            progress(&Progress {
                completed: idx + 1,
                total,
                template_column: template_column.clone(),
            });
        }
        session.from_cache = false;
        session.stage = Stage::Assembled;
        Ok(session.code.insert(MappingCode::assemble(&fragments)))
    }

    /// Executes the assembled (or edited) code, then records it in the store.
    pub fn run<'s>(
        &self,
        session: &'s mut Session,
        edited: Option<MappingCode>,
    ) -> RemapResult<&'s Dataset> {
        if !matches!(session.stage, Stage::Assembled | Stage::Executed) {
            return Err(session.stage_error("run"));
        }
        let code = match edited.or_else(|| session.code.clone()) {
            Some(code) => code,
            None => return Err(session.stage_error("run")),
        };
        let Some((template, input)) = loaded(&session.template, &session.input) else {
            return Err(session.stage_error("run"));
        };
        let output = runner::execute(&code, template, input)?;
        let record: MappingRecord = self.store.record(&template.name, &input.name, &code)?;
        info!("Mapping recorded at {:?}", record.path);
        session.code = Some(code);
        session.stage = Stage::Executed;
        Ok(session.output.insert(output))
    }
}
