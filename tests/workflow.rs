mod common;

use std::fs;

use common::{FixedChoices, ScriptedOracle, TestWorkspace, input, template};
use csv_remap::{
    choice::AmbiguityResolver,
    config::LookupMode,
    correspond::Candidates,
    error::RemapError,
    program::{MappingCode, PROJECTION_STATEMENT},
    store::CorrespondenceStore,
    workflow::{Orchestrator, Progress, Session, Stage},
};

const EXACT_MAP: &str = r#"{"id": "uid", "amount": ["amt"]}"#;
const ID_ANSWER: &str = "The uid column already holds integers.\nFinal Answer: input_df['id']=input_df['uid']";
const AMOUNT_PROBE: &str = " look at the data first\nAction: dataset_eval\nAction Input: input_df.head()";
const AMOUNT_ANSWER: &str = " amt is a float like amount\nFinal Answer: input_df['amount']=input_df['amt']";

fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
    values
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
}

fn index_lines(workspace: &TestWorkspace) -> Vec<String> {
    fs::read_to_string(workspace.store_dir().join("index.txt"))
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[test]
fn end_to_end_reformat_synthesizes_assembles_and_runs() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&[EXACT_MAP, ID_ANSWER, AMOUNT_PROBE, AMOUNT_ANSWER]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    assert_eq!(session.stage(), Stage::Idle);

    let correspondence = orchestrator.correspond(&mut session).expect("correspond");
    assert_eq!(
        correspondence.get("id"),
        Some(&Candidates::Single("uid".to_string()))
    );
    assert_eq!(
        correspondence.get("amount"),
        Some(&Candidates::List(vec!["amt".to_string()]))
    );
    assert_eq!(session.stage(), Stage::AmbiguityResolution);

    let choice = orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");
    assert_eq!(choice.get("id"), Some("uid"));
    assert_eq!(choice.get("amount"), Some("amt"));

    let mut seen = Vec::new();
    let code = orchestrator
        .generate(&mut session, &mut |progress: &Progress| {
            seen.push((progress.completed, progress.total, progress.fraction()));
        })
        .expect("generate")
        .clone();
    assert_eq!(seen, vec![(1, 2, 0.5), (2, 2, 1.0)]);
    assert!(
        code.text()
            .starts_with("input_df['id']=input_df['uid']\ninput_df['amount']=input_df['amt']\n")
    );
    assert!(code.text().trim_end().ends_with(PROJECTION_STATEMENT));
    assert_eq!(session.stage(), Stage::Assembled);
    assert!(!session.from_cache());

    let prompts = oracle.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[1].contains("mapping the column uid in input_df"));
    assert!(prompts[3].contains("Observation: |"));
    assert_eq!(oracle.remaining(), 0);

    let output = orchestrator.run(&mut session, None).expect("run");
    assert_eq!(output.headers, vec!["id".to_string(), "amount".to_string()]);
    assert_eq!(output.rows, rows(&[&["7", "1.5"], &["8", "3.25"]]));
    assert_eq!(session.stage(), Stage::Executed);

    let lines = index_lines(&workspace);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("File name for mapping input.csv to template.csv: "));
    let saved = fs::read_to_string(workspace.store_dir().join("input-template.txt"))
        .expect("saved mapping");
    assert_eq!(saved, code.text());
}

#[test]
fn stored_mapping_skips_synthesis() {
    let workspace = TestWorkspace::new();
    let store = CorrespondenceStore::new(workspace.store_dir(), LookupMode::Oracle);
    let stored = MappingCode::assemble(&[
        "input_df['id'] = input_df['uid']",
        "input_df['amount'] = input_df['amt']",
    ]);
    let record = store
        .record("template.csv", "input.csv", &stored)
        .expect("seed store");

    let located = format!("`{}`", record.path.display());
    let oracle = ScriptedOracle::new(&[EXACT_MAP, located.as_str()]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");
    orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");

    let mut progress_calls = 0;
    let code = orchestrator
        .generate(&mut session, &mut |_: &Progress| progress_calls += 1)
        .expect("generate")
        .clone();
    assert_eq!(progress_calls, 0);
    assert_eq!(code, stored);
    assert_eq!(session.stage(), Stage::Assembled);
    assert!(session.from_cache());
    assert_eq!(oracle.calls(), 2);
    assert!(oracle.prompts()[1].contains("mapping input.csv to template.csv"));

    let output = orchestrator.run(&mut session, None).expect("run cached code");
    assert_eq!(output.rows, rows(&[&["7", "1.5"], &["8", "3.25"]]));
}

#[test]
fn stale_store_answer_falls_back_to_synthesis() {
    let workspace = TestWorkspace::new();
    fs::create_dir_all(workspace.store_dir()).expect("store dir");
    fs::write(
        workspace.store_dir().join("index.txt"),
        "File name for mapping input.csv to template.csv: saved/gone.txt\n",
    )
    .expect("seed index");

    let oracle = ScriptedOracle::new(&[EXACT_MAP, "saved/gone.txt", ID_ANSWER, AMOUNT_ANSWER]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");
    orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");
    let mut progress_calls = 0;
    orchestrator
        .generate(&mut session, &mut |_: &Progress| progress_calls += 1)
        .expect("generate");
    assert_eq!(progress_calls, 2);
    assert!(!session.from_cache());
    assert_eq!(oracle.remaining(), 0);
}

#[test]
fn replacing_input_after_assembly_resets_session() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&[EXACT_MAP, ID_ANSWER, AMOUNT_ANSWER]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");
    orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");
    orchestrator
        .generate(&mut session, &mut |_: &Progress| {})
        .expect("generate");
    assert_eq!(session.stage(), Stage::Assembled);

    session.set_input(input());
    assert_eq!(session.stage(), Stage::Idle);
    assert!(session.correspondence().is_none());
    assert!(session.choice().is_none());
    assert!(session.code().is_none());

    let err = orchestrator
        .run(&mut session, None)
        .expect_err("nothing to run after reset");
    assert!(matches!(err, RemapError::Stage { action: "run", .. }));
}

#[test]
fn invalid_choice_halts_without_persisting() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&[r#"{"id": ["uid", "ts"], "amount": "amt"}"#]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");

    let mut bogus = FixedChoices::new(&["bogus"]);
    let err = orchestrator
        .choose(&mut session, &mut AmbiguityResolver::interactive(&mut bogus))
        .expect_err("bogus pick");
    assert!(err.is_invalid_choice());
    assert_eq!(session.stage(), Stage::AmbiguityResolution);
    assert!(session.choice().is_none());
    assert!(!workspace.store_dir().join("index.txt").exists());
    assert_eq!(bogus.asked.len(), 1);
    assert_eq!(bogus.asked[0].template_column, "id");

    let mut valid = FixedChoices::new(&["ts"]);
    let choice = orchestrator
        .choose(&mut session, &mut AmbiguityResolver::interactive(&mut valid))
        .expect("retry with a listed column");
    assert_eq!(choice.get("id"), Some("ts"));
    assert_eq!(choice.get("amount"), Some("amt"));
}

#[test]
fn unparseable_correspondence_degrades_to_unresolved() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&["Sorry, I am not able to map these columns."]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());

    let correspondence = orchestrator.correspond(&mut session).expect("degraded correspond");
    assert!(
        correspondence
            .entries()
            .iter()
            .all(|(_, candidates)| *candidates == Candidates::Unresolved)
    );
    assert_eq!(correspondence.len(), 2);

    let choice = orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("automatic choice");
    assert_eq!(choice.get("id"), Some("uid"));
    assert_eq!(choice.get("amount"), Some("uid"));
}

#[test]
fn actions_out_of_order_are_rejected() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&[]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());

    let mut empty = Session::new();
    let err = orchestrator.correspond(&mut empty).expect_err("no datasets");
    assert!(matches!(err, RemapError::Stage { action: "correspond", .. }));

    let mut session = Session::with_datasets(template(), input());
    let err = orchestrator
        .generate(&mut session, &mut |_: &Progress| {})
        .expect_err("no choice yet");
    assert!(matches!(err, RemapError::Stage { .. }));
    assert_eq!(oracle.calls(), 0);
}

#[test]
fn failed_run_keeps_assembled_state_and_store_untouched() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&[
        EXACT_MAP,
        ID_ANSWER,
        "Final Answer: input_df['amount']=input_df['missing']",
    ]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");
    orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");
    orchestrator
        .generate(&mut session, &mut |_: &Progress| {})
        .expect("generate");

    let err = orchestrator.run(&mut session, None).expect_err("missing column");
    assert!(matches!(err, RemapError::Execution(_)));
    assert_eq!(session.stage(), Stage::Assembled);
    assert!(session.output().is_none());
    assert!(index_lines(&workspace).is_empty());

    let edited = MappingCode::from_text(
        "amount = amt * 2\nid = uid\noutput_df = input_df[template_df.columns]\n",
    );
    let output = orchestrator
        .run(&mut session, Some(edited.clone()))
        .expect("edited code runs");
    assert_eq!(output.rows, rows(&[&["7", "3"], &["8", "6.5"]]));
    assert_eq!(session.code(), Some(&edited));
    assert_eq!(session.stage(), Stage::Executed);
}

#[test]
fn running_again_reexecutes_and_appends_a_record() {
    let workspace = TestWorkspace::new();
    let oracle = ScriptedOracle::new(&[EXACT_MAP, ID_ANSWER, AMOUNT_ANSWER]);
    let orchestrator = Orchestrator::new(&oracle, workspace.config());
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");
    orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");
    orchestrator
        .generate(&mut session, &mut |_: &Progress| {})
        .expect("generate");

    orchestrator.run(&mut session, None).expect("first run");
    orchestrator.run(&mut session, None).expect("second run");
    assert_eq!(session.stage(), Stage::Executed);

    let lines = index_lines(&workspace);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], lines[1]);
    let mapping_files = fs::read_dir(workspace.store_dir())
        .expect("store dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() != "index.txt")
        .count();
    assert_eq!(mapping_files, 1);
}

#[test]
fn agent_without_final_answer_gives_up() {
    let workspace = TestWorkspace::new();
    let mut config = workspace.config();
    config.max_agent_iterations = 2;
    let oracle = ScriptedOracle::new(&[EXACT_MAP, "hmm", "still thinking"]);
    let orchestrator = Orchestrator::new(&oracle, config);
    let mut session = Session::with_datasets(template(), input());
    orchestrator.correspond(&mut session).expect("correspond");
    orchestrator
        .choose(&mut session, &mut AmbiguityResolver::automatic())
        .expect("choose");

    let err = orchestrator
        .generate(&mut session, &mut |_: &Progress| {})
        .expect_err("agent exhausted");
    assert!(matches!(err, RemapError::Agent { iterations: 2 }));
    assert_eq!(session.stage(), Stage::AmbiguityResolution);
    assert!(session.code().is_none());
    assert!(oracle.prompts()[2].contains("Invalid Format"));
}
