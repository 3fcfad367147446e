//! End-to-end engine scenarios against a scripted generator.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use draftgate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use draftgate::errors::WorkflowError;
use draftgate::gate::ReviewDecision;
use draftgate::generator::{PromptMessage, Role, TextGenerator};
use draftgate::orchestrator::{RunStatus, WorkflowEngine};
use draftgate::pipeline::{PipelineFile, StageDef, blog_pipeline};
use draftgate::stage::{COMPLETE, StageMachine};
use draftgate::state::{FeedbackDecision, GateState};

type Respond = dyn Fn(&str, usize) -> Result<String> + Send + Sync;

/// Records every user prompt and answers through a closure that also sees
/// the call index.
struct Scripted {
    prompts: Mutex<Vec<String>>,
    respond: Box<Respond>,
}

impl Scripted {
    fn new(respond: impl Fn(&str, usize) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    /// Answers `v1`, `v2`, ... in call order.
    fn versions() -> Arc<Self> {
        Self::new(|_, n| Ok(format!("v{}", n + 1)))
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String> {
        let user = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(user.clone());
            prompts.len() - 1
        };
        (self.respond)(&user, n)
    }
}

fn two_stage_pipeline() -> PipelineFile {
    PipelineFile {
        name: "plan-design".into(),
        description: String::new(),
        stages: vec![
            StageDef::new("planning", "", "Plan: {{input.requirements}}", vec![]),
            StageDef::new(
                "design",
                "",
                "Design for:\n{{artifact.planning}}",
                vec!["planning".into()],
            ),
        ],
    }
}

fn inputs() -> BTreeMap<String, String> {
    let mut inputs = BTreeMap::new();
    inputs.insert("requirements".to_string(), "Todo app".to_string());
    inputs
}

fn engine_with(
    pipeline: PipelineFile,
    generator: Arc<Scripted>,
) -> (WorkflowEngine, Arc<MemoryCheckpointStore>) {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(
        StageMachine::new(pipeline).unwrap(),
        generator,
        store.clone(),
    );
    (engine, store)
}

mod review_cycle {
    use super::*;

    #[tokio::test]
    async fn test_reject_then_approve() {
        let generator = Scripted::versions();
        let (engine, store) = engine_with(two_stage_pipeline(), generator.clone());

        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();
        assert_eq!(run.status, RunStatus::Suspended);
        assert_eq!(run.current_stage, "planning");
        assert_eq!(run.artifacts["planning"], "v1");
        assert_eq!(run.pending_artifact(), Some("v1"));
        assert_eq!(generator.calls(), 1);

        let run = engine
            .resume("s1", Some(ReviewDecision::reject("too short")))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Suspended);
        assert_eq!(run.current_stage, "planning");
        assert_eq!(run.artifacts["planning"], "v2");
        assert_eq!(run.checkpoint.feedback["planning"], vec!["too short"]);
        assert!(generator.prompt(1).contains("too short"));
        assert!(generator.prompt(1).contains("v1"));

        let run = engine
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Suspended);
        assert_eq!(run.current_stage, "design");
        assert_eq!(run.artifacts["planning"], "v2");
        assert_eq!(run.artifacts["design"], "v3");
        assert!(generator.prompt(2).contains("v2"));
        assert_eq!(run.checkpoint.history.len(), 2);
        assert_eq!(run.checkpoint.feedback["planning"], vec!["too short"]);

        let saved = store.load("s1").unwrap().unwrap();
        assert_eq!(saved, run.checkpoint);
        assert_eq!(saved.gate, GateState::AwaitingReview);
        assert_eq!(saved.feedback_decision, FeedbackDecision::Unset);
    }

    #[tokio::test]
    async fn test_approving_last_stage_completes() {
        let generator = Scripted::versions();
        let (engine, _) = engine_with(two_stage_pipeline(), generator.clone());

        engine.start(inputs(), Some("s1".into())).await.unwrap();
        engine
            .resume("s1", Some(ReviewDecision::approve("good")))
            .await
            .unwrap();
        let run = engine
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.current_stage, COMPLETE);
        assert_eq!(run.checkpoint.gate, GateState::RoutedAccept);
        assert!(run.pending_artifact().is_none());
        assert_eq!(run.checkpoint.feedback["planning"], vec!["good"]);
        assert!(!run.checkpoint.feedback.contains_key("design"));
        assert_eq!(generator.calls(), 2);

        let stages: Vec<_> = run
            .checkpoint
            .history
            .iter()
            .map(|h| h.stage.as_str())
            .collect();
        assert_eq!(stages, vec!["planning", "design", COMPLETE]);
    }

    #[tokio::test]
    async fn test_missing_decision_is_reject() {
        let generator = Scripted::versions();
        let (engine, _) = engine_with(two_stage_pipeline(), generator.clone());

        engine.start(inputs(), Some("s1".into())).await.unwrap();
        let run = engine.resume("s1", None).await.unwrap();

        assert_eq!(run.current_stage, "planning");
        assert_eq!(run.checkpoint.feedback["planning"], vec![""]);
        assert_eq!(run.artifacts["planning"], "v2");
    }

    #[tokio::test]
    async fn test_run_on_suspended_state_is_idempotent() {
        let generator = Scripted::versions();
        let (engine, store) = engine_with(two_stage_pipeline(), generator.clone());

        let first = engine.start(inputs(), Some("s1".into())).await.unwrap();
        let again = engine.run_session("s1").await.unwrap();

        assert_eq!(again.status, RunStatus::Suspended);
        assert_eq!(again.checkpoint, first.checkpoint);
        assert_eq!(store.load("s1").unwrap().unwrap(), first.checkpoint);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_generated_session_ids_are_distinct() {
        let (engine, _) = engine_with(two_stage_pipeline(), Scripted::versions());

        let a = engine.start(inputs(), None).await.unwrap();
        let b = engine.start(inputs(), None).await.unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(engine.sessions().unwrap().len(), 2);
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_resume_without_checkpoint() {
        let (engine, _) = engine_with(two_stage_pipeline(), Scripted::versions());

        let err = engine
            .resume("missing", Some(ReviewDecision::approve("")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::NoCheckpoint { ref session_id } if session_id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_resume_completed_session() {
        let generator = Scripted::versions();
        let pipeline = PipelineFile {
            name: "auto".into(),
            description: String::new(),
            stages: vec![StageDef::new("draft", "", "Draft", vec![]).without_review()],
        };
        let (engine, _) = engine_with(pipeline, generator);

        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let err = engine
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotAwaitingReview { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_stage_in_checkpoint() {
        let (engine, store) = engine_with(two_stage_pipeline(), Scripted::versions());

        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();
        let mut state = run.checkpoint;
        state.current_stage = "archaeology".into();
        store.save(&state).unwrap();

        let err = engine.run_session("s1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStage { ref stage } if stage == "archaeology"));

        let err = engine
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStage { .. }));
    }

    #[tokio::test]
    async fn test_checkpoint_from_other_pipeline() {
        let (engine, _) = engine_with(two_stage_pipeline(), Scripted::versions());
        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();

        let mut state = run.checkpoint;
        state.pipeline = "blog".into();
        let err = engine.run(state).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPipeline(_)));
    }

    #[tokio::test]
    async fn test_pipeline_mismatch_reported_before_stage() {
        let (engine, store) = engine_with(two_stage_pipeline(), Scripted::versions());
        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();

        let mut state = run.checkpoint;
        state.pipeline = "blog".into();
        state.current_stage = "outline".into();
        store.save(&state).unwrap();

        let err = engine
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPipeline(ref msg) if msg.contains("blog")));
    }

    #[tokio::test]
    async fn test_duplicate_session_id() {
        let (engine, _) = engine_with(two_stage_pipeline(), Scripted::versions());
        engine.start(inputs(), Some("s1".into())).await.unwrap();

        let err = engine.start(inputs(), Some("s1".into())).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}

mod generation {
    use super::*;

    #[tokio::test]
    async fn test_missing_upstream_stores_sentinel_without_calling() {
        let generator = Scripted::versions();
        let (engine, store) = engine_with(two_stage_pipeline(), generator.clone());

        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();
        let mut state = run.checkpoint;
        state.artifacts.remove("planning");
        state.current_stage = "design".into();
        state.gate = GateState::AwaitingGeneration;
        store.save(&state).unwrap();

        let run = engine.run_session("s1").await.unwrap();
        assert_eq!(run.status, RunStatus::Suspended);
        let design = &run.artifacts["design"];
        assert!(design.contains("not yet available"));
        assert!(design.contains("planning"));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_generator_failure_becomes_reviewable_marker() {
        let generator = Scripted::new(|_, n| {
            if n == 0 {
                anyhow::bail!("rate limited")
            }
            Ok("recovered".into())
        });
        let (engine, _) = engine_with(two_stage_pipeline(), generator.clone());

        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();
        assert_eq!(run.status, RunStatus::Suspended);
        let marker = &run.artifacts["planning"];
        assert!(marker.starts_with("[generation failed for stage 'planning'"));
        assert!(marker.contains("rate limited"));

        let run = engine
            .resume("s1", Some(ReviewDecision::reject("try again")))
            .await
            .unwrap();
        assert_eq!(run.artifacts["planning"], "recovered");
    }

    #[tokio::test]
    async fn test_unreviewed_stages_run_through() {
        let generator = Scripted::versions();
        let pipeline = PipelineFile {
            name: "auto".into(),
            description: String::new(),
            stages: vec![
                StageDef::new("a", "", "A", vec![]).without_review(),
                StageDef::new("b", "", "B from {{artifact.a}}", vec!["a".into()]).without_review(),
                StageDef::new("c", "", "C from {{artifact.b}}", vec!["b".into()]),
            ],
        };
        let (engine, _) = engine_with(pipeline, generator.clone());

        let run = engine.start(inputs(), Some("s1".into())).await.unwrap();
        assert_eq!(run.status, RunStatus::Suspended);
        assert_eq!(run.current_stage, "c");
        assert_eq!(run.artifacts["c"], "v3");
        assert_eq!(generator.prompt(1), "B from v1");
        assert_eq!(generator.prompt(2), "C from v2");
    }
}

mod routing {
    use super::*;

    #[tokio::test]
    async fn test_reject_routes_back_to_earlier_stage() {
        let generator = Scripted::versions();
        let mut pipeline = two_stage_pipeline();
        pipeline.stages[1] = pipeline.stages[1].clone().with_reject_route("planning");
        let (engine, _) = engine_with(pipeline, generator.clone());

        engine.start(inputs(), Some("s1".into())).await.unwrap();
        engine
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap();
        let run = engine
            .resume("s1", Some(ReviewDecision::reject("plan lacks storage")))
            .await
            .unwrap();

        assert_eq!(run.current_stage, "planning");
        assert_eq!(run.checkpoint.feedback["design"], vec!["plan lacks storage"]);
        assert_eq!(
            run.checkpoint.feedback["planning"],
            vec!["[from design] plan lacks storage"]
        );
        assert_eq!(run.artifacts["planning"], "v3");
        assert!(generator.prompt(2).contains("plan lacks storage"));

        let stages: Vec<_> = run
            .checkpoint
            .history
            .iter()
            .map(|h| h.stage.as_str())
            .collect();
        assert_eq!(stages, vec!["planning", "design", "planning"]);
    }
}

mod fan_out {
    use super::*;

    #[tokio::test]
    async fn test_blog_sections_generated_per_outline_item() {
        let generator = Scripted::new(|prompt, _| {
            if prompt.starts_with("Write an outline") {
                return Ok("# Intro\n- Ownership\n- Borrowing".into());
            }
            if prompt.contains("\"Borrowing\"") {
                anyhow::bail!("section backend down");
            }
            Ok(format!("body of {}", prompt.lines().next().unwrap_or_default()))
        });
        let (engine, _) = engine_with(blog_pipeline(), generator.clone());

        let mut inputs = BTreeMap::new();
        inputs.insert("topic".to_string(), "Rust".to_string());
        engine.start(inputs, Some("blog".into())).await.unwrap();
        let run = engine
            .resume("blog", Some(ReviewDecision::approve("")))
            .await
            .unwrap();

        assert_eq!(run.current_stage, "sections");
        let sections = &run.artifacts["sections"];
        let intro = sections.find("## Intro").unwrap();
        let ownership = sections.find("## Ownership").unwrap();
        let borrowing = sections.find("## Borrowing").unwrap();
        assert!(intro < ownership && ownership < borrowing);
        assert!(sections.contains("body of Write the section \"Ownership\""));
        assert!(sections.contains("section backend down"));
        assert_eq!(generator.calls(), 4);
    }
}

mod persistence {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_resume_from_fresh_engine_over_file_store() {
        let dir = tempdir().unwrap();
        let generator = Scripted::versions();

        let first = WorkflowEngine::new(
            StageMachine::new(two_stage_pipeline()).unwrap(),
            generator.clone(),
            Arc::new(FileCheckpointStore::new(dir.path().to_path_buf())),
        );
        let run = first.start(inputs(), Some("s1".into())).await.unwrap();
        drop(first);

        let second = WorkflowEngine::new(
            StageMachine::new(two_stage_pipeline()).unwrap(),
            generator.clone(),
            Arc::new(FileCheckpointStore::new(dir.path().to_path_buf())),
        );
        let status = second.status("s1").unwrap();
        assert_eq!(status, run.checkpoint);

        let run = second
            .resume("s1", Some(ReviewDecision::approve("")))
            .await
            .unwrap();
        assert_eq!(run.current_stage, "design");
        assert!(second.reset("s1").unwrap());
        assert!(!second.reset("s1").unwrap());
        assert!(second.sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_source_is_persisted() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("plan-design.json").display().to_string();
        let engine = WorkflowEngine::new(
            StageMachine::new(two_stage_pipeline()).unwrap(),
            Scripted::versions(),
            Arc::new(FileCheckpointStore::new(dir.path().to_path_buf())),
        )
        .with_pipeline_source(source.clone());

        engine.start(inputs(), Some("s1".into())).await.unwrap();
        let saved = engine.status("s1").unwrap();
        assert_eq!(saved.pipeline, "plan-design");
        assert_eq!(saved.pipeline_source.as_deref(), Some(source.as_str()));

        let (plain, _) = engine_with(two_stage_pipeline(), Scripted::versions());
        let run = plain.start(inputs(), Some("s2".into())).await.unwrap();
        assert!(run.checkpoint.pipeline_source.is_none());
    }
}
