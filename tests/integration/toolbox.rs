//! Orchestration tool surface tests.

use serde_json::json;

use crew::core::task::TaskStatus;
use crew::orchestration::{CrewToolbox, ReportStatus, Synthesizer, ToolOutput};
use crew::Error;

use crate::fixtures::{pool_with, MockLlm, Script, ScriptedAgent};

fn toolbox(agent: &std::sync::Arc<ScriptedAgent>) -> (CrewToolbox, std::sync::Arc<MockLlm>) {
    let llm = MockLlm::replying("Synthesized summary.");
    let toolbox = CrewToolbox::new(pool_with(2, agent), Synthesizer::new(llm.clone()));
    (toolbox, llm)
}

fn text(output: ToolOutput) -> String {
    match output {
        ToolOutput::Text(text) => text,
        ToolOutput::Complete(report) => panic!("Expected text, got report {:?}", report),
    }
}

#[tokio::test]
async fn test_spawn_and_wait() {
    let agent = ScriptedAgent::new();
    agent.script("scan", Script::Succeed("3 ports open".to_string()));
    let (toolbox, _) = toolbox(&agent);

    let spawned = text(
        toolbox
            .invoke("spawn_agent", json!({"task": "scan", "priority": 3}))
            .await
            .unwrap(),
    );
    assert_eq!(spawned, "Spawned agent-0: scan");

    let waited = text(
        toolbox
            .invoke("wait_for_agents", json!({"agent_ids": ["agent-0"]}))
            .await
            .unwrap(),
    );
    assert_eq!(
        waited,
        "## agent-0: scan\nStatus: completed\nTools used: echo\nResult:\n3 ports open\n"
    );
}

#[tokio::test]
async fn test_wait_with_nothing_spawned() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());
    let waited = text(toolbox.invoke("wait_for_agents", json!({})).await.unwrap());
    assert_eq!(waited, "No agents to wait for.");
}

#[tokio::test]
async fn test_spawn_with_dependencies() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());

    toolbox
        .invoke("spawn_agent", json!({"task": "first"}))
        .await
        .unwrap();
    let second = text(
        toolbox
            .invoke("spawn_agent", json!({"task": "second", "depends_on": ["agent-0"]}))
            .await
            .unwrap(),
    );
    assert_eq!(second, "Spawned agent-1: second");

    let err = toolbox
        .invoke("spawn_agent", json!({"task": "third", "depends_on": ["agent-9"]}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownDependency(_)));
}

#[tokio::test]
async fn test_non_canonical_ids_do_not_alias() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());
    toolbox
        .invoke("spawn_agent", json!({"task": "first"}))
        .await
        .unwrap();
    toolbox.invoke("wait_for_agents", json!({})).await.unwrap();

    for alias in ["agent-00", "agent-+0"] {
        let status = text(
            toolbox
                .invoke("get_agent_status", json!({"agent_id": alias}))
                .await
                .unwrap(),
        );
        assert_eq!(status, format!("Agent {} not found.", alias));
    }

    let err = toolbox
        .invoke("spawn_agent", json!({"task": "second", "depends_on": ["agent-00"]}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTaskId(ref id) if id == "agent-00"));
    assert_eq!(toolbox.pool().get_workers().len(), 1);
}

#[tokio::test]
async fn test_spawn_requires_task() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());
    assert!(toolbox.invoke("spawn_agent", json!({})).await.is_err());
    assert!(toolbox
        .invoke("spawn_agent", json!({"task": ""}))
        .await
        .is_err());
}

#[tokio::test]
async fn test_get_agent_status() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());
    toolbox
        .invoke("spawn_agent", json!({"task": "check"}))
        .await
        .unwrap();
    toolbox.invoke("wait_for_agents", json!({})).await.unwrap();

    let status = text(
        toolbox
            .invoke("get_agent_status", json!({"agent_id": "agent-0"}))
            .await
            .unwrap(),
    );
    let record: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(record["id"], "agent-0");
    assert_eq!(record["status"], "completed");
    assert_eq!(record["result"], "result for check");

    let missing = text(
        toolbox
            .invoke("get_agent_status", json!({"agent_id": "agent-7"}))
            .await
            .unwrap(),
    );
    assert_eq!(missing, "Agent agent-7 not found.");
}

#[tokio::test]
async fn test_cancel_agent() {
    let agent = ScriptedAgent::new();
    agent.script("spinner", Script::UntilCancelled);
    let (toolbox, _) = toolbox(&agent);

    toolbox
        .invoke("spawn_agent", json!({"task": "spinner"}))
        .await
        .unwrap();
    let cancelled = text(
        toolbox
            .invoke("cancel_agent", json!({"agent_id": "agent-0"}))
            .await
            .unwrap(),
    );
    assert_eq!(cancelled, "Cancelled agent-0");

    let again = text(
        toolbox
            .invoke("cancel_agent", json!({"agent_id": "agent-0"}))
            .await
            .unwrap(),
    );
    assert_eq!(again, "Could not cancel agent-0 (not running or not found)");

    let bogus = text(
        toolbox
            .invoke("cancel_agent", json!({"agent_id": "nobody"}))
            .await
            .unwrap(),
    );
    assert_eq!(bogus, "Could not cancel nobody (not running or not found)");
}

#[tokio::test]
async fn test_finish_returns_completion_report() {
    let agent = ScriptedAgent::new();
    agent.script("breaks", Script::Fail("no route".to_string()));
    let (toolbox, llm) = toolbox(&agent);

    toolbox
        .invoke("spawn_agent", json!({"task": "works"}))
        .await
        .unwrap();
    toolbox
        .invoke("spawn_agent", json!({"task": "breaks"}))
        .await
        .unwrap();

    let output = toolbox
        .invoke("finish", json!({"context": "Network sweep"}))
        .await
        .unwrap();
    let report = output.completion().expect("finish should complete").clone();

    assert_eq!(report.status, ReportStatus::Partial);
    assert_eq!(report.summary, "Synthesized summary.");
    assert_eq!(llm.calls(), 1);
    assert_eq!(toolbox.pool().finish_tokens(), crate::fixtures::MOCK_TOKENS);
    assert!(toolbox
        .pool()
        .get_workers()
        .iter()
        .all(|w| w.status == TaskStatus::Completed || w.status == TaskStatus::Failed));
}

#[tokio::test]
async fn test_finish_with_no_agents() {
    let (toolbox, llm) = toolbox(&ScriptedAgent::new());

    let output = toolbox.invoke("finish", serde_json::Value::Null).await.unwrap();
    let report = output.completion().unwrap();

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(report.summary, "Task completed. No agents were spawned.");
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_formulate_strategy() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());

    let decision = text(
        toolbox
            .invoke(
                "formulate_strategy",
                json!({
                    "problem": "WAF blocks payloads",
                    "candidates": [
                        {"id": "1", "name": "Encode payloads", "pros": "quiet", "cons": "slow", "risk": "Low"},
                        {"id": "2", "name": "Find origin IP", "pros": "bypasses WAF", "cons": "may fail", "risk": "Medium"}
                    ],
                    "selected_id": "2",
                    "rationale": "Origin exposure is common"
                }),
            )
            .await
            .unwrap(),
    );

    assert!(decision.starts_with("## Strategic Decision: Find origin IP"));
    assert!(decision.contains("- **Find origin IP** (SELECTED)"));

    let err = toolbox
        .invoke(
            "formulate_strategy",
            json!({"problem": "x", "rationale": "y", "selected_id": "3", "candidates": []}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_unknown_tool_rejected() {
    let (toolbox, _) = toolbox(&ScriptedAgent::new());
    let err = toolbox.invoke("delete_everything", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_specs_list_six_tools() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let (toolbox, _) = toolbox(&ScriptedAgent::new());
    let names: Vec<String> = toolbox.specs().into_iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            "spawn_agent",
            "wait_for_agents",
            "get_agent_status",
            "cancel_agent",
            "finish",
            "formulate_strategy"
        ]
    );
}
