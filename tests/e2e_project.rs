mod common;

use serde_json::json;
use std::collections::HashSet;
use tempfile::TempDir;

use spine_toolbox::{
    Connection, Engine, ExecutionRequest, ItemDict, ItemState, ItemType, Project, RunStatus,
    Settings, SqliteStorage, Storage,
};

#[test]
fn test_project_round_trip_keeps_items_and_specifications() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let project = common::pipeline_project(tmp_dir.path());

    let reopened = Project::open(project.dir()).expect("open project");
    assert_eq!(reopened.items().len(), 2);
    assert_eq!(
        reopened.item("Sum").and_then(|i| i.specification()),
        Some("Summer")
    );
    assert!(reopened.specifications.contains_key("Summer"));
    assert!(reopened.find_connection("Input Data", "Sum").is_some());
    assert_eq!(reopened.document, project.document);
}

#[test]
fn test_local_data_overrides_project_file() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let mut project = Project::create(tmp_dir.path(), "").expect("create project");
    project
        .add_item(
            "Store",
            ItemDict::new(ItemType::DataStore)
                .with_property("url", json!({"dialect": "sqlite", "database": ""})),
        )
        .expect("add item");
    project.save().expect("save project");

    let local_dir = project.dir().join(".spinetoolbox").join("local");
    std::fs::create_dir_all(&local_dir).expect("create local dir");
    std::fs::write(
        local_dir.join("project_local_data.json"),
        json!({"items": {"Store": {"url": {"database": "/var/db.sqlite"}}}}).to_string(),
    )
    .expect("write local data");

    let reopened = Project::open(project.dir()).expect("open project");
    let store = reopened.item("Store").expect("store exists");
    assert_eq!(
        store.database_url(reopened.dir()).as_deref(),
        Some("sqlite:////var/db.sqlite")
    );
}

#[test]
fn test_broken_specification_file_does_not_abort_loading() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let project = common::pipeline_project(tmp_dir.path());
    let spec_path = project.dir().join("specs").join("Summer").join("spec.json");
    std::fs::write(&spec_path, "{ not json").expect("corrupt spec");

    let reopened = Project::open(project.dir()).expect("open project");
    assert!(reopened.specifications.is_empty());
    assert_eq!(reopened.items().len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_selected_items_run_and_upstream_resources_still_flow() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let project = common::pipeline_project(&tmp_dir.path().join("project"));

    let settings = Settings {
        work_dir: Some(tmp_dir.path().join("work")),
        ..Settings::default()
    };
    let engine = Engine::new(settings).with_storage(Box::new(
        SqliteStorage::for_project(project.dir()).expect("create storage"),
    ));
    let request = ExecutionRequest {
        selected: Some(HashSet::from(["Sum".to_string()])),
        deselected: None,
    };
    let summary = engine.execute(&project, &request).await.expect("execute");

    assert!(summary.success());
    assert_eq!(summary.state_of("Input Data"), Some(ItemState::Skipped));
    assert_eq!(summary.state_of("Sum"), Some(ItemState::Completed));

    let storage = SqliteStorage::for_project(project.dir()).expect("open storage");
    let runs = storage.list().await.expect("list runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert!(runs[0].result_dir.is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_outputs_feed_downstream_tool() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let mut project = common::pipeline_project(&tmp_dir.path().join("project"));
    common::add_script_spec(
        &mut project,
        "Reporter",
        "cat total.txt > report.txt\n",
        |spec| {
            spec.inputfiles = vec!["total.txt".into()];
            spec.outputfiles = vec!["report.txt".into()];
        },
    );
    project
        .add_item("Report", common::tool_item("Reporter"))
        .expect("add tool");
    project
        .add_connection(Connection::new("Sum", "Report"))
        .expect("connect");

    let settings = Settings {
        work_dir: Some(tmp_dir.path().join("work")),
        ..Settings::default()
    };
    let summary = Engine::new(settings)
        .execute(&project, &ExecutionRequest::all())
        .await
        .expect("execute");

    assert!(summary.success());
    let result_dir = summary.items["Report"]
        .result_dir
        .clone()
        .expect("report archived");
    assert_eq!(
        std::fs::read_to_string(result_dir.join("report.txt")).expect("read report"),
        "1\n2\n3\n"
    );
}
