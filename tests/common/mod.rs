#![allow(dead_code)]

use serde_json::json;
use std::path::{Path, PathBuf};

use spine_toolbox::project::SerializedPath;
use spine_toolbox::{Connection, ItemDict, ItemType, Project, ToolSpecification, ToolType};

/// Write a shell-script specification under `<project>/specs/<name>` and
/// register it with the project.
pub fn add_script_spec(
    project: &mut Project,
    name: &str,
    script: &str,
    edit: impl FnOnce(&mut ToolSpecification),
) -> PathBuf {
    let spec_dir = project.dir().join("specs").join(name);
    std::fs::create_dir_all(&spec_dir).expect("create spec dir");
    std::fs::write(spec_dir.join("run.sh"), script).expect("write script");

    let mut spec = ToolSpecification::new(name, ToolType::Executable, "run.sh");
    edit(&mut spec);
    let path = spec_dir.join("spec.json");
    spec.save(&path).expect("save spec");
    project.add_specification(&path).expect("register spec");
    path
}

pub fn tool_item(spec: &str) -> ItemDict {
    ItemDict::new(ItemType::Tool).with_property("specification", json!(spec))
}

/// Data Connection referencing files of the project
pub fn data_connection(project: &Project, files: &[&Path]) -> ItemDict {
    let references: Vec<SerializedPath> = files
        .iter()
        .map(|f| SerializedPath::from_path(f, project.dir()))
        .collect();
    ItemDict::new(ItemType::DataConnection).with_property("file_references", json!(references))
}

/// A saved project: "Input Data" (Data Connection) -> "Sum" (Tool).
///
/// The tool copies `numbers.csv` into `out/total.txt` and prints "summed".
pub fn pipeline_project(dir: &Path) -> Project {
    let mut project = Project::create(dir, "pipeline").expect("create project");

    let data_dir = project.dir().join("data");
    std::fs::create_dir_all(&data_dir).expect("create data dir");
    let numbers = data_dir.join("numbers.csv");
    std::fs::write(&numbers, "1\n2\n3\n").expect("write numbers");

    add_script_spec(
        &mut project,
        "Summer",
        "mkdir -p out\ncp numbers.csv out/total.txt\necho summed\n",
        |spec| {
            spec.inputfiles = vec!["numbers.csv".into()];
            spec.outputfiles = vec!["out/*.txt".into()];
        },
    );
    let dc = data_connection(&project, &[&numbers]);
    project.add_item("Input Data", dc).expect("add data connection");
    project.add_item("Sum", tool_item("Summer")).expect("add tool");
    project
        .add_connection(Connection::new("Input Data", "Sum"))
        .expect("connect items");
    project.save().expect("save project");
    project
}
