//! Black-box coverage for the `logic-cli` binary, one scenario per test,
//! matching `grim_engine/tests/*.rs`'s process-spawning style.

use std::fs;
use std::process::Command;

use logic_core::facade::DependencyConfig;
use logic_core::lua::StdModules;
use logic_core::ApiObjects;
use logic_format::SaveConfig;

const DOUBLER_SOURCE: &str = r#"
    function interface(IN, OUT)
        IN.x = FLOAT
        OUT.x = FLOAT
    end
    function run(IN, OUT)
        OUT.x = IN.x * 2
    end
"#;

#[test]
fn run_drives_a_script_file_and_prints_its_output() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("doubler.lua");
    fs::write(&script_path, DOUBLER_SOURCE).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_logic_cli"))
        .arg("run")
        .arg(&script_path)
        .arg("--set")
        .arg("x=3")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("x = 6"), "unexpected stdout: {stdout}");
}

#[test]
fn run_reports_a_missing_input_field_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("doubler.lua");
    fs::write(&script_path, DOUBLER_SOURCE).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_logic_cli"))
        .arg("run")
        .arg(&script_path)
        .arg("--set")
        .arg("not_a_field=1")
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn validate_reports_an_interface_with_no_outgoing_link() {
    let mut engine = ApiObjects::new_headless().unwrap();
    engine
        .create_interface("hub", &logic_core::TypeNode::Leaf(logic_core::ValueType::Float))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let save_path = dir.path().join("scene.logic");
    logic_format::save(&engine, &save_path, &SaveConfig { allow_validation_warnings: true }).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_logic_cli")).arg("validate").arg(&save_path).output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no outgoing link"), "unexpected stderr: {stderr}");
}

#[test]
fn load_runs_a_restored_linked_pair_and_prints_both_outputs() {
    let mut engine = ApiObjects::new_headless().unwrap();
    let doubler = engine
        .create_script("doubler", DOUBLER_SOURCE, DependencyConfig { std_modules: StdModules::ALL, modules: &[] })
        .unwrap();
    let logger = engine
        .create_script(
            "logger",
            r#"
                function interface(IN, OUT)
                    IN.x = FLOAT
                    OUT.y = FLOAT
                end
                function run(IN, OUT)
                    OUT.y = IN.x + 1
                end
            "#,
            DependencyConfig { std_modules: StdModules::ALL, modules: &[] },
        )
        .unwrap();
    let doubler_x_out = {
        let logic_core::LogicNode::Script(s) = engine.node(doubler).unwrap() else { panic!("expected script") };
        let tree = s.output_tree.borrow();
        tree.child_by_name(tree.root(), "x").unwrap()
    };
    let logger_x_in = {
        let logic_core::LogicNode::Script(s) = engine.node(logger).unwrap() else { panic!("expected script") };
        let tree = s.input_tree.borrow();
        tree.child_by_name(tree.root(), "x").unwrap()
    };
    engine
        .link(
            logic_core::PropertyRef::new(doubler.id(), logic_core::TreeSide::Output, doubler_x_out),
            logic_core::PropertyRef::new(logger.id(), logic_core::TreeSide::Input, logger_x_in),
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let save_path = dir.path().join("scene.logic");
    logic_format::save(&engine, &save_path, &SaveConfig::default()).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_logic_cli")).arg("load").arg(&save_path).output().unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("doubler"));
    assert!(stdout.contains("logger"));
}
