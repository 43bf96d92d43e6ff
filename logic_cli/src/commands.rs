use std::fs;

use anyhow::{bail, Context, Result};
use logic_core::facade::DependencyConfig;
use logic_core::lua::StdModules;
use logic_core::{ApiObjects, LogicNode, Value};

use crate::cli::{LoadArgs, RunArgs, ValidateArgs};
use crate::report::{dump_all_outputs, dump_node_output, report_errors, report_warnings};

fn parse_set_flag(raw: &str) -> Result<(&str, f32)> {
    let (field, value) = raw.split_once('=').with_context(|| format!("--set '{raw}' is not FIELD=VALUE"))?;
    let value: f32 = value.parse().with_context(|| format!("--set '{raw}': '{value}' is not a float"))?;
    Ok((field, value))
}

pub fn run(args: RunArgs) -> Result<()> {
    let source = fs::read_to_string(&args.script).with_context(|| format!("reading {}", args.script.display()))?;
    let name = args.script.file_stem().and_then(|s| s.to_str()).unwrap_or("script").to_string();

    let mut engine = ApiObjects::new_headless()?;
    let handle = match engine.create_script(&name, &source, DependencyConfig { std_modules: StdModules::ALL, modules: &[] }) {
        Some(h) => h,
        None => {
            report_errors(&mut engine);
            bail!("'{name}' failed to compile");
        }
    };

    {
        let LogicNode::Script(script) = engine.node(handle).unwrap() else { unreachable!() };
        let mut tree = script.input_tree.borrow_mut();
        let root = tree.root();
        for raw in &args.inputs {
            let (field, value) = parse_set_flag(raw)?;
            let idx = tree.child_by_name(root, field).with_context(|| format!("'{name}' has no input field '{field}'"))?;
            tree.set_internal(idx, Value::Float(value))?;
        }
    }

    for tick in 0..args.ticks.max(1) {
        engine.update()?;
        if args.verbose || tick + 1 == args.ticks.max(1) {
            dump_node_output(&engine, handle, &name);
        }
    }
    report_errors(&mut engine);
    Ok(())
}

pub fn load(args: LoadArgs) -> Result<()> {
    let mut engine = logic_format::load(&args.save_file, Box::new(logic_core::nodes::NullSceneReceiver))
        .with_context(|| format!("loading {}", args.save_file.display()))?;

    for tick in 0..args.ticks.max(1) {
        engine.update()?;
        if args.verbose || tick + 1 == args.ticks.max(1) {
            dump_all_outputs(&engine);
        }
    }
    report_errors(&mut engine);
    Ok(())
}

pub fn validate(args: ValidateArgs) -> Result<()> {
    let engine = logic_format::load(&args.save_file, Box::new(logic_core::nodes::NullSceneReceiver))
        .with_context(|| format!("loading {}", args.save_file.display()))?;
    let warnings = engine.validate();
    if warnings.is_empty() {
        println!("[logic] no outstanding warnings");
    } else {
        report_warnings(&engine);
        bail!("{} outstanding warning(s)", warnings.len());
    }
    Ok(())
}
