//! `SceneReceiver` adapters outside the core engine.
//!
//! `logic_core::nodes::SceneReceiver` is deliberately minimal glue, the way
//! `grim_engine::lua_host::context::audio::AudioCallback` lets the Lua host
//! push music/sfx events without knowing which concrete audio backend is
//! listening. This crate supplies the one concrete receiver every other
//! crate here needs: a recording adapter for tests, demos, and the CLI
//! harness, grounded on `grim_engine::audio_bridge::RecordingAudioCallback`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use logic_core::nodes::{BindingKind, PendingValue, SceneReceiver};
use logic_core::{LogicError, Value};

/// One recorded push: which external object, which binding kind, and the
/// path-qualified leaf values that were pending.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingUpdate {
    pub external_ref: String,
    pub kind: BindingKind,
    pub values: Vec<(String, Value)>,
}

/// A `SceneReceiver` that records every push instead of forwarding it to a
/// real scene. Scene id resolution is driven by an explicit registry rather
/// than a fixed answer, so callers can exercise both the resolved and
/// unresolved paths (`logic_format`'s load-time and save-time scene checks
/// in particular).
///
/// Cheap to clone: the log and registry live behind `Rc<RefCell<_>>`, so a
/// clone still observes pushes made through the original (or any other
/// clone), the same sharing `RecordingAudioCallback` relies on.
#[derive(Clone, Default)]
pub struct RecordingSceneReceiver {
    scenes: Rc<RefCell<HashMap<String, u64>>>,
    updates: Rc<RefCell<Vec<BindingUpdate>>>,
}

impl RecordingSceneReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `external_ref` as resolving to `scene_id`. An
    /// `external_ref` that is never registered resolves to `None`, the
    /// same as a real scene that doesn't recognize the object.
    pub fn register(&self, external_ref: impl Into<String>, scene_id: u64) {
        self.scenes.borrow_mut().insert(external_ref.into(), scene_id);
    }

    pub fn updates(&self) -> Vec<BindingUpdate> {
        self.updates.borrow().clone()
    }

    pub fn clear(&self) {
        self.updates.borrow_mut().clear();
    }
}

impl SceneReceiver for RecordingSceneReceiver {
    fn external_scene_id(&self, external_ref: &str) -> Option<u64> {
        self.scenes.borrow().get(external_ref).copied()
    }

    fn push_values(&mut self, external_ref: &str, kind: BindingKind, values: &[PendingValue]) -> Result<(), LogicError> {
        let values = values.iter().map(|v| (v.path.clone(), v.value.clone())).collect();
        self.updates.borrow_mut().push(BindingUpdate { external_ref: external_ref.to_string(), kind, values });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logic_core::facade::DependencyConfig;
    use logic_core::lua::StdModules;
    use logic_core::types::property::TreeSide;
    use logic_core::{ApiObjects, LogicNode, PropertyRef};

    #[test]
    fn unregistered_external_ref_resolves_to_none() {
        let receiver = RecordingSceneReceiver::new();
        assert_eq!(receiver.external_scene_id("scene_obj_1"), None);
        receiver.register("scene_obj_1", 7);
        assert_eq!(receiver.external_scene_id("scene_obj_1"), Some(7));
    }

    #[test]
    fn binding_update_drives_a_recorded_push() {
        let receiver = RecordingSceneReceiver::new();
        receiver.register("scene_obj_1", 0);
        let mut engine = ApiObjects::new(Box::new(receiver.clone())).unwrap();

        let schema = BindingKind::NodeTransform.fixed_schema().unwrap();
        let binding = engine.create_binding("xform", BindingKind::NodeTransform, "scene_obj_1", &schema);
        let script = engine
            .create_script(
                "driver",
                r#"
                    function interface(IN, OUT)
                        OUT.tx = FLOAT
                    end
                    function run(IN, OUT)
                        OUT.tx = 5
                    end
                "#,
                DependencyConfig { std_modules: StdModules::ALL, modules: &[] },
            )
            .unwrap();
        // `OUT.tx = FLOAT` still wraps in a `Struct`, and the fixed
        // NodeTransform schema sorts its six fields alphabetically, so
        // neither side's "tx" sits at its tree's root index.
        let script_tx_out = {
            let LogicNode::Script(s) = engine.node(script).unwrap() else { panic!("expected script") };
            let tree = s.output_tree.borrow();
            tree.child_by_name(tree.root(), "tx").unwrap()
        };
        let binding_tx_in = {
            let LogicNode::Binding(b) = engine.node(binding).unwrap() else { panic!("expected binding") };
            let tree = b.input_tree.borrow();
            tree.child_by_name(tree.root(), "tx").unwrap()
        };
        engine
            .link(
                PropertyRef::new(script.id(), TreeSide::Output, script_tx_out),
                PropertyRef::new(binding.id(), TreeSide::Input, binding_tx_in),
            )
            .unwrap();

        engine.update().unwrap();

        let updates = receiver.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].external_ref, "scene_obj_1");
        assert_eq!(updates[0].kind, BindingKind::NodeTransform);
        assert_eq!(updates[0].values, vec![("tx".to_string(), Value::Float(5.0))]);
    }
}
