//! Engine façade: the single owner of every object's lifetime, the Lua
//! state, the link graph, and the error log.
//!
//! Grounded on `original_source/lib/internals/ApiObjects.h`'s role as the
//! one place that owns every logic object and mediates creation,
//! destruction, linking, and `update()`; the typed-handle-returning
//! `create_*` surface and the construction-errors-log-don't-throw policy
//! mirror `original_source/src/include/internals/ErrorReporting.h`.

use std::collections::HashMap;

use crate::error::{LogicError, LogicErrorLog, SourceLocation};
use crate::graph::LinkGraph;
use crate::ids::{IdAllocator, NodeId, UserId};
use crate::lua::sandbox::{ScriptHost, StdModules};
use crate::nodes::{
    AnimationChannel, AnimationChannelSources, AnimationNode, BindingKind, BindingNode, DataArray, DataArrayValues,
    InterfaceNode, LogicNode, ModuleNode, NodeHeader, NullSceneReceiver, Script, SceneReceiver, ScriptConfig, TimerMode,
    TimerNode,
};
use crate::types::property::{PropertyRef, TreeSide};
use crate::types::schema::TypeNode;
use crate::types::value::{Value, ValueType};

/// A stable reference to a logic object, returned by every `create_*`
/// call. Opaque outside the crate: callers never construct one from a
/// bare id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub(crate) NodeId);

impl ObjectHandle {
    pub fn id(self) -> NodeId {
        self.0
    }
}

/// Module/script compile-time dependency configuration, at the façade
/// boundary: a dependent script/module names each dependency and the
/// already-created module it resolves to.
pub struct DependencyConfig<'a> {
    pub std_modules: StdModules,
    pub modules: &'a [(&'a str, ObjectHandle)],
}

pub struct AnimationChannelConfig {
    pub name: String,
    pub timestamps: ObjectHandle,
    pub keyframes: ObjectHandle,
    pub mode: crate::nodes::InterpolationMode,
    pub in_tangents: Option<ObjectHandle>,
    pub out_tangents: Option<ObjectHandle>,
}

/// The engine: owns every logic object, the link graph, the single Lua
/// state, and the accumulating error log. `ApiObjects` is a value --
/// there is no global engine state (§9 "Global state: none").
pub struct ApiObjects {
    nodes: HashMap<NodeId, LogicNode>,
    id_alloc: IdAllocator,
    link_graph: LinkGraph,
    script_host: ScriptHost,
    scene: Box<dyn SceneReceiver>,
    error_log: LogicErrorLog,
}

fn read_property_value(nodes: &HashMap<NodeId, LogicNode>, pref: PropertyRef) -> Option<Value> {
    let node = nodes.get(&pref.node)?;
    let tree = node.tree(pref.side)?;
    let value = tree.borrow().get_prop(pref.index).value.clone();
    value
}

fn write_property_value(nodes: &HashMap<NodeId, LogicNode>, pref: PropertyRef, value: Value) -> Result<bool, LogicError> {
    let node = nodes
        .get(&pref.node)
        .ok_or_else(|| LogicError::UnknownProperty(format!("{:?}", pref.node)))?;
    let tree = node
        .tree(pref.side)
        .ok_or_else(|| LogicError::UnknownProperty(format!("{:?} has no {:?} tree", pref.node, pref.side)))?;
    tree.borrow_mut().set_internal(pref.index, value)
}

fn property_value_type(nodes: &HashMap<NodeId, LogicNode>, pref: PropertyRef) -> Option<ValueType> {
    let node = nodes.get(&pref.node)?;
    let tree = node.tree(pref.side)?;
    let ty = tree.borrow().get_prop(pref.index).value_type;
    Some(ty)
}

/// Peeks (without consuming) whether any leaf under `idx` still has its
/// "new binding value pending" flag set -- used by `validate` to flag
/// bindings whose inputs were written but never drained by `update`.
fn pending_leaf_exists(tree: &crate::types::property::PropertyTree, idx: crate::types::property::PropertyIndex) -> bool {
    let child_count = tree.child_count(idx);
    if child_count == 0 {
        return tree.get_prop(idx).binding_pending;
    }
    (0..child_count).any(|i| pending_leaf_exists(tree, tree.child_by_index(idx, i).expect("index within child_count")))
}

/// Collects every leaf descendant of `idx` into `out`, `idx` itself
/// included when it is already a leaf -- an interface's schema is the raw
/// `TypeNode` a caller passed to `create_interface`, so unlike a script's
/// always-`Struct`-wrapped tree, `idx` may be a single leaf with no
/// children at all.
fn collect_leaves(
    tree: &crate::types::property::PropertyTree,
    idx: crate::types::property::PropertyIndex,
    out: &mut Vec<crate::types::property::PropertyIndex>,
) {
    let child_count = tree.child_count(idx);
    if child_count == 0 {
        out.push(idx);
        return;
    }
    for i in 0..child_count {
        collect_leaves(tree, tree.child_by_index(idx, i).expect("index within child_count"), out);
    }
}

/// Resolves declared dependency names to the already-compiled modules the
/// caller handed in. A free function (not a `&self` method) so the
/// borrow it takes is scoped to `nodes` alone, not the whole engine --
/// `create_script`/`create_module` still need to mutate other fields
/// (the id allocator, the node map itself) right after this returns.
fn resolve_modules<'a>(
    nodes: &'a HashMap<NodeId, LogicNode>,
    deps: &[(&'a str, ObjectHandle)],
) -> Result<Vec<(&'a str, &'a ModuleNode)>, LogicError> {
    let mut resolved = Vec::with_capacity(deps.len());
    for &(name, handle) in deps {
        match nodes.get(&handle.0) {
            Some(LogicNode::Module(m)) => resolved.push((name, m)),
            _ => return Err(LogicError::UnknownModule(name.to_string())),
        }
    }
    Ok(resolved)
}

impl ApiObjects {
    pub fn new(scene: Box<dyn SceneReceiver>) -> Result<Self, LogicError> {
        Ok(Self {
            nodes: HashMap::new(),
            id_alloc: IdAllocator::new(),
            link_graph: LinkGraph::new(),
            script_host: ScriptHost::new()?,
            scene,
            error_log: LogicErrorLog::new(),
        })
    }

    /// An engine with no scene behind its bindings -- every binding
    /// update drains its dirty flags and pushes nowhere.
    pub fn new_headless() -> Result<Self, LogicError> {
        Self::new(Box::new(NullSceneReceiver))
    }

    pub fn replace_scene_receiver(&mut self, scene: Box<dyn SceneReceiver>) -> Box<dyn SceneReceiver> {
        std::mem::replace(&mut self.scene, scene)
    }

    /// Read access to the scene receiver -- `logic_format` uses this at
    /// save time to check every binding resolves to the same external
    /// scene, and at load time to check a restored binding's external_ref
    /// still resolves against the caller-supplied receiver.
    pub fn scene(&self) -> &dyn SceneReceiver {
        self.scene.as_ref()
    }

    /// The Lua state backing every script/module this engine owns.
    /// `logic_format` needs this to recompile a `Script`/`ModuleNode` read
    /// back from a save file, the same way `create_script`/`create_module`
    /// compile a freshly-authored one.
    pub fn lua(&self) -> &mlua::Lua {
        self.script_host.lua()
    }

    /// Compiles and inserts a script. On failure the error is appended to
    /// the log and no object is created (§7's construction-time policy).
    pub fn create_script(&mut self, name: &str, source: &str, config: DependencyConfig<'_>) -> Option<ObjectHandle> {
        let resolved = match resolve_modules(&self.nodes, config.modules) {
            Ok(r) => r,
            Err(err) => {
                self.error_log.push(err);
                return None;
            }
        };
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        match Script::compile(
            self.script_host.lua(),
            header,
            source,
            ScriptConfig { std_modules: config.std_modules, resolved_modules: &resolved },
        ) {
            Ok(script) => {
                self.nodes.insert(id, LogicNode::Script(script));
                Some(ObjectHandle(id))
            }
            Err(err) => {
                self.error_log.push_with_location(err, None, SourceLocation { chunk_name: name.to_string(), line: 0 });
                None
            }
        }
    }

    pub fn create_module(&mut self, name: &str, source: &str, config: DependencyConfig<'_>) -> Option<ObjectHandle> {
        let resolved = match resolve_modules(&self.nodes, config.modules) {
            Ok(r) => r,
            Err(err) => {
                self.error_log.push(err);
                return None;
            }
        };
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        match ModuleNode::compile(self.script_host.lua(), header, source, config.std_modules, &resolved) {
            Ok(module) => {
                self.nodes.insert(id, LogicNode::Module(module));
                Some(ObjectHandle(id))
            }
            Err(err) => {
                self.error_log.push(err);
                None
            }
        }
    }

    pub fn create_interface(&mut self, name: &str, schema: &TypeNode) -> Option<ObjectHandle> {
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        match InterfaceNode::new(header, schema) {
            Ok(node) => {
                self.nodes.insert(id, LogicNode::Interface(node));
                Some(ObjectHandle(id))
            }
            Err(err) => {
                self.error_log.push(err);
                None
            }
        }
    }

    pub fn create_data_array(&mut self, name: &str, values: DataArrayValues) -> ObjectHandle {
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        self.nodes.insert(id, LogicNode::DataArray(DataArray::new(header, values)));
        ObjectHandle(id)
    }

    pub fn create_animation_node(&mut self, name: &str, channels: Vec<AnimationChannelConfig>) -> Option<ObjectHandle> {
        let mut built = Vec::with_capacity(channels.len());
        for cfg in channels {
            let timestamps = match self.data_array_values(cfg.timestamps) {
                Some(v) => v,
                None => {
                    self.error_log.push(LogicError::IllegalArgument(format!(
                        "animation channel '{}': timestamps is not a data array",
                        cfg.name
                    )));
                    return None;
                }
            };
            let keyframes = match self.data_array_values(cfg.keyframes) {
                Some(v) => v,
                None => {
                    self.error_log.push(LogicError::IllegalArgument(format!(
                        "animation channel '{}': keyframes is not a data array",
                        cfg.name
                    )));
                    return None;
                }
            };
            let in_tangents = match cfg.in_tangents.map(|h| self.data_array_values(h)) {
                Some(Some(v)) => Some(v),
                Some(None) => {
                    self.error_log.push(LogicError::IllegalArgument(format!(
                        "animation channel '{}': in_tangents is not a data array",
                        cfg.name
                    )));
                    return None;
                }
                None => None,
            };
            let out_tangents = match cfg.out_tangents.map(|h| self.data_array_values(h)) {
                Some(Some(v)) => Some(v),
                Some(None) => {
                    self.error_log.push(LogicError::IllegalArgument(format!(
                        "animation channel '{}': out_tangents is not a data array",
                        cfg.name
                    )));
                    return None;
                }
                None => None,
            };
            let sources = AnimationChannelSources {
                timestamps: cfg.timestamps.0,
                keyframes: cfg.keyframes.0,
                in_tangents: cfg.in_tangents.map(|h| h.0),
                out_tangents: cfg.out_tangents.map(|h| h.0),
            };
            match AnimationChannel::new(cfg.name, timestamps, keyframes, cfg.mode, in_tangents, out_tangents, sources) {
                Ok(channel) => built.push(channel),
                Err(err) => {
                    self.error_log.push(err);
                    return None;
                }
            }
        }
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        match AnimationNode::new(header, built) {
            Ok(node) => {
                self.nodes.insert(id, LogicNode::Animation(node));
                Some(ObjectHandle(id))
            }
            Err(err) => {
                self.error_log.push(err);
                None
            }
        }
    }

    fn data_array_values(&self, handle: ObjectHandle) -> Option<std::rc::Rc<DataArrayValues>> {
        match self.nodes.get(&handle.0) {
            Some(LogicNode::DataArray(d)) => Some(d.values.clone()),
            _ => None,
        }
    }

    pub fn create_timer_node(&mut self, name: &str, mode: TimerMode) -> ObjectHandle {
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        self.nodes.insert(id, LogicNode::Timer(TimerNode::new(header, mode)));
        ObjectHandle(id)
    }

    pub fn create_binding(&mut self, name: &str, kind: BindingKind, external_ref: &str, schema: &TypeNode) -> ObjectHandle {
        let id = self.id_alloc.allocate();
        let header = NodeHeader::new(id, name.to_string());
        let node = BindingNode::new(header, kind, external_ref.to_string(), schema);
        self.nodes.insert(id, LogicNode::Binding(node));
        ObjectHandle(id)
    }

    pub fn set_user_id(&mut self, handle: ObjectHandle, user_id: UserId) -> Result<(), LogicError> {
        let node = self
            .nodes
            .get_mut(&handle.0)
            .ok_or_else(|| LogicError::UnknownProperty(format!("{:?}", handle.0)))?;
        node.header_mut().user_id = Some(user_id);
        Ok(())
    }

    pub fn find_by_id(&self, id: NodeId) -> Option<ObjectHandle> {
        self.nodes.contains_key(&id).then_some(ObjectHandle(id))
    }

    /// First match by iteration order (unspecified, since names need not
    /// be unique) whose header name equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectHandle> {
        self.nodes.values().find(|n| n.header().name == name).map(|n| ObjectHandle(n.id()))
    }

    pub fn node(&self, handle: ObjectHandle) -> Option<&LogicNode> {
        self.nodes.get(&handle.0)
    }

    /// Same lookup as [`ApiObjects::node`], by raw id. `logic_format` uses
    /// this while replaying a save file: objects are restored in ascending
    /// id order, so by the time a script or module needing dependency `id`
    /// is reached, `id` is already present.
    pub fn node_by_id(&self, id: NodeId) -> Option<&LogicNode> {
        self.nodes.get(&id)
    }

    pub fn is_linked(&self, handle: ObjectHandle) -> bool {
        self.link_graph.node_is_linked(handle.0)
    }

    pub fn link(&mut self, src: PropertyRef, dst: PropertyRef) -> Result<(), LogicError> {
        self.link_impl(src, dst, false)
    }

    pub fn link_weak(&mut self, src: PropertyRef, dst: PropertyRef) -> Result<(), LogicError> {
        self.link_impl(src, dst, true)
    }

    fn link_impl(&mut self, src: PropertyRef, dst: PropertyRef, weak: bool) -> Result<(), LogicError> {
        let src_type = property_value_type(&self.nodes, src)
            .ok_or_else(|| LogicError::UnknownProperty(format!("{:?}", src)))?;
        let dst_type = property_value_type(&self.nodes, dst)
            .ok_or_else(|| LogicError::UnknownProperty(format!("{:?}", dst)))?;
        self.link_graph.link(src, dst, weak, src_type, dst_type)
    }

    pub fn unlink(&mut self, src: PropertyRef, dst: PropertyRef) -> Result<(), LogicError> {
        self.link_graph.unlink(src, dst)
    }

    /// Destroys an object. Refuses if it is a `DataArray` still
    /// referenced by an `AnimationNode`; otherwise removes every link
    /// touching it and drops the object (§9 open question (b): this
    /// engine picks "implicit removal" over "refuse while linked").
    pub fn destroy(&mut self, handle: ObjectHandle) -> Result<(), LogicError> {
        match self.nodes.get(&handle.0) {
            Some(LogicNode::DataArray(d)) if d.is_referenced() => {
                return Err(LogicError::IllegalArgument(format!(
                    "data array '{}' is still referenced by an animation node",
                    d.header.name
                )));
            }
            Some(_) => {}
            None => return Err(LogicError::UnknownProperty(format!("{:?}", handle.0))),
        }
        self.link_graph.remove_edges_touching(handle.0);
        self.nodes.remove(&handle.0);
        Ok(())
    }

    /// Highest id ever allocated by this engine, persisted by `logic_format`
    /// as the save file's `last_object_id` so a reload resumes allocation
    /// without ever reusing an id.
    pub fn last_object_id(&self) -> u64 {
        self.id_alloc.last_object_id()
    }

    /// Every object, keyed by id, in unspecified order. Used by
    /// `logic_format` to walk the full object set at save time.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &LogicNode)> {
        self.nodes.iter().map(|(&id, n)| (id, n))
    }

    /// Every link currently recorded, in unspecified order.
    pub fn links(&self) -> impl Iterator<Item = crate::graph::Edge> + '_ {
        self.link_graph.edges()
    }

    /// Starts reconstructing an engine from a save file: an empty engine
    /// whose id allocator resumes from `last_object_id`, so that objects
    /// `logic_format` inserts under their original ids (via
    /// [`ApiObjects::restore_node`]) never collide with anything freshly
    /// created afterwards.
    pub fn begin_restore(scene: Box<dyn SceneReceiver>, last_object_id: u64) -> Result<Self, LogicError> {
        Ok(Self {
            nodes: HashMap::new(),
            id_alloc: IdAllocator::resume_from(last_object_id),
            link_graph: LinkGraph::new(),
            script_host: ScriptHost::new()?,
            scene,
            error_log: LogicErrorLog::new(),
        })
    }

    /// Inserts an already-reconstructed node under its original id.
    /// `logic_format` calls this once per serialized object, in an order
    /// that satisfies every object's own dependencies (a module before
    /// the scripts that name it, a data array before the animation that
    /// references it); the core does not enforce that order itself.
    pub fn restore_node(&mut self, id: NodeId, node: LogicNode) {
        self.nodes.insert(id, node);
    }

    /// Re-validates and records a link read back from a save file. Goes
    /// through the same checks `link`/`link_weak` do, since a corrupted or
    /// hand-edited file can still claim an edge the live engine would
    /// never have produced.
    pub fn restore_link(&mut self, src: PropertyRef, dst: PropertyRef, weak: bool) -> Result<(), LogicError> {
        self.link_impl(src, dst, weak)
    }

    pub fn errors(&self) -> &[crate::error::ErrorEntry] {
        self.error_log.entries()
    }

    pub fn clear_errors(&mut self) {
        self.error_log.clear();
    }

    /// Warnings that don't fail anything except `save` (without an
    /// override): interface outputs with no outgoing link, and binding
    /// inputs that were written but the engine has never `update()`d.
    pub fn validate(&self) -> Vec<LogicError> {
        let mut warnings = Vec::new();
        for node in self.nodes.values() {
            match node {
                LogicNode::Interface(iface) => {
                    let tree = iface.tree.borrow();
                    let mut leaves = Vec::new();
                    collect_leaves(&tree, tree.root(), &mut leaves);
                    for leaf in leaves {
                        let pref = PropertyRef::new(node.id(), TreeSide::Interface, leaf);
                        if self.link_graph.outgoing_of(pref).is_empty() {
                            warnings.push(LogicError::ValidationWarning(format!(
                                "interface '{}' field '{}' has no outgoing link",
                                node.header().name,
                                tree.get_prop(leaf).name
                            )));
                        }
                    }
                }
                LogicNode::Binding(binding) => {
                    let tree = binding.input_tree.borrow();
                    let root = tree.root();
                    if pending_leaf_exists(&tree, root) {
                        warnings.push(LogicError::ValidationWarning(format!(
                            "binding '{}' has an input set since the last update()",
                            node.header().name
                        )));
                    }
                }
                _ => {}
            }
        }
        warnings
    }

    /// One scheduler tick (§4.F): recompute topological order if the
    /// graph's structure changed, snapshot weak-edge sources as of tick
    /// start, then for each node in order copy incoming values and
    /// evaluate if dirty or any copy changed a value.
    pub fn update(&mut self) -> Result<(), LogicError> {
        let mut all_ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        all_ids.sort();
        let order = self.link_graph.topological_order(&all_ids)?;

        let weak_snapshot: HashMap<PropertyRef, Value> = self
            .link_graph
            .edges()
            .filter(|e| e.weak)
            .filter_map(|e| read_property_value(&self.nodes, e.src).map(|v| (e.dst, v)))
            .collect();

        for id in order {
            let targets: Vec<PropertyRef> = self.link_graph.edges().filter(|e| e.dst.node == id).map(|e| e.dst).collect();
            let mut any_changed = false;
            for dst in targets {
                let Some((src, weak)) = self.link_graph.incoming_of(dst) else { continue };
                let value = if weak { weak_snapshot.get(&dst).cloned() } else { read_property_value(&self.nodes, src) };
                if let Some(value) = value {
                    if write_property_value(&self.nodes, dst, value)? {
                        any_changed = true;
                    }
                }
            }

            let was_dirty = self.nodes.get(&id).map(|n| n.header().dirty).unwrap_or(false);
            if !was_dirty && !any_changed {
                continue;
            }

            let eval_result = {
                let lua = self.script_host.lua();
                let scene = &mut *self.scene;
                let mut ctx = crate::nodes::EvalContext { lua, scene };
                self.nodes.get_mut(&id).map(|node| node.evaluate(&mut ctx))
            };
            match eval_result {
                Some(Ok(())) => {
                    if let Some(node) = self.nodes.get_mut(&id) {
                        // TimerNode::update() sets its own header dirty on every
                        // call (it is the one node kind that is always dirty);
                        // clearing it here would stop it from ever re-firing.
                        if !matches!(node, LogicNode::Timer(_)) {
                            node.header_mut().dirty = false;
                        }
                    }
                }
                Some(Err(err)) => {
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.header_mut().dirty = true;
                    }
                    self.error_log.push_for_object(err, ObjectHandle(id));
                }
                None => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value::ValueType;

    /// Most test scripts declare a single `IN.x`/`OUT.x` (or similarly
    /// named) field; the extractor always wraps declared fields in a
    /// `Struct`, so the tree's root is never the leaf itself -- this
    /// reaches the named child the way `BindingNode`'s own test does.
    fn field_ref(engine: &ApiObjects, handle: ObjectHandle, side: TreeSide, field: &str) -> PropertyRef {
        let idx = match (side, engine.node(handle).unwrap()) {
            (TreeSide::Input, LogicNode::Script(s)) => {
                let tree = s.input_tree.borrow();
                tree.child_by_name(tree.root(), field).unwrap()
            }
            (TreeSide::Output, LogicNode::Script(s)) => {
                let tree = s.output_tree.borrow();
                tree.child_by_name(tree.root(), field).unwrap()
            }
            _ => panic!("field_ref only supports script input/output trees"),
        };
        PropertyRef::new(handle.0, side, idx)
    }

    #[test]
    fn two_chained_scripts_propagate_on_update() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let s = engine
            .create_script(
                "doubler",
                r#"
                    function interface(IN, OUT)
                        IN.x = FLOAT
                        OUT.x = FLOAT
                    end
                    function run(IN, OUT)
                        OUT.x = IN.x * 2
                    end
                "#,
                DependencyConfig { std_modules: StdModules::ALL, modules: &[] },
            )
            .unwrap();
        let t = engine
            .create_script(
                "incrementer",
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

        engine.link(field_ref(&engine, s, TreeSide::Output, "x"), field_ref(&engine, t, TreeSide::Input, "x")).unwrap();
        {
            let LogicNode::Script(script) = engine.node(s).unwrap() else { panic!("expected script") };
            let mut tree = script.input_tree.borrow_mut();
            let x = tree.child_by_name(tree.root(), "x").unwrap();
            tree.set_internal(x, Value::Float(3.0)).unwrap();
        }
        engine.update().unwrap();
        let LogicNode::Script(t_node) = engine.node(t).unwrap() else { panic!("expected script") };
        let tree = t_node.output_tree.borrow();
        let y = tree.child_by_name(tree.root(), "y").unwrap();
        assert_eq!(tree.get::<f32>(y), Some(7.0));
    }

    #[test]
    fn free_running_timer_keeps_driving_downstream_nodes_across_ticks() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let timer = engine.create_timer_node("clock", TimerMode::FreeRunning { step_us: 1000 });
        let watcher = engine
            .create_script(
                "watcher",
                r#"
                    function interface(IN, OUT)
                        IN.ticker_us = INT64
                        OUT.ticker_us = INT64
                    end
                    function run(IN, OUT)
                        OUT.ticker_us = IN.ticker_us
                    end
                "#,
                DependencyConfig { std_modules: StdModules::ALL, modules: &[] },
            )
            .unwrap();

        let timer_out = {
            let LogicNode::Timer(t) = engine.node(timer).unwrap() else { panic!("expected timer") };
            let tree = t.output_tree.borrow();
            tree.child_by_name(tree.root(), "ticker_us").unwrap()
        };
        let watcher_in = field_ref(&engine, watcher, TreeSide::Input, "ticker_us");
        engine.link(PropertyRef::new(timer.id(), TreeSide::Output, timer_out), watcher_in).unwrap();

        engine.update().unwrap();
        engine.update().unwrap();

        let LogicNode::Script(w) = engine.node(watcher).unwrap() else { panic!("expected script") };
        let tree = w.output_tree.borrow();
        let idx = tree.child_by_name(tree.root(), "ticker_us").unwrap();
        assert_eq!(tree.get::<i64>(idx), Some(2000));
    }

    #[test]
    fn weak_cycle_reads_the_previous_ticks_value() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let src = r#"
            function interface(IN, OUT)
                IN.x = FLOAT
                OUT.x = FLOAT
            end
            function run(IN, OUT)
                OUT.x = IN.x + 1
            end
        "#;
        let a = engine.create_script("a", src, DependencyConfig { std_modules: StdModules::ALL, modules: &[] }).unwrap();
        let b = engine.create_script("b", src, DependencyConfig { std_modules: StdModules::ALL, modules: &[] }).unwrap();
        engine.link(field_ref(&engine, a, TreeSide::Output, "x"), field_ref(&engine, b, TreeSide::Input, "x")).unwrap();
        engine
            .link_weak(field_ref(&engine, b, TreeSide::Output, "x"), field_ref(&engine, a, TreeSide::Input, "x"))
            .unwrap();

        engine.update().unwrap();
        {
            let LogicNode::Script(a_node) = engine.node(a).unwrap() else { panic!() };
            let tree = a_node.output_tree.borrow();
            let x = tree.child_by_name(tree.root(), "x").unwrap();
            assert_eq!(tree.get::<f32>(x), Some(1.0));
        }
        engine.update().unwrap();
        let LogicNode::Script(a_node) = engine.node(a).unwrap() else { panic!() };
        let LogicNode::Script(b_node) = engine.node(b).unwrap() else { panic!() };
        let b_out = b_node.output_tree.borrow();
        let b_x = b_out.child_by_name(b_out.root(), "x").unwrap();
        assert_eq!(b_out.get::<f32>(b_x), Some(2.0));
        let a_in = a_node.input_tree.borrow();
        let a_x = a_in.child_by_name(a_in.root(), "x").unwrap();
        assert_eq!(a_in.get::<f32>(a_x), Some(1.0));
    }

    #[test]
    fn destroy_refuses_a_referenced_data_array() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let arr = engine.create_data_array("stamps", DataArrayValues::Float(vec![0.0, 1.0]));
        let anim = engine
            .create_animation_node(
                "anim",
                vec![AnimationChannelConfig {
                    name: "x".to_string(),
                    timestamps: arr,
                    keyframes: arr,
                    mode: crate::nodes::InterpolationMode::Linear,
                    in_tangents: None,
                    out_tangents: None,
                }],
            )
            .unwrap();
        assert!(engine.destroy(arr).is_err());
        engine.destroy(anim).unwrap();
        assert!(engine.destroy(arr).is_ok());
    }

    #[test]
    fn destroy_implicitly_removes_touching_links() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let src = r#"
            function interface(IN, OUT) OUT.x = FLOAT end
            function run(IN, OUT) OUT.x = 1.0 end
        "#;
        let dst = r#"
            function interface(IN, OUT) IN.x = FLOAT end
            function run(IN, OUT) end
        "#;
        let a = engine.create_script("a", src, DependencyConfig { std_modules: StdModules::ALL, modules: &[] }).unwrap();
        let b = engine.create_script("b", dst, DependencyConfig { std_modules: StdModules::ALL, modules: &[] }).unwrap();
        engine.link(field_ref(&engine, a, TreeSide::Output, "x"), field_ref(&engine, b, TreeSide::Input, "x")).unwrap();
        assert!(engine.is_linked(a));
        engine.destroy(a).unwrap();
        assert!(!engine.is_linked(b));
    }

    #[test]
    fn find_by_name_and_id_locate_the_same_object() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let handle = engine.create_data_array("stamps", DataArrayValues::Float(vec![0.0]));
        assert_eq!(engine.find_by_name("stamps"), Some(handle));
        assert_eq!(engine.find_by_id(handle.id()), Some(handle));
        assert_eq!(engine.find_by_name("missing"), None);
    }

    #[test]
    fn validate_flags_an_interface_output_with_no_outgoing_link() {
        let mut engine = ApiObjects::new_headless().unwrap();
        engine.create_interface("hub", &TypeNode::Leaf(ValueType::Float)).unwrap();
        let warnings = engine.validate();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], LogicError::ValidationWarning(_)));
    }

    #[test]
    fn validate_flags_a_binding_input_never_drained_by_update() {
        let mut engine = ApiObjects::new_headless().unwrap();
        let schema = BindingKind::NodeTransform.fixed_schema().unwrap();
        let handle = engine.create_binding("xform", BindingKind::NodeTransform, "scene_obj_1", &schema);
        assert!(engine.validate().is_empty());

        let LogicNode::Binding(binding) = engine.node(handle).unwrap() else { panic!("expected binding") };
        let mut tree = binding.input_tree.borrow_mut();
        let root = tree.root();
        let tx = tree.child_by_name(root, "tx").unwrap();
        tree.set_internal(tx, Value::Float(1.0)).unwrap();
        drop(tree);

        let warnings = engine.validate();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], LogicError::ValidationWarning(_)));

        engine.update().unwrap();
        assert!(engine.validate().is_empty());
    }
}
