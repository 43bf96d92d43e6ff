//! Logic node kinds: the tagged variant the source expresses through
//! virtual inheritance.
//!
//! Grounded on `grim_viewer::movie::playback::Playback` (an enum over
//! `Snm`/`Ogv` backends with a shared dispatch `impl` per trait method)
//! for the shape: one plain struct per kind, a thin enum wrapping them,
//! and a single `match` per operation rather than a trait-object vtable.
//! The header fields shared by every kind (id, user id, name, dirty bit)
//! live in `NodeHeader`, embedded by value in each kind's struct.

mod animation;
mod binding;
mod data_array;
mod deps;
mod interface_node;
mod module_node;
mod script;
mod timer;

pub use animation::{AnimationChannel, AnimationChannelSources, AnimationNode, InterpolationMode};
pub use binding::{BindingKind, BindingNode, NullSceneReceiver, PendingValue, SceneReceiver};
pub use data_array::{DataArray, DataArrayValues};
pub use interface_node::InterfaceNode;
pub use module_node::ModuleNode;
pub use script::{Script, ScriptConfig};
pub use timer::{TimerMode, TimerNode};

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LogicError;
use crate::ids::{NodeId, UserId};
use crate::types::property::{PropertyTree, TreeSide};

/// Attributes shared by every logic node kind.
#[derive(Debug, Clone)]
pub struct NodeHeader {
    pub id: NodeId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub dirty: bool,
}

impl NodeHeader {
    pub fn new(id: NodeId, name: String) -> Self {
        Self { id, user_id: None, name, dirty: true }
    }
}

/// The tagged variant over every logic node kind the engine supports.
pub enum LogicNode {
    Script(Script),
    Interface(InterfaceNode),
    Module(ModuleNode),
    DataArray(DataArray),
    Animation(AnimationNode),
    Timer(TimerNode),
    Binding(BindingNode),
}

impl LogicNode {
    pub fn header(&self) -> &NodeHeader {
        match self {
            LogicNode::Script(n) => &n.header,
            LogicNode::Interface(n) => &n.header,
            LogicNode::Module(n) => &n.header,
            LogicNode::DataArray(n) => &n.header,
            LogicNode::Animation(n) => &n.header,
            LogicNode::Timer(n) => &n.header,
            LogicNode::Binding(n) => &n.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut NodeHeader {
        match self {
            LogicNode::Script(n) => &mut n.header,
            LogicNode::Interface(n) => &mut n.header,
            LogicNode::Module(n) => &mut n.header,
            LogicNode::DataArray(n) => &mut n.header,
            LogicNode::Animation(n) => &mut n.header,
            LogicNode::Timer(n) => &mut n.header,
            LogicNode::Binding(n) => &mut n.header,
        }
    }

    pub fn id(&self) -> NodeId {
        self.header().id
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            LogicNode::Script(_) => "script",
            LogicNode::Interface(_) => "interface",
            LogicNode::Module(_) => "module",
            LogicNode::DataArray(_) => "data_array",
            LogicNode::Animation(_) => "animation_node",
            LogicNode::Timer(_) => "timer_node",
            LogicNode::Binding(_) => "binding",
        }
    }

    /// The property tree this node exposes on `side`, if any. `Script`,
    /// `Animation`, and `Timer` have distinct input/output trees;
    /// `Interface` answers the same tree for both sides; `Binding` only
    /// has an input; `Module`/`DataArray` have none.
    pub fn tree(&self, side: TreeSide) -> Option<Rc<RefCell<PropertyTree>>> {
        match (self, side) {
            (LogicNode::Script(n), TreeSide::Input) => Some(n.input_tree.clone()),
            (LogicNode::Script(n), TreeSide::Output) => Some(n.output_tree.clone()),
            (LogicNode::Interface(n), TreeSide::Interface) => Some(n.tree.clone()),
            (LogicNode::Animation(n), TreeSide::Input) => Some(n.input_tree.clone()),
            (LogicNode::Animation(n), TreeSide::Output) => Some(n.output_tree.clone()),
            (LogicNode::Timer(n), TreeSide::Input) => Some(n.input_tree.clone()),
            (LogicNode::Timer(n), TreeSide::Output) => Some(n.output_tree.clone()),
            (LogicNode::Binding(n), TreeSide::Input) => Some(n.input_tree.clone()),
            _ => None,
        }
    }

    /// Evaluates the node: runs Lua for a script, interpolates an
    /// animation frame, forwards a timer tick, pushes a binding's pending
    /// inputs to its receiver. `ctx` supplies the few kind-specific
    /// dependencies (the Lua state, a binding receiver) that a bare
    /// `&mut self` can't reach.
    pub fn evaluate(&mut self, ctx: &mut EvalContext) -> Result<(), LogicError> {
        match self {
            LogicNode::Script(n) => n.run(ctx.lua),
            LogicNode::Interface(n) => n.update(),
            LogicNode::Module(_) => Ok(()),
            LogicNode::DataArray(_) => Ok(()),
            LogicNode::Animation(n) => n.update(),
            LogicNode::Timer(n) => n.update(),
            LogicNode::Binding(n) => n.update(ctx.scene),
        }
    }
}

/// Per-tick dependencies the scheduler hands to `LogicNode::evaluate`.
/// Borrowed, never stored: a node's own state must not outlive one
/// `update()` call's worth of borrowing.
pub struct EvalContext<'a> {
    pub lua: &'a mlua::Lua,
    pub scene: &'a mut dyn SceneReceiver,
}
