//! Per-`LogicNode`-kind object payloads: one `write_*`/`restore_*` pair
//! per variant, dispatched by `write_object`/`restore_object` below.
//!
//! The explicit per-kind match (rather than a generic `Serialize` derive)
//! mirrors `grim_formats::three_do`'s explicit per-chunk-type readers --
//! each object kind's payload is its own small, hand-written shape, not a
//! reflected-over struct.

use std::io::{Read, Write};
use std::rc::Rc;

use logic_core::lua::StdModules;
use logic_core::nodes::{
    AnimationChannel, AnimationChannelSources, AnimationNode, BindingKind, BindingNode, DataArray, DataArrayValues,
    InterfaceNode, InterpolationMode, ModuleNode, Script, ScriptConfig, TimerMode, TimerNode,
};
use logic_core::{ApiObjects, LogicError, LogicNode, NodeHeader, NodeId, UserId};

use crate::wire::{
    read_bool, read_f32, read_i32, read_i64, read_node_id, read_string, read_type_node, read_u32, read_u64, read_u8,
    restore_tree_values, type_node_of_tree, write_bool, write_f32, write_i32, write_i64, write_node_id, write_string,
    write_tree_values, write_type_node, write_u32, write_u64, write_u8,
};

fn kind_tag(node: &LogicNode) -> u8 {
    match node {
        LogicNode::Script(_) => 0,
        LogicNode::Module(_) => 1,
        LogicNode::Interface(_) => 2,
        LogicNode::DataArray(_) => 3,
        LogicNode::Animation(_) => 4,
        LogicNode::Timer(_) => 5,
        LogicNode::Binding(_) => 6,
    }
}

pub fn write_object<W: Write>(w: &mut W, node: &LogicNode) -> Result<(), LogicError> {
    write_u8(w, kind_tag(node))?;
    write_node_id(w, node.id())?;
    match node.header().user_id {
        Some(uid) => {
            write_bool(w, true)?;
            write_u64(w, uid.high)?;
            write_u64(w, uid.low)?;
        }
        None => write_bool(w, false)?,
    }
    write_string(w, &node.header().name)?;
    match node {
        LogicNode::Script(n) => write_script(w, n),
        LogicNode::Module(n) => write_module(w, n),
        LogicNode::Interface(n) => write_interface(w, n),
        LogicNode::DataArray(n) => write_data_array(w, n),
        LogicNode::Animation(n) => write_animation(w, n),
        LogicNode::Timer(n) => write_timer(w, n),
        LogicNode::Binding(n) => write_binding(w, n),
    }
}

pub fn restore_object<R: Read>(r: &mut R, engine: &ApiObjects) -> Result<LogicNode, LogicError> {
    let tag = read_u8(r)?;
    let id = read_node_id(r)?;
    let user_id = if read_bool(r)? {
        Some(UserId { high: read_u64(r)?, low: read_u64(r)? })
    } else {
        None
    };
    let name = read_string(r)?;
    let mut header = NodeHeader::new(id, name);
    header.user_id = user_id;

    Ok(match tag {
        0 => LogicNode::Script(restore_script(r, header, engine)?),
        1 => LogicNode::Module(restore_module(r, header, engine)?),
        2 => LogicNode::Interface(restore_interface(r, header)?),
        3 => LogicNode::DataArray(restore_data_array(r, header)?),
        4 => LogicNode::Animation(restore_animation(r, header, engine)?),
        5 => LogicNode::Timer(restore_timer(r, header)?),
        6 => LogicNode::Binding(restore_binding(r, header)?),
        other => return Err(LogicError::CorruptedBinary(format!("unknown object kind tag {other}"))),
    })
}

fn std_modules_bits(m: StdModules) -> u8 {
    (m.base as u8) | ((m.string as u8) << 1) | ((m.table as u8) << 2) | ((m.math as u8) << 3) | ((m.debug as u8) << 4)
}

fn std_modules_from_bits(bits: u8) -> StdModules {
    StdModules {
        base: bits & 0x01 != 0,
        string: bits & 0x02 != 0,
        table: bits & 0x04 != 0,
        math: bits & 0x08 != 0,
        debug: bits & 0x10 != 0,
    }
}

fn write_module_bindings<W: Write>(w: &mut W, bindings: &[(String, NodeId)]) -> Result<(), LogicError> {
    write_u32(w, bindings.len() as u32)?;
    for (name, id) in bindings {
        write_string(w, name)?;
        write_node_id(w, *id)?;
    }
    Ok(())
}

fn read_module_bindings<R: Read>(r: &mut R) -> Result<Vec<(String, NodeId)>, LogicError> {
    let count = read_u32(r)? as usize;
    let mut bindings = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_string(r)?;
        let id = read_node_id(r)?;
        bindings.push((name, id));
    }
    Ok(bindings)
}

/// Resolves `bindings` against already-restored modules in `engine`.
/// Restoration replays objects in ascending id order, so every module a
/// script/module declares was created earlier and is already present.
fn resolve_restored_modules<'a>(
    engine: &'a ApiObjects,
    bindings: &'a [(String, NodeId)],
) -> Result<Vec<(&'a str, &'a ModuleNode)>, LogicError> {
    let mut resolved = Vec::with_capacity(bindings.len());
    for (name, id) in bindings {
        match engine.node_by_id(*id) {
            Some(LogicNode::Module(m)) => resolved.push((name.as_str(), m)),
            _ => {
                return Err(LogicError::MissingSerializedField(format!(
                    "module '{name}' (id {id}) not found while restoring its dependent"
                )))
            }
        }
    }
    Ok(resolved)
}

fn write_script<W: Write>(w: &mut W, s: &Script) -> Result<(), LogicError> {
    write_string(w, &s.source)?;
    write_u8(w, std_modules_bits(s.std_modules))?;
    write_module_bindings(w, &s.module_bindings)?;
    write_tree_values(w, &s.input_tree.borrow())?;
    write_tree_values(w, &s.output_tree.borrow())
}

fn restore_script<R: Read>(r: &mut R, header: NodeHeader, engine: &ApiObjects) -> Result<Script, LogicError> {
    let source = read_string(r)?;
    let std_modules = std_modules_from_bits(read_u8(r)?);
    let bindings = read_module_bindings(r)?;
    let resolved = resolve_restored_modules(engine, &bindings)?;
    let script = Script::compile(
        engine.lua(),
        header,
        &source,
        ScriptConfig { std_modules, resolved_modules: &resolved },
    )
    .map_err(|e| LogicError::CorruptedBinary(format!("recompiling script: {e}")))?;
    restore_tree_values(r, &mut script.input_tree.borrow_mut())?;
    restore_tree_values(r, &mut script.output_tree.borrow_mut())?;
    Ok(script)
}

fn write_module<W: Write>(w: &mut W, m: &ModuleNode) -> Result<(), LogicError> {
    write_string(w, &m.source)?;
    write_u8(w, std_modules_bits(m.std_modules))?;
    write_module_bindings(w, &m.module_bindings)
}

fn restore_module<R: Read>(r: &mut R, header: NodeHeader, engine: &ApiObjects) -> Result<ModuleNode, LogicError> {
    let source = read_string(r)?;
    let std_modules = std_modules_from_bits(read_u8(r)?);
    let bindings = read_module_bindings(r)?;
    let resolved = resolve_restored_modules(engine, &bindings)?;
    ModuleNode::compile(engine.lua(), header, &source, std_modules, &resolved)
        .map_err(|e| LogicError::CorruptedBinary(format!("recompiling module: {e}")))
}

fn write_interface<W: Write>(w: &mut W, n: &InterfaceNode) -> Result<(), LogicError> {
    let tree = n.tree.borrow();
    write_type_node(w, &type_node_of_tree(&tree, tree.root()))?;
    write_tree_values(w, &tree)
}

fn restore_interface<R: Read>(r: &mut R, header: NodeHeader) -> Result<InterfaceNode, LogicError> {
    let schema = read_type_node(r)?;
    let node = InterfaceNode::new(header, &schema)?;
    restore_tree_values(r, &mut node.tree.borrow_mut())?;
    Ok(node)
}

fn write_data_array<W: Write>(w: &mut W, d: &DataArray) -> Result<(), LogicError> {
    match &*d.values {
        DataArrayValues::Float(v) => {
            write_u8(w, 0)?;
            write_u32(w, v.len() as u32)?;
            v.iter().try_for_each(|x| write_f32(w, *x))
        }
        DataArrayValues::Vec2f(v) => {
            write_u8(w, 1)?;
            write_u32(w, v.len() as u32)?;
            v.iter().try_for_each(|x| x.iter().try_for_each(|c| write_f32(w, *c)))
        }
        DataArrayValues::Vec3f(v) => {
            write_u8(w, 2)?;
            write_u32(w, v.len() as u32)?;
            v.iter().try_for_each(|x| x.iter().try_for_each(|c| write_f32(w, *c)))
        }
        DataArrayValues::Vec4f(v) => {
            write_u8(w, 3)?;
            write_u32(w, v.len() as u32)?;
            v.iter().try_for_each(|x| x.iter().try_for_each(|c| write_f32(w, *c)))
        }
        DataArrayValues::Int32(v) => {
            write_u8(w, 4)?;
            write_u32(w, v.len() as u32)?;
            v.iter().try_for_each(|x| write_i32(w, *x))
        }
        DataArrayValues::Int64(v) => {
            write_u8(w, 5)?;
            write_u32(w, v.len() as u32)?;
            v.iter().try_for_each(|x| write_i64(w, *x))
        }
    }
}

fn restore_data_array<R: Read>(r: &mut R, header: NodeHeader) -> Result<DataArray, LogicError> {
    let tag = read_u8(r)?;
    let len = read_u32(r)? as usize;
    let values = match tag {
        0 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_f32(r)?);
            }
            DataArrayValues::Float(v)
        }
        1 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push([read_f32(r)?, read_f32(r)?]);
            }
            DataArrayValues::Vec2f(v)
        }
        2 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push([read_f32(r)?, read_f32(r)?, read_f32(r)?]);
            }
            DataArrayValues::Vec3f(v)
        }
        3 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push([read_f32(r)?, read_f32(r)?, read_f32(r)?, read_f32(r)?]);
            }
            DataArrayValues::Vec4f(v)
        }
        4 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_i32(r)?);
            }
            DataArrayValues::Int32(v)
        }
        5 => {
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(read_i64(r)?);
            }
            DataArrayValues::Int64(v)
        }
        other => return Err(LogicError::CorruptedBinary(format!("unknown data array tag {other}"))),
    };
    Ok(DataArray::new(header, values))
}

fn interpolation_tag(mode: InterpolationMode) -> u8 {
    match mode {
        InterpolationMode::Step => 0,
        InterpolationMode::Linear => 1,
        InterpolationMode::Cubic => 2,
    }
}

fn interpolation_from_tag(tag: u8) -> Result<InterpolationMode, LogicError> {
    Ok(match tag {
        0 => InterpolationMode::Step,
        1 => InterpolationMode::Linear,
        2 => InterpolationMode::Cubic,
        other => return Err(LogicError::CorruptedBinary(format!("unknown interpolation mode tag {other}"))),
    })
}

fn write_animation<W: Write>(w: &mut W, n: &AnimationNode) -> Result<(), LogicError> {
    write_u32(w, n.channels.len() as u32)?;
    for channel in &n.channels {
        write_string(w, &channel.name)?;
        write_u8(w, interpolation_tag(channel.mode))?;
        write_node_id(w, channel.sources.timestamps)?;
        write_node_id(w, channel.sources.keyframes)?;
        match channel.sources.in_tangents {
            Some(id) => {
                write_bool(w, true)?;
                write_node_id(w, id)?;
            }
            None => write_bool(w, false)?,
        }
        match channel.sources.out_tangents {
            Some(id) => {
                write_bool(w, true)?;
                write_node_id(w, id)?;
            }
            None => write_bool(w, false)?,
        }
    }
    write_tree_values(w, &n.input_tree.borrow())?;
    write_tree_values(w, &n.output_tree.borrow())
}

fn data_array_values_of(engine: &ApiObjects, id: NodeId) -> Result<Rc<DataArrayValues>, LogicError> {
    match engine.node_by_id(id) {
        Some(LogicNode::DataArray(d)) => Ok(d.values.clone()),
        _ => Err(LogicError::MissingSerializedField(format!(
            "data array {id} not found while restoring an animation channel"
        ))),
    }
}

fn restore_animation<R: Read>(r: &mut R, header: NodeHeader, engine: &ApiObjects) -> Result<AnimationNode, LogicError> {
    let count = read_u32(r)? as usize;
    let mut channels = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_string(r)?;
        let mode = interpolation_from_tag(read_u8(r)?)?;
        let timestamps_id = read_node_id(r)?;
        let keyframes_id = read_node_id(r)?;
        let in_tangents_id = if read_bool(r)? { Some(read_node_id(r)?) } else { None };
        let out_tangents_id = if read_bool(r)? { Some(read_node_id(r)?) } else { None };

        let timestamps = data_array_values_of(engine, timestamps_id)?;
        let keyframes = data_array_values_of(engine, keyframes_id)?;
        let in_tangents = in_tangents_id.map(|id| data_array_values_of(engine, id)).transpose()?;
        let out_tangents = out_tangents_id.map(|id| data_array_values_of(engine, id)).transpose()?;
        let sources = AnimationChannelSources {
            timestamps: timestamps_id,
            keyframes: keyframes_id,
            in_tangents: in_tangents_id,
            out_tangents: out_tangents_id,
        };
        channels.push(AnimationChannel::new(name, timestamps, keyframes, mode, in_tangents, out_tangents, sources)?);
    }
    let node = AnimationNode::new(header, channels)?;
    restore_tree_values(r, &mut node.input_tree.borrow_mut())?;
    restore_tree_values(r, &mut node.output_tree.borrow_mut())?;
    Ok(node)
}

fn write_timer<W: Write>(w: &mut W, t: &TimerNode) -> Result<(), LogicError> {
    match t.mode {
        TimerMode::FreeRunning { step_us } => {
            write_u8(w, 0)?;
            write_u64(w, step_us)?;
        }
        TimerMode::External => write_u8(w, 1)?,
    }
    write_tree_values(w, &t.input_tree.borrow())?;
    write_tree_values(w, &t.output_tree.borrow())
}

fn restore_timer<R: Read>(r: &mut R, header: NodeHeader) -> Result<TimerNode, LogicError> {
    let mode = match read_u8(r)? {
        0 => TimerMode::FreeRunning { step_us: read_u64(r)? },
        1 => TimerMode::External,
        other => return Err(LogicError::CorruptedBinary(format!("unknown timer mode tag {other}"))),
    };
    let node = TimerNode::new(header, mode);
    restore_tree_values(r, &mut node.input_tree.borrow_mut())?;
    restore_tree_values(r, &mut node.output_tree.borrow_mut())?;
    Ok(node)
}

fn binding_kind_tag(kind: BindingKind) -> u8 {
    match kind {
        BindingKind::NodeTransform => 0,
        BindingKind::Appearance => 1,
        BindingKind::Camera => 2,
        BindingKind::RenderPass => 3,
    }
}

fn binding_kind_from_tag(tag: u8) -> Result<BindingKind, LogicError> {
    Ok(match tag {
        0 => BindingKind::NodeTransform,
        1 => BindingKind::Appearance,
        2 => BindingKind::Camera,
        3 => BindingKind::RenderPass,
        other => return Err(LogicError::CorruptedBinary(format!("unknown binding kind tag {other}"))),
    })
}

fn write_binding<W: Write>(w: &mut W, b: &BindingNode) -> Result<(), LogicError> {
    write_u8(w, binding_kind_tag(b.kind))?;
    write_string(w, &b.external_ref)?;
    let tree = b.input_tree.borrow();
    write_type_node(w, &type_node_of_tree(&tree, tree.root()))?;
    write_tree_values(w, &tree)
}

fn restore_binding<R: Read>(r: &mut R, header: NodeHeader) -> Result<BindingNode, LogicError> {
    let kind = binding_kind_from_tag(read_u8(r)?)?;
    let external_ref = read_string(r)?;
    let schema = read_type_node(r)?;
    let node = BindingNode::new(header, kind, external_ref, &schema);
    restore_tree_values(r, &mut node.input_tree.borrow_mut())?;
    Ok(node)
}
