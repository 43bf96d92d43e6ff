//! AnimationNode: samples one or more keyframe channels at the current
//! `progress` and writes one output per channel plus a shared `duration`.
//!
//! The bracketing search is a plain `partition_point` binary search over
//! each channel's sorted timestamp `DataArrayValues`, picked for its
//! stdlib `[T]::partition_point` fit to a sorted-timestamp lookup; no
//! pack file does the same bracket-then-interpolate search, so this one
//! has no teacher precedent to ground on.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LogicError;
use crate::ids::NodeId;
use crate::nodes::data_array::DataArrayValues;
use crate::nodes::NodeHeader;
use crate::types::property::{PropertyTree, SemanticRole};
use crate::types::schema::TypeNode;
use crate::types::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Step,
    Linear,
    Cubic,
}

/// Which `DataArray` object backs each of a channel's sampled arrays, by
/// id -- the `Rc<DataArrayValues>` the channel actually samples carries no
/// identity of its own, so a save file needs this alongside it to
/// reference the right objects on reload.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimationChannelSources {
    pub timestamps: NodeId,
    pub keyframes: NodeId,
    pub in_tangents: Option<NodeId>,
    pub out_tangents: Option<NodeId>,
}

pub struct AnimationChannel {
    pub name: String,
    pub timestamps: Rc<DataArrayValues>,
    pub keyframes: Rc<DataArrayValues>,
    pub mode: InterpolationMode,
    pub in_tangents: Option<Rc<DataArrayValues>>,
    pub out_tangents: Option<Rc<DataArrayValues>>,
    pub sources: AnimationChannelSources,
}

impl AnimationChannel {
    pub fn new(
        name: String,
        timestamps: Rc<DataArrayValues>,
        keyframes: Rc<DataArrayValues>,
        mode: InterpolationMode,
        in_tangents: Option<Rc<DataArrayValues>>,
        out_tangents: Option<Rc<DataArrayValues>>,
        sources: AnimationChannelSources,
    ) -> Result<Self, LogicError> {
        let stamps = timestamps.as_strictly_increasing_timestamps()?;
        if keyframes.len() != stamps.len() {
            return Err(LogicError::IllegalArgument(format!(
                "channel '{name}': keyframe length {} does not match timestamp length {}",
                keyframes.len(),
                stamps.len()
            )));
        }
        if mode == InterpolationMode::Cubic {
            let (Some(into), Some(outo)) = (&in_tangents, &out_tangents) else {
                return Err(LogicError::IllegalArgument(format!(
                    "channel '{name}': Cubic interpolation requires in and out tangent data arrays"
                )));
            };
            if into.len() != keyframes.len() || outo.len() != keyframes.len() {
                return Err(LogicError::IllegalArgument(format!(
                    "channel '{name}': tangent arrays must each match the keyframe length"
                )));
            }
        }
        Ok(Self { name, timestamps, keyframes, mode, in_tangents, out_tangents, sources })
    }

    fn duration(&self) -> f32 {
        *self.timestamps.as_strictly_increasing_timestamps().expect("validated at construction").last().unwrap()
    }

    fn sample(&self, progress: f32) -> Value {
        let stamps = self
            .timestamps
            .as_strictly_increasing_timestamps()
            .expect("validated at construction");
        let last = stamps.len() - 1;
        if progress <= stamps[0] {
            return self.keyframes.value_from_components(&self.keyframes.components_f64(0));
        }
        if progress >= stamps[last] {
            return self.keyframes.value_from_components(&self.keyframes.components_f64(last));
        }
        let i = stamps.partition_point(|&t| t <= progress).saturating_sub(1).min(last - 1);
        let t0 = stamps[i] as f64;
        let t1 = stamps[i + 1] as f64;
        let t = ((progress as f64) - t0) / (t1 - t0);

        match self.mode {
            InterpolationMode::Step => self.keyframes.value_from_components(&self.keyframes.components_f64(i)),
            InterpolationMode::Linear => {
                let p0 = self.keyframes.components_f64(i);
                let p1 = self.keyframes.components_f64(i + 1);
                let lerped: Vec<f64> = p0.iter().zip(&p1).map(|(a, b)| a + (b - a) * t).collect();
                self.keyframes.value_from_components(&lerped)
            }
            InterpolationMode::Cubic => {
                let p0 = self.keyframes.components_f64(i);
                let p1 = self.keyframes.components_f64(i + 1);
                let m0 = self.out_tangents.as_ref().expect("validated at construction").components_f64(i);
                let m1 = self.in_tangents.as_ref().expect("validated at construction").components_f64(i + 1);
                let h00 = 2.0 * t.powi(3) - 3.0 * t.powi(2) + 1.0;
                let h10 = t.powi(3) - 2.0 * t.powi(2) + t;
                let h01 = -2.0 * t.powi(3) + 3.0 * t.powi(2);
                let h11 = t.powi(3) - t.powi(2);
                let interpolated: Vec<f64> = (0..p0.len())
                    .map(|c| h00 * p0[c] + h10 * m0[c] + h01 * p1[c] + h11 * m1[c])
                    .collect();
                self.keyframes.value_from_components(&interpolated)
            }
        }
    }
}

pub struct AnimationNode {
    pub header: NodeHeader,
    pub channels: Vec<AnimationChannel>,
    pub input_tree: Rc<RefCell<PropertyTree>>,
    pub output_tree: Rc<RefCell<PropertyTree>>,
}

impl AnimationNode {
    pub fn new(header: NodeHeader, channels: Vec<AnimationChannel>) -> Result<Self, LogicError> {
        if channels.is_empty() {
            return Err(LogicError::IllegalArgument(
                "an animation node needs at least one channel".to_string(),
            ));
        }
        let input_schema = TypeNode::new_struct(vec![(
            "progress".to_string(),
            TypeNode::Leaf(crate::types::value::ValueType::Float),
        )])?;
        let mut output_fields = vec![(
            "duration".to_string(),
            TypeNode::Leaf(crate::types::value::ValueType::Float),
        )];
        for channel in &channels {
            output_fields.push((channel.name.clone(), TypeNode::Leaf(channel.keyframes.element_type())));
        }
        let output_schema = TypeNode::new_struct(output_fields)?;

        let input_tree = PropertyTree::from_schema(&input_schema, SemanticRole::AnimationInput);
        let output_tree = PropertyTree::from_schema(&output_schema, SemanticRole::AnimationOutput);
        Ok(Self {
            header,
            channels,
            input_tree: Rc::new(RefCell::new(input_tree)),
            output_tree: Rc::new(RefCell::new(output_tree)),
        })
    }

    pub fn update(&mut self) -> Result<(), LogicError> {
        let progress = {
            let tree = self.input_tree.borrow();
            let root = tree.root();
            let idx = tree.child_by_name(root, "progress").expect("progress field present");
            tree.get::<f32>(idx).unwrap_or(0.0)
        };

        let mut output = self.output_tree.borrow_mut();
        let root = output.root();
        let mut duration = 0.0f32;
        for channel in &self.channels {
            duration = duration.max(channel.duration());
            let value = channel.sample(progress);
            let out_idx = output
                .child_by_name(root, &channel.name)
                .ok_or_else(|| LogicError::UnknownProperty(channel.name.clone()))?;
            output.set_internal(out_idx, value)?;
        }
        let duration_idx = output.child_by_name(root, "duration").expect("duration field present");
        output.set_internal(duration_idx, Value::Float(duration))?;
        Ok(())
    }
}
