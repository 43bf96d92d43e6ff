//! TimerNode: the only node kind that is always dirty, since something
//! has to drive the graph forward every tick.
//!
//! In external mode a caller (or an upstream link) supplies `ticker_us`
//! and the node just forwards it; in free-running mode the node advances
//! its own microsecond counter by a fixed step every `update()`, the
//! simplest reading of "drives the graph each tick" that needs no extra
//! facade-level API beyond the fixed `update()` call already in the
//! external surface (see the Open Questions note in `DESIGN.md`).

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LogicError;
use crate::nodes::NodeHeader;
use crate::types::property::{PropertyTree, SemanticRole};
use crate::types::schema::TypeNode;
use crate::types::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    FreeRunning { step_us: u64 },
    External,
}

pub struct TimerNode {
    pub header: NodeHeader,
    pub mode: TimerMode,
    elapsed_us: u64,
    pub input_tree: Rc<RefCell<PropertyTree>>,
    pub output_tree: Rc<RefCell<PropertyTree>>,
}

impl TimerNode {
    pub fn new(header: NodeHeader, mode: TimerMode) -> Self {
        let input_schema = match mode {
            TimerMode::External => {
                TypeNode::new_struct(vec![("ticker_us".to_string(), TypeNode::Leaf(ValueType::Int64))])
                    .expect("single-field struct cannot collide")
            }
            TimerMode::FreeRunning { .. } => TypeNode::new_struct(vec![]).expect("empty struct is valid"),
        };
        let output_schema = TypeNode::new_struct(vec![("ticker_us".to_string(), TypeNode::Leaf(ValueType::Int64))])
            .expect("single-field struct cannot collide");
        let input_tree = PropertyTree::from_schema(&input_schema, SemanticRole::ScriptInput);
        let output_tree = PropertyTree::from_schema(&output_schema, SemanticRole::ScriptOutput);
        Self {
            header,
            mode,
            elapsed_us: 0,
            input_tree: Rc::new(RefCell::new(input_tree)),
            output_tree: Rc::new(RefCell::new(output_tree)),
        }
    }

    pub fn update(&mut self) -> Result<(), LogicError> {
        let ticker_us = match self.mode {
            TimerMode::External => {
                let tree = self.input_tree.borrow();
                let root = tree.root();
                let idx = tree.child_by_name(root, "ticker_us").expect("ticker_us field present");
                tree.get::<i64>(idx).unwrap_or(0)
            }
            TimerMode::FreeRunning { step_us } => {
                self.elapsed_us += step_us;
                self.elapsed_us as i64
            }
        };
        let mut output = self.output_tree.borrow_mut();
        let root = output.root();
        let idx = output.child_by_name(root, "ticker_us").expect("ticker_us field present");
        output.set_internal(idx, Value::Int64(ticker_us))?;
        self.header.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    #[test]
    fn free_running_timer_advances_by_its_step_every_tick() {
        let mut timer = TimerNode::new(NodeHeader::new(NodeId(1), "t".into()), TimerMode::FreeRunning { step_us: 1000 });
        timer.update().unwrap();
        timer.update().unwrap();
        let tree = timer.output_tree.borrow();
        let root = tree.root();
        let idx = tree.child_by_name(root, "ticker_us").unwrap();
        assert_eq!(tree.get::<i64>(idx), Some(2000));
    }

    #[test]
    fn external_timer_forwards_its_input() {
        let mut timer = TimerNode::new(NodeHeader::new(NodeId(1), "t".into()), TimerMode::External);
        {
            let mut tree = timer.input_tree.borrow_mut();
            let root = tree.root();
            let idx = tree.child_by_name(root, "ticker_us").unwrap();
            tree.set_internal(idx, Value::Int64(42)).unwrap();
        }
        timer.update().unwrap();
        let tree = timer.output_tree.borrow();
        let root = tree.root();
        let idx = tree.child_by_name(root, "ticker_us").unwrap();
        assert_eq!(tree.get::<i64>(idx), Some(42));
    }

    #[test]
    fn timer_stays_dirty_after_update() {
        let mut timer = TimerNode::new(NodeHeader::new(NodeId(1), "t".into()), TimerMode::FreeRunning { step_us: 1 });
        timer.header.dirty = false;
        timer.update().unwrap();
        assert!(timer.header.dirty);
    }
}
