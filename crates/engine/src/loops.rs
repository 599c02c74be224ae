//! Reference cycle detection.

use rustc_hash::FxHashSet;

use crate::addr::Address;
use crate::graph::DepGraph;

enum Step {
    Enter(Address),
    Leave(Address),
}

impl DepGraph {
    /// Whether any formula transitively depends on itself.
    ///
    /// Runs a DFS from every formula with an explicit stack; a node revisited
    /// while still on the current path is a cycle. Non-formula cells have no
    /// outgoing edges and terminate a path.
    pub fn contains_loop(&self) -> bool {
        for start in self.formulas.keys() {
            let mut on_path: FxHashSet<Address> = FxHashSet::default();
            let mut stack: Vec<Step> = vec![Step::Enter(start.clone())];

            while let Some(step) = stack.pop() {
                match step {
                    Step::Enter(node) => {
                        if on_path.contains(&node) {
                            return true;
                        }
                        if !self.is_formula(&node) {
                            continue;
                        }
                        on_path.insert(node.clone());
                        stack.push(Step::Leave(node.clone()));
                        for input in self.direct_inputs(&node) {
                            stack.push(Step::Enter(input));
                        }
                    }
                    Step::Leave(node) => {
                        on_path.remove(&node);
                    }
                }
            }
        }
        false
    }
}
