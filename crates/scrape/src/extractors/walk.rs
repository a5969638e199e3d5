// ABOUTME: Recursive visitor over a JSON tree that yields every object node in document order.
// ABOUTME: Scoring code runs over its output regardless of how the payload nests its data.

use serde_json::{Map, Value};

/// Pre-order iterator over every object in a JSON tree, the root included.
#[derive(Debug, Clone)]
pub struct ObjectNodes<'a> {
    stack: Vec<&'a Value>,
}

/// Walk every object node under (and including) `root`.
pub fn object_nodes(root: &Value) -> ObjectNodes<'_> {
    ObjectNodes { stack: vec![root] }
}

impl<'a> Iterator for ObjectNodes<'a> {
    type Item = &'a Map<String, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(value) = self.stack.pop() {
            match value {
                Value::Object(map) => {
                    self.stack.extend(map.values().rev());
                    return Some(map);
                }
                Value::Array(items) => self.stack.extend(items.iter().rev()),
                _ => {}
            }
        }
        None
    }
}
