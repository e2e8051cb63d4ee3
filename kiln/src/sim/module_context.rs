use crate::graph;

use std::collections::HashMap;

pub(crate) type ContextIndex = usize;

pub(crate) const ROOT: ContextIndex = 0;

/// One position in a flattened instance hierarchy.
///
/// The same [`graph::Instance`] reached through different parents gets a distinct context, so every instantiation has its own state.
pub(crate) struct InstanceContext<'a> {
    pub instance_and_parent: Option<(&'a graph::Instance<'a>, ContextIndex)>,
    pub path: Vec<String>,
    children: HashMap<*const graph::Instance<'a>, ContextIndex>,
}

pub(crate) struct ContextTree<'a> {
    contexts: Vec<InstanceContext<'a>>,
}

impl<'a> ContextTree<'a> {
    pub fn new() -> ContextTree<'a> {
        ContextTree {
            contexts: vec![InstanceContext {
                instance_and_parent: None,
                path: Vec::new(),
                children: HashMap::new(),
            }],
        }
    }

    pub fn get(&self, context: ContextIndex) -> &InstanceContext<'a> {
        &self.contexts[context]
    }

    pub fn get_child(
        &mut self,
        parent: ContextIndex,
        instance: &'a graph::Instance<'a>,
    ) -> ContextIndex {
        let key = instance as *const _;
        if let Some(&child) = self.contexts[parent].children.get(&key) {
            return child;
        }
        let mut path = self.contexts[parent].path.clone();
        path.push(instance.name().to_string());
        let child = self.contexts.len();
        self.contexts.push(InstanceContext {
            instance_and_parent: Some((instance, parent)),
            path,
            children: HashMap::new(),
        });
        self.contexts[parent].children.insert(key, child);
        child
    }

    /// Qualifies `name` with the instance path of `context`, separated by `.`.
    pub fn qualified_name(&self, context: ContextIndex, name: &str) -> String {
        let path = &self.contexts[context].path;
        if path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", path.join("."), name)
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }
}
