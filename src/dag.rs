//! Index-based arena holding the protocol graph of one application run.

use std::{fmt, marker::PhantomData};

use crate::{
    builder::Builder,
    error::{Error, StateError},
    protocol::{Output, Protocol, Suite},
};

/// The index of a node in the protocol graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The position of the node in the graph.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node #{}", self.0)
    }
}

/// A handle to the value of type `T` a node produces once it has been evaluated.
pub struct Deferred<T> {
    node: NodeId,
    _value: PhantomData<fn() -> T>,
}

impl<T> Deferred<T> {
    pub(crate) fn new(node: NodeId) -> Self {
        Self {
            node,
            _value: PhantomData,
        }
    }

    /// The node producing the value.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Deferred<T> {}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Deferred").field(&self.node).finish()
    }
}

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(Output),
    Alias(NodeId),
    Taken,
}

/// The outputs of all nodes, indexed like the nodes themselves.
#[derive(Debug, Default)]
pub struct Values {
    slots: Vec<Slot>,
}

impl Values {
    fn resolve(&self, node: NodeId) -> Result<&Slot, StateError> {
        let mut current = node;
        loop {
            match self.slots.get(current.0) {
                Some(Slot::Alias(target)) => current = *target,
                Some(slot) => return Ok(slot),
                None => return Err(StateError::Unresolved { node }),
            }
        }
    }

    /// Borrows the value of a finished node.
    pub fn get<T: 'static>(&self, handle: Deferred<T>) -> Result<&T, StateError> {
        let node = handle.node;
        match self.resolve(node)? {
            Slot::Ready(value) => value
                .downcast_ref::<T>()
                .ok_or(StateError::TypeMismatch { node }),
            Slot::Pending => Err(StateError::Unresolved { node }),
            Slot::Taken => Err(StateError::OutputTaken { node }),
            Slot::Alias(_) => Err(StateError::Unresolved { node }),
        }
    }

    /// Moves the value of a finished node out of the arena.
    pub(crate) fn take<T: 'static>(&mut self, handle: Deferred<T>) -> Result<T, StateError> {
        let node = handle.node;
        let mut current = node;
        while let Some(Slot::Alias(target)) = self.slots.get(current.0) {
            current = *target;
        }
        let slot = self
            .slots
            .get_mut(current.0)
            .ok_or(StateError::Unresolved { node })?;
        match std::mem::replace(slot, Slot::Taken) {
            Slot::Ready(value) => match value.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(value) => {
                    *slot = Slot::Ready(value);
                    Err(StateError::TypeMismatch { node })
                }
            },
            Slot::Pending => {
                *slot = Slot::Pending;
                Err(StateError::Unresolved { node })
            }
            Slot::Taken | Slot::Alias(_) => Err(StateError::OutputTaken { node }),
        }
    }

    fn push_pending(&mut self) {
        self.slots.push(Slot::Pending);
    }

    pub(crate) fn set(&mut self, node: NodeId, value: Output) {
        self.slots[node.0] = Slot::Ready(value);
    }

    pub(crate) fn alias(&mut self, node: NodeId, target: NodeId) {
        self.slots[node.0] = Slot::Alias(target);
    }
}

/// Registers further nodes once the value it waits for is available.
pub(crate) type Continuation<S> =
    Box<dyn FnOnce(&mut Builder<'_, S>) -> Result<NodeId, Error> + Send>;

pub(crate) enum Task<S: Suite> {
    /// A protocol evaluated in rounds.
    Native(Protocol<S>),
    /// Expands into a sub-graph when its dependencies are done.
    Expand(Continuation<S>),
    /// Resolves to the value of another node.
    Forward(NodeId),
    /// Completes a parallel block, resolves to `()`.
    Join,
    Finished,
}

impl<S: Suite> Task<S> {
    pub(crate) fn is_native(&self) -> bool {
        matches!(self, Task::Native(_))
    }
}

pub(crate) struct Node<S: Suite> {
    pub(crate) deps: Vec<NodeId>,
    pub(crate) task: Task<S>,
    pub(crate) round: usize,
    pub(crate) done: bool,
}

/// The protocol graph. Edges always point to nodes that existed when the dependent node was
/// registered, except for the result edge added when a continuation expands.
pub(crate) struct Dag<S: Suite> {
    pub(crate) nodes: Vec<Node<S>>,
    pub(crate) values: Values,
}

impl<S: Suite> Dag<S> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![],
            values: Values::default(),
        }
    }

    pub(crate) fn push(&mut self, deps: Vec<NodeId>, task: Task<S>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            deps,
            task,
            round: 0,
            done: false,
        });
        self.values.push_pending();
        id
    }

    /// Adds a node that is already finished.
    pub(crate) fn push_ready(&mut self, value: Output) -> NodeId {
        let id = self.push(vec![], Task::Finished);
        self.nodes[id.0].done = true;
        self.values.set(id, value);
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_ready(&self, i: usize) -> bool {
        let node = &self.nodes[i];
        !node.done && node.deps.iter().all(|d| self.nodes[d.0].done)
    }

    pub(crate) fn pending(&self) -> usize {
        self.nodes.iter().filter(|n| !n.done).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_follow_aliases() {
        let mut values = Values::default();
        for _ in 0..3 {
            values.push_pending();
        }
        let a = Deferred::<u32>::new(NodeId(0));
        let b = Deferred::<u32>::new(NodeId(2));
        assert_eq!(values.get(a), Err(StateError::Unresolved { node: NodeId(0) }));
        values.set(NodeId(1), Box::new(7u32));
        values.alias(NodeId(2), NodeId(1));
        values.alias(NodeId(0), NodeId(2));
        assert_eq!(values.get(a), Ok(&7));
        assert_eq!(values.get(b), Ok(&7));
        assert_eq!(
            values.get(Deferred::<String>::new(NodeId(1))),
            Err(StateError::TypeMismatch { node: NodeId(1) })
        );
        assert_eq!(values.take(b), Ok(7));
        assert_eq!(values.get(a), Err(StateError::OutputTaken { node: NodeId(0) }));
    }

    #[test]
    fn mistyped_take_keeps_the_value() {
        let mut values = Values::default();
        values.push_pending();
        values.set(NodeId(0), Box::new(1u8));
        assert_eq!(
            values.take(Deferred::<u16>::new(NodeId(0))),
            Err(StateError::TypeMismatch { node: NodeId(0) })
        );
        assert_eq!(values.take(Deferred::<u8>::new(NodeId(0))), Ok(1));
    }
}
