//! Lazy construction of protocol graphs from sequential and parallel blocks.
//!
//! Building never communicates: every method only registers nodes and the edges between them.
//! Results are returned as [`Deferred`] handles that can be passed to later protocols, read
//! inside [`Builder::then`] continuations once they are available, or returned to the engine as
//! the output of the application.
//!
//! Nodes registered in a sequential block depend on the node registered before them, nodes
//! registered in a parallel block only depend on what preceded the block, and the block as a
//! whole completes once all of them completed.

use crate::{
    dag::{Continuation, Dag, Task},
    error::{Error, StateError},
    protocol::{LocalProtocol, Protocol, RoundContext, Suite},
    ring::{Ring, RingElement},
    suite::Numeric,
};

pub use crate::dag::{Deferred, NodeId, Values};

/// The parameters of a run that are known while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    party_id: usize,
    parties: usize,
    ring: Option<Ring>,
}

impl Context {
    pub(crate) fn new(party_id: usize, parties: usize, ring: Option<Ring>) -> Self {
        Self {
            party_id,
            parties,
            ring,
        }
    }
}

#[derive(Debug)]
enum Scope {
    Sequential {
        tail: Option<NodeId>,
    },
    Parallel {
        anchor: Option<NodeId>,
        members: Vec<NodeId>,
    },
}

/// Registers protocols in the graph of the current run.
pub struct Builder<'a, S: Suite> {
    dag: &'a mut Dag<S>,
    ctx: &'a Context,
    scope: Scope,
}

impl<'a, S: Suite> Builder<'a, S> {
    pub(crate) fn root(dag: &'a mut Dag<S>, ctx: &'a Context) -> Self {
        Self {
            dag,
            ctx,
            scope: Scope::Sequential { tail: None },
        }
    }

    /// The index of this party.
    pub fn party_id(&self) -> usize {
        self.ctx.party_id
    }

    /// The total number of parties.
    pub fn parties(&self) -> usize {
        self.ctx.parties
    }

    /// The ring cleartext values of the suite live in.
    pub fn ring(&self) -> Option<Ring> {
        self.ctx.ring
    }

    fn anchor(&self) -> Option<NodeId> {
        match &self.scope {
            Scope::Sequential { tail } => *tail,
            Scope::Parallel { anchor, .. } => *anchor,
        }
    }

    /// Records a node (or the completion of a sub-block) as the latest member of this scope.
    fn complete(&mut self, node: NodeId) {
        match &mut self.scope {
            Scope::Sequential { tail } => *tail = Some(node),
            Scope::Parallel { members, .. } => members.push(node),
        }
    }

    fn register(&mut self, inputs: &[NodeId], task: Task<S>) -> NodeId {
        let mut deps: Vec<NodeId> = inputs.to_vec();
        if let Some(anchor) = self.anchor() {
            deps.push(anchor);
        }
        deps.sort_unstable();
        deps.dedup();
        let id = self.dag.push(deps, task);
        self.complete(id);
        id
    }

    /// The node that completes this scope, adding a join node for parallel scopes.
    fn finish(self) -> Option<NodeId> {
        match self.scope {
            Scope::Sequential { tail } => tail,
            Scope::Parallel { members, .. } => match members.len() {
                0 => None,
                1 => Some(members[0]),
                _ => Some(self.dag.push(members, Task::Join)),
            },
        }
    }

    fn child(&mut self, scope: Scope) -> Builder<'_, S> {
        Builder {
            dag: &mut *self.dag,
            ctx: self.ctx,
            scope,
        }
    }

    /// Runs `f` in a sequential block: every node depends on the node registered before it.
    pub fn seq<R>(
        &mut self,
        f: impl FnOnce(&mut Builder<'_, S>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let tail = self.anchor();
        let mut child = self.child(Scope::Sequential { tail });
        let result = f(&mut child)?;
        let completion = child.finish();
        if let Some(node) = completion.filter(|node| Some(*node) != tail) {
            self.complete(node);
        }
        Ok(result)
    }

    /// Runs `f` in a parallel block: the nodes registered directly inside it are independent of
    /// each other and may be evaluated in the same round.
    pub fn par<R>(
        &mut self,
        f: impl FnOnce(&mut Builder<'_, S>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let anchor = self.anchor();
        let mut child = self.child(Scope::Parallel {
            anchor,
            members: vec![],
        });
        let result = f(&mut child)?;
        if let Some(node) = child.finish() {
            self.complete(node);
        }
        Ok(result)
    }

    /// Continues with `f` once `prev` has been evaluated.
    ///
    /// `f` receives the value of `prev` and a builder for a fresh sequential block; the returned
    /// handle resolves to the value of the handle `f` returns.
    pub fn then<T, U, F>(&mut self, prev: Deferred<T>, f: F) -> Deferred<U>
    where
        T: Clone + 'static,
        U: 'static,
        F: FnOnce(&mut Builder<'_, S>, T) -> Result<Deferred<U>, Error> + Send + 'static,
    {
        let continuation = continuation(move |b| {
            let value = b.dag.values.get(prev)?.clone();
            Ok(f(b, value)?.node())
        });
        Deferred::new(self.register(&[prev.node()], Task::Expand(continuation)))
    }

    /// A value that is known while building. It does not take part in the ordering of the block.
    pub fn value<T: Send + 'static>(&mut self, value: T) -> Deferred<T> {
        Deferred::new(self.dag.push_ready(Box::new(value)))
    }

    /// Appends a protocol that reads the given inputs.
    pub fn append<T: 'static>(&mut self, protocol: Protocol<S>, inputs: &[NodeId]) -> Deferred<T> {
        Deferred::new(self.register(inputs, Task::Native(protocol)))
    }

    /// Appends a protocol of the suite.
    pub fn append_native<T: 'static>(
        &mut self,
        protocol: S::Native,
        inputs: &[NodeId],
    ) -> Deferred<T> {
        self.append(Protocol::Suite(protocol), inputs)
    }

    /// Appends a local computation over the values of `inputs`.
    pub fn local<T, F>(&mut self, inputs: &[NodeId], f: F) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut RoundContext<'_, S>) -> Result<T, Error> + Send + 'static,
    {
        self.append(Protocol::Local(LocalProtocol::new(f)), inputs)
    }

    /// Applies `f` to a value once it is available.
    pub fn map<T, U, F>(&mut self, input: Deferred<T>, f: F) -> Deferred<U>
    where
        T: Clone + 'static,
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        self.local(&[input.node()], move |ctx| f(ctx.value(input)?.clone()))
    }

    /// Combines two values once both are available.
    pub fn map2<T1, T2, U, F>(&mut self, a: Deferred<T1>, b: Deferred<T2>, f: F) -> Deferred<U>
    where
        T1: Clone + 'static,
        T2: Clone + 'static,
        U: Send + 'static,
        F: FnOnce(T1, T2) -> Result<U, Error> + Send + 'static,
    {
        self.local(&[a.node(), b.node()], move |ctx| {
            f(ctx.value(a)?.clone(), ctx.value(b)?.clone())
        })
    }

    /// Collects the values of several handles, in order.
    pub fn collect<T: Clone + Send + 'static>(
        &mut self,
        handles: Vec<Deferred<T>>,
    ) -> Deferred<Vec<T>> {
        let inputs: Vec<NodeId> = handles.iter().map(Deferred::node).collect();
        self.local(&inputs, move |ctx| {
            handles.iter().map(|h| ctx.value(*h).cloned()).collect()
        })
    }
}

fn continuation<S, F>(f: F) -> Continuation<S>
where
    S: Suite,
    F: FnOnce(&mut Builder<'_, S>) -> Result<NodeId, Error> + Send + 'static,
{
    Box::new(f)
}

/// Arithmetic on secret-shared values, for suites that provide it.
impl<S: Numeric> Builder<'_, S> {
    fn numeric_ring(&self) -> Result<Ring, Error> {
        Ok(self.ring().ok_or(StateError::MissingRing)?)
    }

    fn check_party(&self, party: usize) -> Result<(), Error> {
        if party < self.parties() {
            Ok(())
        } else {
            Err(StateError::InvalidParty {
                party,
                parties: self.parties(),
            }
            .into())
        }
    }

    /// Secret-shares a value known to all parties, reduced modulo the ring.
    pub fn known(&mut self, value: u128) -> Result<Deferred<S::Share>, Error> {
        let value = self.numeric_ring()?.element(value);
        Ok(self.known_element(value))
    }

    /// Secret-shares a ring element known to all parties.
    pub fn known_element(&mut self, value: RingElement) -> Deferred<S::Share> {
        self.append_native(S::known(value), &[])
    }

    /// Secret-shares the private input of `owner`. Only the owner has to provide a value.
    pub fn input(
        &mut self,
        owner: usize,
        value: Option<u128>,
    ) -> Result<Deferred<S::Share>, Error> {
        self.check_party(owner)?;
        let ring = self.numeric_ring()?;
        let value = if owner == self.party_id() {
            let value = value.ok_or(StateError::MissingInput { owner })?;
            Some(ring.element(value))
        } else {
            None
        };
        Ok(self.append_native(S::input(owner, value), &[]))
    }

    /// Adds two shared values.
    pub fn add(&mut self, a: Deferred<S::Share>, b: Deferred<S::Share>) -> Deferred<S::Share> {
        self.append_native(S::add(a, b), &[a.node(), b.node()])
    }

    /// Subtracts `b` from `a`.
    pub fn sub(&mut self, a: Deferred<S::Share>, b: Deferred<S::Share>) -> Deferred<S::Share> {
        self.append_native(S::sub(a, b), &[a.node(), b.node()])
    }

    /// Multiplies two shared values.
    pub fn mult(&mut self, a: Deferred<S::Share>, b: Deferred<S::Share>) -> Deferred<S::Share> {
        self.append_native(S::mult(a, b), &[a.node(), b.node()])
    }

    /// Reveals a shared value to all parties.
    pub fn open(&mut self, a: Deferred<S::Share>) -> Deferred<RingElement> {
        self.append_native(S::open(a), &[a.node()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ring::Ring, suite::dummy::DummySuite};

    fn ctx() -> Context {
        Context::new(0, 1, Some(Ring::modulo(13).unwrap()))
    }

    fn deps(dag: &Dag<DummySuite>, node: NodeId) -> Vec<usize> {
        dag.nodes[node.0].deps.iter().map(NodeId::index).collect()
    }

    #[test]
    fn sequential_nodes_are_chained() -> Result<(), Error> {
        let ctx = ctx();
        let mut dag = Dag::new();
        let mut b = Builder::<DummySuite>::root(&mut dag, &ctx);
        let x = b.known(1)?;
        let y = b.known(2)?;
        let z = b.add(x, y);
        assert_eq!(b.finish(), Some(z.node()));
        assert!(deps(&dag, x.node()).is_empty());
        assert_eq!(deps(&dag, y.node()), vec![0]);
        assert_eq!(deps(&dag, z.node()), vec![0, 1]);
        Ok(())
    }

    #[test]
    fn parallel_nodes_are_joined() -> Result<(), Error> {
        let ctx = ctx();
        let mut dag = Dag::new();
        let mut b = Builder::<DummySuite>::root(&mut dag, &ctx);
        let first = b.known(1)?;
        let (x, y) = b.par(|b| Ok((b.known(2)?, b.known(3)?)))?;
        let after = b.known(4)?;
        assert_eq!(deps(&dag, x.node()), vec![first.node().index()]);
        assert_eq!(deps(&dag, y.node()), vec![first.node().index()]);
        // the join node sits between the parallel block and the next node
        let join = NodeId(y.node().index() + 1);
        assert!(matches!(dag.nodes[join.0].task, Task::Join));
        assert_eq!(deps(&dag, join), vec![x.node().index(), y.node().index()]);
        assert_eq!(deps(&dag, after.node()), vec![join.index()]);
        Ok(())
    }

    #[test]
    fn nested_sequences_inside_parallel_blocks() -> Result<(), Error> {
        let ctx = ctx();
        let mut dag = Dag::new();
        let mut b = Builder::<DummySuite>::root(&mut dag, &ctx);
        let (a, c) = b.par(|b| {
            let a = b.seq(|b| {
                let a1 = b.known(1)?;
                let a2 = b.known(2)?;
                Ok(b.add(a1, a2))
            })?;
            let c = b.known(3)?;
            Ok((a, c))
        })?;
        assert_eq!(deps(&dag, NodeId(1)), vec![0]);
        assert!(deps(&dag, c.node()).is_empty());
        let join = NodeId(c.node().index() + 1);
        assert_eq!(deps(&dag, join), vec![a.node().index(), c.node().index()]);
        Ok(())
    }

    #[test]
    fn values_do_not_take_part_in_ordering() -> Result<(), Error> {
        let ctx = ctx();
        let mut dag = Dag::new();
        let mut b = Builder::<DummySuite>::root(&mut dag, &ctx);
        let x = b.known(1)?;
        let v = b.value(5u32);
        let y = b.known(2)?;
        assert_eq!(deps(&dag, y.node()), vec![x.node().index()]);
        assert!(dag.nodes[v.node().0].done);
        assert_eq!(dag.values.get(v), Ok(&5));
        Ok(())
    }

    #[test]
    fn inputs_need_an_owner_and_a_value() {
        let ctx = Context::new(0, 2, Some(Ring::modulo(13).unwrap()));
        let mut dag = Dag::new();
        let mut b = Builder::<DummySuite>::root(&mut dag, &ctx);
        assert!(matches!(
            b.input(2, Some(1)),
            Err(Error::State(StateError::InvalidParty { party: 2, parties: 2 }))
        ));
        assert!(matches!(
            b.input(0, None),
            Err(Error::State(StateError::MissingInput { owner: 0 }))
        ));
        assert!(b.input(1, None).is_ok());
    }
}
