//! Evaluation of a protocol graph, one batch of rounds at a time.
//!
//! A node is ready once all of its dependencies are done. Structural nodes (continuations,
//! forwards and joins) are resolved locally as soon as they are ready. Protocol nodes are
//! evaluated according to the [`EvaluationStrategy`], with one exchange of messages between
//! consecutive rounds of a protocol.

use tracing::{debug, trace};

use crate::{
    builder::{Builder, Context},
    channel::Channel,
    config::{EngineConfig, EvaluationStrategy},
    dag::{Dag, NodeId, Task},
    error::{Error, StateError},
    network::{Network, RoundNetwork},
    pool::ResourcePool,
    protocol::{EvaluationStatus, NativeProtocol, RoundContext, Suite},
};

/// Statistics of an evaluation.
///
/// For a fixed application, configuration and randomness these are identical across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Groups of protocol rounds evaluated between exchanges.
    pub batches: usize,
    /// Network exchanges.
    pub exchanges: usize,
    /// Protocols evaluated to completion.
    pub nodes: usize,
    /// Messages sent to other parties.
    pub messages: usize,
    /// Payload bytes sent to other parties.
    pub bytes: usize,
}

pub(crate) struct Evaluator<'a, S: Suite, C> {
    dag: &'a mut Dag<S>,
    ctx: &'a Context,
    pool: &'a mut ResourcePool<S::State>,
    network: &'a Network<C>,
    config: &'a EngineConfig,
    round: RoundNetwork,
    first_pending: usize,
    stats: EvaluationStats,
}

impl<'a, S: Suite, C: Channel> Evaluator<'a, S, C> {
    pub(crate) fn new(
        dag: &'a mut Dag<S>,
        ctx: &'a Context,
        pool: &'a mut ResourcePool<S::State>,
        network: &'a Network<C>,
        config: &'a EngineConfig,
    ) -> Self {
        let round = RoundNetwork::new(network.party_id(), network.parties());
        Self {
            dag,
            ctx,
            pool,
            network,
            config,
            round,
            first_pending: 0,
            stats: EvaluationStats::default(),
        }
    }

    /// Evaluates every node of the graph, including those added while evaluating.
    pub(crate) async fn run(mut self) -> Result<EvaluationStats, Error> {
        match self.config.strategy {
            EvaluationStrategy::Sequential => self.run_sequential().await?,
            EvaluationStrategy::SequentialBatched => self.run_batched().await?,
        }
        if let Some(party) = self.round.unread() {
            return Err(StateError::UnconsumedMessages { party }.into());
        }
        debug!(
            nodes = self.stats.nodes,
            batches = self.stats.batches,
            exchanges = self.stats.exchanges,
            "evaluation finished"
        );
        Ok(self.stats)
    }

    async fn run_sequential(&mut self) -> Result<(), Error> {
        while let Some(i) = self.next_ready()? {
            if !self.dag.nodes[i].task.is_native() {
                self.resolve(i)?;
                continue;
            }
            loop {
                self.stats.batches += 1;
                match self.step(i)? {
                    EvaluationStatus::HasMoreRounds => self.exchange().await?,
                    EvaluationStatus::IsDone => break,
                }
            }
            self.stats.nodes += 1;
            self.ensure_flushed()?;
            if let Some(party) = self.round.unread() {
                return Err(StateError::UnconsumedMessages { party }.into());
            }
        }
        Ok(())
    }

    async fn run_batched(&mut self) -> Result<(), Error> {
        loop {
            self.settle()?;
            let batch = self.next_batch();
            if batch.is_empty() {
                return match self.dag.pending() {
                    0 => Ok(()),
                    pending => Err(StateError::Deadlock { pending }.into()),
                };
            }
            self.stats.batches += 1;
            let mut more_rounds = false;
            for &i in &batch {
                match self.step(i)? {
                    EvaluationStatus::HasMoreRounds => more_rounds = true,
                    EvaluationStatus::IsDone => self.stats.nodes += 1,
                }
            }
            debug!(size = batch.len(), more_rounds, "evaluated batch");
            if more_rounds {
                self.exchange().await?;
            } else {
                self.ensure_flushed()?;
            }
        }
    }

    fn advance_pending(&mut self) {
        while self
            .dag
            .nodes
            .get(self.first_pending)
            .is_some_and(|node| node.done)
        {
            self.first_pending += 1;
        }
    }

    /// The lowest ready node, or `None` once every node is done.
    fn next_ready(&mut self) -> Result<Option<usize>, Error> {
        self.advance_pending();
        if self.first_pending == self.dag.len() {
            return Ok(None);
        }
        match (self.first_pending..self.dag.len()).find(|&i| self.dag.is_ready(i)) {
            Some(i) => Ok(Some(i)),
            None => Err(StateError::Deadlock {
                pending: self.dag.pending(),
            }
            .into()),
        }
    }

    /// Resolves ready structural nodes until only protocol nodes are ready.
    fn settle(&mut self) -> Result<(), Error> {
        loop {
            self.advance_pending();
            let ready: Vec<usize> = (self.first_pending..self.dag.len())
                .filter(|&i| self.dag.is_ready(i) && !self.dag.nodes[i].task.is_native())
                .collect();
            if ready.is_empty() {
                return Ok(());
            }
            for i in ready {
                self.resolve(i)?;
            }
        }
    }

    /// Ready protocol nodes in ascending order. Protocols in the middle of their rounds are
    /// always included, since their messages have already been exchanged.
    fn next_batch(&mut self) -> Vec<usize> {
        self.advance_pending();
        let mut running = vec![];
        let mut fresh = vec![];
        for i in self.first_pending..self.dag.len() {
            if self.dag.is_ready(i) && self.dag.nodes[i].task.is_native() {
                if self.dag.nodes[i].round > 0 {
                    running.push(i);
                } else {
                    fresh.push(i);
                }
            }
        }
        let capacity = self.config.max_batch_size.saturating_sub(running.len());
        fresh.truncate(capacity);
        running.extend(fresh);
        running.sort_unstable();
        running
    }

    fn resolve(&mut self, i: usize) -> Result<(), Error> {
        let id = NodeId(i);
        match std::mem::replace(&mut self.dag.nodes[i].task, Task::Finished) {
            Task::Expand(continuation) => {
                let mut builder = Builder::root(&mut *self.dag, self.ctx);
                let result = continuation(&mut builder)?;
                trace!(node = %id, result = %result, "expanded continuation");
                let node = &mut self.dag.nodes[i];
                node.deps.push(result);
                node.task = Task::Forward(result);
            }
            Task::Forward(target) => {
                self.dag.values.alias(id, target);
                self.dag.nodes[i].done = true;
            }
            Task::Join => {
                self.dag.values.set(id, Box::new(()));
                self.dag.nodes[i].done = true;
            }
            Task::Native(_) | Task::Finished => return Err(StateError::AlreadyDone.into()),
        }
        Ok(())
    }

    fn step(&mut self, i: usize) -> Result<EvaluationStatus, Error> {
        let Dag { nodes, values } = &mut *self.dag;
        let node = &mut nodes[i];
        let Task::Native(protocol) = &mut node.task else {
            return Err(StateError::AlreadyDone.into());
        };
        let mut ctx = RoundContext {
            pool: &mut *self.pool,
            network: &mut self.round,
            values: &*values,
            node: NodeId(i),
        };
        let status = protocol.evaluate(node.round, &mut ctx)?;
        node.round += 1;
        if status == EvaluationStatus::IsDone {
            let output = protocol.out()?;
            values.set(NodeId(i), output);
            node.task = Task::Finished;
            node.done = true;
        }
        Ok(status)
    }

    fn ensure_flushed(&self) -> Result<(), Error> {
        match self.round.pending_outgoing() {
            Some(party) => Err(StateError::SentInFinalRound { party }.into()),
            None => Ok(()),
        }
    }

    async fn exchange(&mut self) -> Result<(), Error> {
        let phase = format!("exchange {}", self.stats.exchanges);
        let traffic = self
            .round
            .exchange(self.network, &phase, self.config.round_timeout())
            .await?;
        self.stats.exchanges += 1;
        self.stats.messages += traffic.messages;
        self.stats.bytes += traffic.bytes;
        Ok(())
    }
}
