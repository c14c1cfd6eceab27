//! Party-level network access on top of a [`Channel`].
//!
//! [`Network`] is the live connection of one party to all others. Protocols never touch it
//! directly; during a round they queue and read messages through a [`RoundNetwork`], which the
//! evaluator flushes with a single exchange per round boundary.

use std::{collections::VecDeque, time::Duration};

use futures::future::{try_join, try_join_all};
use tokio::{sync::Mutex, time::timeout};
use tracing::{Level, instrument, trace};

use crate::{
    channel::{self, Channel, ErrorKind, recv_from, send_to},
    error::{Error, StateError},
    ring::{Ring, RingElement},
};

/// The default time to wait for a message before giving up, 10 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// The connection of one party to all parties (including itself).
///
/// Messages a party sends to itself are kept in a local loopback queue.
#[derive(Debug)]
pub struct Network<C> {
    channel: C,
    party_id: usize,
    parties: usize,
    timeout: Duration,
    loopback: Mutex<VecDeque<Vec<u8>>>,
}

impl<C: Channel> Network<C> {
    /// Wraps the channel of party `party_id` among `parties` parties.
    pub fn new(channel: C, party_id: usize, parties: usize) -> Result<Self, StateError> {
        if party_id >= parties {
            return Err(StateError::InvalidParty {
                party: party_id,
                parties,
            });
        }
        Ok(Self {
            channel,
            party_id,
            parties,
            timeout: DEFAULT_TIMEOUT,
            loopback: Mutex::new(VecDeque::new()),
        })
    }

    /// Sets how long a receive waits before failing with [`ErrorKind::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The index of this party.
    pub fn party_id(&self) -> usize {
        self.party_id
    }

    /// The total number of parties.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The receive timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn check_party(&self, party: usize) -> Result<(), StateError> {
        if party < self.parties {
            Ok(())
        } else {
            Err(StateError::InvalidParty {
                party,
                parties: self.parties,
            })
        }
    }

    /// Sends a byte string to a single party.
    pub async fn send_to(&self, party: usize, phase: &str, msg: Vec<u8>) -> Result<(), Error> {
        self.check_party(party)?;
        if party == self.party_id {
            self.loopback.lock().await.push_back(msg);
            return Ok(());
        }
        send_to(&self.channel, party, phase, &msg).await?;
        Ok(())
    }

    /// Sends the same byte string to every party, including this one.
    pub async fn send_to_all(&self, phase: &str, msg: &[u8]) -> Result<(), Error> {
        for party in 0..self.parties {
            self.send_to(party, phase, msg.to_vec()).await?;
        }
        Ok(())
    }

    /// Receives the next byte string from a single party.
    pub async fn receive_from(&self, party: usize, phase: &str) -> Result<Vec<u8>, Error> {
        self.check_party(party)?;
        if party == self.party_id {
            return self
                .loopback
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| channel::Error::new(phase, ErrorKind::MissingMessage).into());
        }
        Ok(self.recv_within(party, phase, self.timeout).await?)
    }

    /// Receives one byte string from every party, ordered by party index.
    pub async fn receive_from_all(&self, phase: &str) -> Result<Vec<Vec<u8>>, Error> {
        let mut msgs = Vec::with_capacity(self.parties);
        for party in 0..self.parties {
            msgs.push(self.receive_from(party, phase).await?);
        }
        Ok(msgs)
    }

    async fn recv_within<T: serde::de::DeserializeOwned>(
        &self,
        party: usize,
        phase: &str,
        limit: Duration,
    ) -> Result<T, channel::Error> {
        match timeout(limit, recv_from(&self.channel, party, phase)).await {
            Ok(result) => result,
            Err(_) => Err(channel::Error::new(
                format!("{phase} (party {party})"),
                ErrorKind::Timeout,
            )),
        }
    }
}

/// Traffic of a single exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Traffic {
    pub(crate) messages: usize,
    pub(crate) bytes: usize,
}

/// The messages of one round, as seen by the protocols evaluated in it.
///
/// Messages queued with [`RoundNetwork::send`] during round `r` are delivered by the next
/// exchange and must be read with [`RoundNetwork::receive`] in round `r + 1`. Messages from a
/// party are read in the order the party queued them.
#[derive(Debug)]
pub struct RoundNetwork {
    party_id: usize,
    parties: usize,
    outbox: Vec<Vec<Vec<u8>>>,
    inbox: Vec<VecDeque<Vec<u8>>>,
}

impl RoundNetwork {
    pub(crate) fn new(party_id: usize, parties: usize) -> Self {
        Self {
            party_id,
            parties,
            outbox: vec![vec![]; parties],
            inbox: vec![VecDeque::new(); parties],
        }
    }

    /// The index of this party.
    pub fn party_id(&self) -> usize {
        self.party_id
    }

    /// The total number of parties.
    pub fn parties(&self) -> usize {
        self.parties
    }

    fn check_party(&self, party: usize) -> Result<(), StateError> {
        if party < self.parties {
            Ok(())
        } else {
            Err(StateError::InvalidParty {
                party,
                parties: self.parties,
            })
        }
    }

    /// Queues a message for a single party (which may be this party).
    pub fn send(&mut self, party: usize, msg: Vec<u8>) -> Result<(), Error> {
        self.check_party(party)?;
        self.outbox[party].push(msg);
        Ok(())
    }

    /// Queues the same message for every party, including this one.
    pub fn send_to_all(&mut self, msg: Vec<u8>) {
        for outbox in self.outbox.iter_mut() {
            outbox.push(msg.clone());
        }
    }

    /// Reads the next message a party sent in the previous round.
    pub fn receive(&mut self, party: usize) -> Result<Vec<u8>, Error> {
        self.check_party(party)?;
        self.inbox[party].pop_front().ok_or_else(|| {
            channel::Error::new(
                format!("round message from party {party}"),
                ErrorKind::MissingMessage,
            )
            .into()
        })
    }

    /// Reads the next message of every party, ordered by party index.
    pub fn receive_from_all(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        (0..self.parties).map(|p| self.receive(p)).collect()
    }

    /// Queues ring elements for a single party, concatenated in their fixed-size encoding.
    pub fn send_elements(&mut self, party: usize, elements: &[RingElement]) -> Result<(), Error> {
        self.send(party, encode_elements(elements))
    }

    /// Queues ring elements for every party, including this one.
    pub fn send_elements_to_all(&mut self, elements: &[RingElement]) {
        self.send_to_all(encode_elements(elements))
    }

    /// Reads exactly `count` elements of `ring` sent by a party as a single message.
    pub fn receive_elements(
        &mut self,
        party: usize,
        ring: Ring,
        count: usize,
    ) -> Result<Vec<RingElement>, Error> {
        let msg = self.receive(party)?;
        decode_elements(&msg, ring, count, party)
    }

    /// Reads exactly `count` elements of `ring` from every party, ordered by party index.
    pub fn receive_elements_from_all(
        &mut self,
        ring: Ring,
        count: usize,
    ) -> Result<Vec<Vec<RingElement>>, Error> {
        (0..self.parties)
            .map(|p| self.receive_elements(p, ring, count))
            .collect()
    }

    /// Returns a party with queued but not yet exchanged messages.
    pub(crate) fn pending_outgoing(&self) -> Option<usize> {
        self.outbox.iter().position(|msgs| !msgs.is_empty())
    }

    /// Returns a party whose delivered messages were not read.
    pub(crate) fn unread(&self) -> Option<usize> {
        self.inbox.iter().position(|msgs| !msgs.is_empty())
    }

    /// Delivers all queued messages, sending one frame to and receiving one frame from every peer.
    #[instrument(level = Level::TRACE, skip_all, fields(party = self.party_id), err)]
    pub(crate) async fn exchange<C: Channel>(
        &mut self,
        network: &Network<C>,
        phase: &str,
        limit: Duration,
    ) -> Result<Traffic, Error> {
        if let Some(party) = self.unread() {
            return Err(StateError::UnconsumedMessages { party }.into());
        }
        let me = self.party_id;
        let mut traffic = Traffic::default();
        let mut frames = Vec::with_capacity(self.parties);
        for (party, outbox) in self.outbox.iter_mut().enumerate() {
            let msgs = std::mem::take(outbox);
            if party != me {
                traffic.messages += msgs.len();
                traffic.bytes += msgs.iter().map(Vec::len).sum::<usize>();
            }
            frames.push((party, msgs));
        }
        let own = std::mem::take(&mut frames[me].1);
        self.inbox[me].extend(own);

        let sends = frames
            .iter()
            .filter(|(party, _)| *party != me)
            .map(|(party, msgs)| send_to(&network.channel, *party, phase, msgs));
        let recvs = (0..self.parties)
            .filter(|party| *party != me)
            .map(|party| network.recv_within::<Vec<Vec<u8>>>(party, phase, limit));
        let (_, received) = try_join(try_join_all(sends), try_join_all(recvs)).await?;

        let peers = (0..self.parties).filter(|party| *party != me);
        for (party, msgs) in peers.zip(received) {
            self.inbox[party].extend(msgs);
        }
        trace!(messages = traffic.messages, bytes = traffic.bytes, "exchanged round");
        Ok(traffic)
    }
}

fn encode_elements(elements: &[RingElement]) -> Vec<u8> {
    elements.iter().flat_map(RingElement::to_bytes).collect()
}

fn decode_elements(
    msg: &[u8],
    ring: Ring,
    count: usize,
    party: usize,
) -> Result<Vec<RingElement>, Error> {
    let len = ring.byte_len();
    if msg.len() != len * count {
        return Err(channel::Error::new(
            format!("ring elements from party {party}"),
            ErrorKind::InvalidLength,
        )
        .into());
    }
    let elements = msg
        .chunks_exact(len)
        .map(|chunk| ring.from_bytes(chunk))
        .collect::<Result<_, _>>()?;
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SimpleChannel;

    fn networks(parties: usize) -> Vec<Network<SimpleChannel>> {
        SimpleChannel::channels(parties)
            .into_iter()
            .enumerate()
            .map(|(i, ch)| Network::new(ch, i, parties).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn send_and_receive_from_all() -> Result<(), Error> {
        let nets = networks(3);
        for net in &nets {
            net.send_to_all("greeting", &[net.party_id() as u8]).await?;
        }
        for net in &nets {
            let msgs = net.receive_from_all("greeting").await?;
            assert_eq!(msgs, vec![vec![0], vec![1], vec![2]]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn receive_times_out() {
        let nets: Vec<_> = networks(2)
            .into_iter()
            .map(|n| n.with_timeout(Duration::from_millis(20)))
            .collect();
        let err = nets[0].receive_from(1, "silence").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connectivity(channel::Error {
                reason: ErrorKind::Timeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn invalid_party_is_rejected() {
        assert!(Network::new(SimpleChannel::channels(1).remove(0), 1, 1).is_err());
        let nets = networks(2);
        let err = nets[0].send_to(2, "nowhere", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::State(StateError::InvalidParty { party: 2, .. })
        ));
    }

    #[tokio::test]
    async fn round_exchange_delivers_in_order() -> Result<(), Error> {
        let nets = networks(2);
        let limit = Duration::from_secs(5);
        let mut rounds: Vec<_> = (0..2).map(|i| RoundNetwork::new(i, 2)).collect();
        for (i, round) in rounds.iter_mut().enumerate() {
            round.send_to_all(vec![i as u8, 1]);
            round.send(1 - i, vec![i as u8, 2])?;
        }
        let (r0, r1) = rounds.split_at_mut(1);
        let (t0, t1) = try_join(
            r0[0].exchange(&nets[0], "test", limit),
            r1[0].exchange(&nets[1], "test", limit),
        )
        .await?;
        assert_eq!(t0, Traffic { messages: 2, bytes: 4 });
        assert_eq!(t1, t0);
        assert_eq!(rounds[0].receive(0)?, vec![0, 1]);
        assert_eq!(rounds[0].receive(1)?, vec![1, 1]);
        assert_eq!(rounds[0].receive(1)?, vec![1, 2]);
        assert!(rounds[0].receive(1).is_err());
        assert_eq!(rounds[1].unread(), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn unread_messages_block_the_next_exchange() {
        let nets = networks(1);
        let mut round = RoundNetwork::new(0, 1);
        round.send_to_all(vec![7]);
        round
            .exchange(&nets[0], "first", DEFAULT_TIMEOUT)
            .await
            .unwrap();
        let err = round
            .exchange(&nets[0], "second", DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::State(StateError::UnconsumedMessages { party: 0 })
        ));
    }

    #[test]
    fn elements_have_exact_size() {
        let ring = Ring::power_of_two(12).unwrap();
        let mut round = RoundNetwork::new(0, 1);
        round.inbox[0].push_back(encode_elements(&[ring.element(1), ring.element(2)]));
        round.inbox[0].push_back(vec![0; 3]);
        let elements = round.receive_elements(0, ring, 2).unwrap();
        assert_eq!(elements, vec![ring.element(1), ring.element(2)]);
        assert!(matches!(
            round.receive_elements(0, ring, 2),
            Err(Error::Connectivity(channel::Error {
                reason: ErrorKind::InvalidLength,
                ..
            }))
        ));
    }
}
