//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**; the provided collectives
//! ([`Communicator::alltoallv`], [`Communicator::allgather`], [`Communicator::barrier`])
//! are built on them with a two-stage size-then-payload exchange and must be
//! called by every rank in the same order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::map_error::BlockMapError;

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    pub const fn base(self) -> u16 {
        self.0
    }
    /// Derive a neighbouring tag; wraps at `u16::MAX`.
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// Tags used by one two-stage exchange: sizes first, then payloads.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectiveTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl CollectiveTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

impl Default for CollectiveTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0xB10C))
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Message-passing interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of participating processes.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive; the data handed back by `wait` is truncated to `buf.len()`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Whether data owned by different ranks actually lives in different address
    /// spaces or threads. Serial communicators return `false`.
    fn distributes(&self) -> bool {
        self.size() > 1
    }

    /// Personalized all-to-all: `sends[p]` goes to rank `p`; returns what every rank sent here.
    fn alltoallv(
        &self,
        tags: CollectiveTags,
        sends: &[Vec<u8>],
    ) -> Result<Vec<Vec<u8>>, BlockMapError> {
        exchange_all(self, tags, sends)
    }

    /// Every rank contributes `send`; returns all contributions in rank order.
    fn allgather(&self, tags: CollectiveTags, send: &[u8]) -> Result<Vec<Vec<u8>>, BlockMapError> {
        let sends = vec![send.to_vec(); self.size()];
        self.alltoallv(tags, &sends)
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self, tags: CollectiveTags) -> Result<(), BlockMapError> {
        self.allgather(tags, &[]).map(|_| ())
    }
}

/// Two-stage personalized exchange over point-to-point messages.
///
/// Stage 1 trades byte counts, stage 2 the payloads. Every posted handle is
/// drained before returning, even when a peer misbehaves.
pub fn exchange_all<C>(
    comm: &C,
    tags: CollectiveTags,
    sends: &[Vec<u8>],
) -> Result<Vec<Vec<u8>>, BlockMapError>
where
    C: Communicator + ?Sized,
{
    let size = comm.size();
    let me = comm.rank();
    if sends.len() != size {
        return Err(BlockMapError::CommError {
            neighbor: me,
            message: format!("expected {size} outgoing buffers, got {}", sends.len()),
        });
    }
    let mut received = vec![Vec::new(); size];
    received[me] = sends[me].clone();
    let peers: Vec<usize> = (0..size).filter(|&p| p != me).collect();
    if peers.is_empty() {
        return Ok(received);
    }
    let counts = peers
        .iter()
        .map(|&nbr| WireCount::try_new(sends[nbr].len(), nbr))
        .collect::<Result<Vec<_>, _>>()?;

    // 1) sizes
    let mut recv_size = Vec::with_capacity(peers.len());
    for &nbr in &peers {
        let mut cnt: WireCount = bytemuck::Zeroable::zeroed();
        let h = comm.irecv(
            nbr,
            tags.sizes.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        recv_size.push((nbr, h));
    }
    let mut pending_sends = Vec::with_capacity(peers.len());
    for (&nbr, count) in peers.iter().zip(&counts) {
        pending_sends.push(comm.isend(
            nbr,
            tags.sizes.as_u16(),
            cast_slice(std::slice::from_ref(count)),
        ));
    }

    let mut expected = vec![0usize; size];
    let mut maybe_err = None;
    for (nbr, h) in recv_size {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                if maybe_err.is_none() {
                    let cnt: WireCount = bytemuck::pod_read_unaligned(&data);
                    expected[nbr] = cnt.get();
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(BlockMapError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: std::mem::size_of::<WireCount>(),
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(BlockMapError::CommError {
                    neighbor: nbr,
                    message: "no size header received".into(),
                });
            }
            _ => {} // already have an error; just drain
        }
    }
    for send in pending_sends.drain(..) {
        let _ = send.wait();
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    // 2) payloads
    let mut recv_data = Vec::with_capacity(peers.len());
    for &nbr in &peers {
        let mut buffer = vec![0u8; expected[nbr]];
        let h = comm.irecv(nbr, tags.data.as_u16(), &mut buffer);
        recv_data.push((nbr, h));
    }
    for &nbr in &peers {
        pending_sends.push(comm.isend(nbr, tags.data.as_u16(), &sends[nbr]));
    }

    for (nbr, h) in recv_data {
        match h.wait() {
            Some(data) if data.len() == expected[nbr] => {
                if maybe_err.is_none() {
                    received[nbr] = data;
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(BlockMapError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: expected[nbr],
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() && expected[nbr] > 0 => {
                maybe_err = Some(BlockMapError::CommError {
                    neighbor: nbr,
                    message: "no payload received".into(),
                });
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }
    log::trace!(
        "rank {me}: exchanged {} bytes out, {} bytes in",
        sends.iter().map(Vec::len).sum::<usize>(),
        received.iter().map(Vec::len).sum::<usize>()
    );

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}

/// Compile-time no-op comm for pure serial use: one rank, nothing distributed.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
    fn distributes(&self) -> bool {
        false
    }
}

// --- ThreadComm: in-process ranks on separate threads ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// Message store shared by the ranks of one in-process world.
/// Messages between a `(src, dst, tag)` triple are delivered in FIFO order.
#[derive(Default)]
struct Mailbox {
    slots: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, msg: Bytes) {
        self.slots.lock().entry(key).or_default().push_back(msg);
        self.arrived.notify_all();
    }

    fn take(&self, key: &Key, deadline: Instant) -> Option<Bytes> {
        let mut slots = self.slots.lock();
        loop {
            if let Some(queue) = slots.get_mut(key) {
                if let Some(msg) = queue.pop_front() {
                    if queue.is_empty() {
                        slots.remove(key);
                    }
                    return Some(msg);
                }
            }
            if self.arrived.wait_until(&mut slots, deadline).timed_out() {
                return slots.get_mut(key).and_then(VecDeque::pop_front);
            }
        }
    }
}

static MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(Mailbox::default()));

/// Receive handle of [`ThreadComm`]; `wait` blocks until the message arrives
/// or the communicator's timeout expires.
pub struct ThreadRecvHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    max_len: usize,
    timeout: Duration,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        match self.mailbox.take(&self.key, deadline) {
            Some(msg) => {
                let n = msg.len().min(self.max_len);
                Some(msg[..n].to_vec())
            }
            None => {
                let (src, dst, tag) = self.key;
                log::warn!(
                    "rank {dst}: receive from rank {src} (tag {tag:#06x}) timed out after {:?}",
                    self.timeout
                );
                None
            }
        }
    }
}

/// Ranks simulated by threads of one process.
///
/// [`ThreadComm::new`] attaches to a process-global mailbox (tests sharing it must
/// not run concurrently); [`ThreadComm::world`] creates an isolated set of ranks.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Duration,
}

impl ThreadComm {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: MAILBOX.clone(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// All ranks of a fresh world of `size` ranks with a private mailbox.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: mailbox.clone(),
                timeout: Self::DEFAULT_TIMEOUT,
            })
            .collect()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecvHandle;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        ThreadRecvHandle {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag),
            max_len: buf.len(),
            timeout: self.timeout,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Source};
    use mpi::Count;
    use std::rc::Rc;

    /// MPI world communicator. Collectives map onto native MPI calls;
    /// point-to-point sends use standard (possibly blocking) mode.
    pub struct MpiComm {
        world: Rc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, BlockMapError> {
            let universe = mpi::initialize().ok_or_else(|| BlockMapError::CommError {
                neighbor: 0,
                message: "MPI already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world: Rc::new(world),
                rank,
                size,
                _universe: universe,
            })
        }
    }

    pub struct MpiRecvHandle {
        world: Rc<SimpleCommunicator>,
        peer: usize,
        tag: u16,
        max_len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(self.tag as i32);
            data.truncate(self.max_len);
            Some(data)
        }
    }

    fn count_of(len: usize, neighbor: usize) -> Result<Count, BlockMapError> {
        Count::try_from(len).map_err(|_| BlockMapError::BufferSizeMismatch {
            neighbor,
            expected: Count::MAX as usize,
            got: len,
        })
    }

    fn displacements(counts: &[Count]) -> Vec<Count> {
        counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect()
    }

    fn split(buf: &[u8], counts: &[Count]) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(counts.len());
        let mut start = 0usize;
        for &c in counts {
            let end = start + c as usize;
            out.push(buf[start..end].to_vec());
            start = end;
        }
        out
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: self.world.clone(),
                peer,
                tag,
                max_len: buf.len(),
            }
        }

        fn alltoallv(
            &self,
            _tags: CollectiveTags,
            sends: &[Vec<u8>],
        ) -> Result<Vec<Vec<u8>>, BlockMapError> {
            if sends.len() != self.size {
                return Err(BlockMapError::CommError {
                    neighbor: self.rank,
                    message: format!("expected {} outgoing buffers, got {}", self.size, sends.len()),
                });
            }
            let send_counts = sends
                .iter()
                .enumerate()
                .map(|(nbr, b)| count_of(b.len(), nbr))
                .collect::<Result<Vec<_>, _>>()?;
            let mut recv_counts = vec![0 as Count; self.size];
            self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

            let send_buf: Vec<u8> = sends.concat();
            let send_displs = displacements(&send_counts);
            let recv_displs = displacements(&recv_counts);
            let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
            let mut recv_buf = vec![0u8; total];
            {
                let send_part = Partition::new(&send_buf[..], &send_counts[..], &send_displs[..]);
                let mut recv_part =
                    PartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs[..]);
                self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
            }
            Ok(split(&recv_buf, &recv_counts))
        }

        fn allgather(
            &self,
            _tags: CollectiveTags,
            send: &[u8],
        ) -> Result<Vec<Vec<u8>>, BlockMapError> {
            let mine = count_of(send.len(), self.rank)?;
            let mut counts = vec![0 as Count; self.size];
            self.world.all_gather_into(&mine, &mut counts[..]);
            let displs = displacements(&counts);
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            let mut recv_buf = vec![0u8; total];
            {
                let mut recv_part = PartitionMut::new(&mut recv_buf[..], &counts[..], &displs[..]);
                self.world.all_gather_varcount_into(send, &mut recv_part);
            }
            Ok(split(&recv_buf, &counts))
        }

        fn barrier(&self, _tags: CollectiveTags) -> Result<(), BlockMapError> {
            self.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
