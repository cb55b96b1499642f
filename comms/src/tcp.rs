use std::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    num::NonZeroUsize,
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{CommErr, ProcessGroup, Result, World, frame};

/// How a joining worker retries its connection to rank 0 while the latter is
/// still starting up.
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub attempts: NonZeroUsize,
    pub backoff: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            backoff: Duration::from_millis(200),
        }
    }
}

enum Role {
    /// Rank 0, connected to every other worker, ordered by rank.
    Hub { peers: Vec<TcpStream>, scratch: Vec<f32> },
    /// Any other rank, connected to rank 0 only.
    Spoke { hub: TcpStream },
}

/// A process group whose workers are separate OS processes talking over TCP.
///
/// Rank 0 acts as the hub of a star: it receives every contribution, reduces
/// them in rank order and sends the result back, so every worker observes the
/// exact same sum.
pub struct TcpGroup {
    world: World,
    role: Role,
}

impl TcpGroup {
    /// Initializes the group for this worker: rank 0 listens on `addr`, every
    /// other rank connects to it.
    ///
    /// # Arguments
    /// * `world` - This worker's identity.
    /// * `addr` - The address of rank 0.
    /// * `policy` - The connection retry policy for ranks other than 0.
    pub fn init<A: ToSocketAddrs>(world: World, addr: A, policy: ConnectPolicy) -> Result<Self> {
        if world.rank() == 0 {
            let listener = TcpListener::bind(addr)?;
            info!("rank 0 listening at {}", listener.local_addr()?);
            Self::host(listener, world.size())
        } else {
            Self::join(addr, world, policy)
        }
    }

    /// Accepts the other `size - 1` workers of the group as rank 0.
    ///
    /// # Arguments
    /// * `listener` - A bound listener.
    /// * `size` - The world size.
    ///
    /// # Returns
    /// An error if a worker announces a different world size, an out of range
    /// rank or a rank that has already joined.
    pub fn host(listener: TcpListener, size: usize) -> Result<Self> {
        let size = NonZeroUsize::new(size).ok_or(CommErr::RankOutOfRange { rank: 0, size })?;
        let world = World::new(0, size)?;

        let mut slots: Vec<Option<TcpStream>> = (1..size.get()).map(|_| None).collect();
        for _ in 1..size.get() {
            let (mut stream, addr) = listener.accept()?;
            stream.set_nodelay(true)?;

            let (rank, announced) = frame::recv_hello(&mut stream)?;
            if announced != size.get() {
                return Err(CommErr::WorldMismatch {
                    rank,
                    got: announced,
                    expected: size.get(),
                });
            }

            let slot = rank
                .checked_sub(1)
                .and_then(|i| slots.get_mut(i))
                .ok_or(CommErr::RankOutOfRange {
                    rank,
                    size: size.get(),
                })?;

            if slot.replace(stream).is_some() {
                return Err(CommErr::DuplicateRank(rank));
            }

            info!(rank = rank; "worker joined from {addr}");
        }

        let peers = slots.into_iter().flatten().collect();
        Ok(Self {
            world,
            role: Role::Hub {
                peers,
                scratch: Vec::new(),
            },
        })
    }

    /// Connects to rank 0 as `world.rank()`.
    ///
    /// # Arguments
    /// * `addr` - The address of rank 0.
    /// * `world` - This worker's identity, its rank must not be 0.
    /// * `policy` - The connection retry policy.
    pub fn join<A: ToSocketAddrs>(addr: A, world: World, policy: ConnectPolicy) -> Result<Self> {
        if world.rank() == 0 {
            return Err(CommErr::DuplicateRank(0));
        }

        let mut attempt = 1;
        let mut hub = loop {
            match TcpStream::connect(&addr) {
                Ok(stream) => break stream,
                Err(e) if attempt < policy.attempts.get() => {
                    debug!(rank = world.rank(), attempt = attempt; "rank 0 unreachable: {e}");
                    attempt += 1;
                    thread::sleep(policy.backoff);
                }
                Err(e) => {
                    warn!(rank = world.rank(); "giving up on rank 0 after {attempt} attempts");
                    return Err(e.into());
                }
            }
        };

        hub.set_nodelay(true)?;
        frame::send_hello(&mut hub, world.rank(), world.size())?;
        info!(rank = world.rank(); "joined the group");

        Ok(Self {
            world,
            role: Role::Spoke { hub },
        })
    }
}

impl ProcessGroup for TcpGroup {
    fn world(&self) -> World {
        self.world
    }

    fn all_reduce_sum(&mut self, buf: &mut [f32]) -> Result<()> {
        match &mut self.role {
            Role::Hub { peers, scratch } => {
                scratch.resize(buf.len(), 0.0);

                for peer in peers.iter_mut() {
                    frame::recv_data_into(peer, scratch)?;
                    buf.iter_mut().zip(scratch.iter()).for_each(|(a, b)| *a += b);
                }

                for peer in peers.iter_mut() {
                    frame::send_data(peer, buf)?;
                }
            }
            Role::Spoke { hub } => {
                frame::send_data(hub, buf)?;
                frame::recv_data_into(hub, buf)?;
            }
        }

        Ok(())
    }

    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()> {
        let size = self.world.size();
        if root >= size {
            return Err(CommErr::RankOutOfRange { rank: root, size });
        }

        let rank = self.world.rank();
        match &mut self.role {
            Role::Hub { peers, .. } => {
                if root != 0 {
                    frame::recv_data_into(&mut peers[root - 1], buf)?;
                }

                for (i, peer) in peers.iter_mut().enumerate() {
                    if i + 1 != root {
                        frame::send_data(peer, buf)?;
                    }
                }
            }
            Role::Spoke { hub } if rank == root => frame::send_data(hub, buf)?,
            Role::Spoke { hub } => frame::recv_data_into(hub, buf)?,
        }

        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        self.all_reduce_sum(&mut [])
    }

    fn destroy(self) -> Result<()> {
        match self.role {
            Role::Hub { mut peers, .. } => {
                for peer in peers.iter_mut() {
                    frame::recv_bye(peer)?;
                }

                for peer in peers.iter_mut() {
                    frame::send_bye(peer)?;
                }
            }
            Role::Spoke { mut hub } => {
                frame::send_bye(&mut hub)?;
                frame::recv_bye(&mut hub)?;
            }
        }

        info!(rank = self.world.rank(); "left the group");
        Ok(())
    }
}
