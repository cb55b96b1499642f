mod error;
pub mod frame;
mod group;
mod local;
mod solo;
mod tcp;
mod world;

pub use error::{CommErr, Result};
pub use group::ProcessGroup;
pub use local::LocalGroup;
pub use solo::SoloGroup;
pub use tcp::{ConnectPolicy, TcpGroup};
pub use world::World;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

type KindType = u32;
const KIND_TYPE_SIZE: usize = size_of::<KindType>();
