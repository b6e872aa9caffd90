pub mod abi;
pub mod heap;
pub mod mmap;
pub mod object;
pub mod peer;
mod region;
pub mod session;

pub use abi::{ConfigSnapshot, CounterSnapshot, ExitKind, UserExitInfo, REGION_SIZE};
pub use heap::HeapObject;
pub use mmap::MmapObject;
pub use object::SchedObject;
pub use peer::KernelPeer;
pub use session::{session_active, Session};
pub use usersched_core::SchedError;
