pub mod fjall;
pub mod keys;
pub mod mem;
pub mod traits;

pub use self::fjall::{FjallKv, FjallKvFactory, FjallStore, FjallWal};
pub use mem::{MemKv, MemKvFactory, MemWal};
pub use traits::{KvFactory, KvStore, Wal};
