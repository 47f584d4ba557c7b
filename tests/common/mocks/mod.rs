mod remote;

pub use remote::InMemoryRemote;
