pub mod directory;
pub mod job;
pub mod order;
pub mod quota;
