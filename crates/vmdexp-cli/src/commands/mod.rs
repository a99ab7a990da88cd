pub mod compose;
pub mod launch;
