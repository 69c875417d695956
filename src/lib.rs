pub mod datum;
pub mod executor;
pub mod source;
pub mod tuple;
