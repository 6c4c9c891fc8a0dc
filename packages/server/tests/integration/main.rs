mod common;

mod orphan;
mod registry;
mod sync;
