//! Engine, batch and scope tests driven through the in-memory API

mod test_batch;
mod test_scope;
