pub mod batch_size;
pub mod writer;
