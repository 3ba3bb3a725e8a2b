pub mod owner_id;

pub use owner_id::OwnerId;
