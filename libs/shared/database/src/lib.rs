pub mod memory;
pub mod store;
pub mod supabase;

pub use memory::MemoryStore;
pub use store::{Cursor, Direction, Document, DocumentStore, Filter, OrderBy, Query};
pub use supabase::SupabaseClient;
