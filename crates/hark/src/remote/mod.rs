//! Remote memory service backends

pub mod supabase;

pub use supabase::SupabaseClient;
