pub mod facade;
pub mod pool;

pub use facade::{BindValue, DatabaseFacade, DbError, QueryHook};
pub use pool::{build_pg_pool, mask_connection_string};
