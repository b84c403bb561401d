use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// `DATABASE_URL` wins when set; `fallback_url` is the one assembled from the
/// individual `DB_*` settings.
pub fn create_conn(fallback_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| fallback_url.to_string());
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}
