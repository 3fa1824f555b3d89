//! Creates or resets a privileged account from the environment.
//!
//! ```text
//! ADMIN_EMAIL=root@clinic.local ADMIN_PASSWORD=... cargo run --bin create-admin
//! ```

use clinicdesk::auth::password::PasswordHasher;
use clinicdesk::db::{self, models::Role, users};
use clinicdesk::Config;
use dotenvy::dotenv;
use envconfig::Envconfig;

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Envconfig)]
struct AdminConfig {
    #[envconfig(from = "ADMIN_NAME", default = "Administrator")]
    name: String,

    #[envconfig(from = "ADMIN_EMAIL")]
    email: String,

    #[envconfig(from = "ADMIN_PASSWORD")]
    password: String,

    #[envconfig(from = "ADMIN_ROLE", default = "admin")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    dotenv().ok();

    let config = Config::init_from_env()?;
    let admin = AdminConfig::init_from_env()?;
    let role: Role = admin.role.parse()?;

    let pool = db::init_db(&config.database_url).await?;
    let hash = PasswordHasher::new(config.password_iterations).hash(&admin.password);
    let account = users::NewUser {
        name: &admin.name,
        email: &admin.email,
        password_hash: &hash,
        role,
    };

    let user = match users::find_by_email(&pool, &admin.email).await? {
        Some(existing) => {
            log::info!("Updating existing account {} ({})", existing.id, existing.email);
            users::overwrite(&pool, existing.id, account).await?
        }
        None => users::create(&pool, account).await?,
    };
    log::info!("{} account ready: {} <{}>", user.role, user.name, user.email);

    pool.close().await;
    Ok(())
}
