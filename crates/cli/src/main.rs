//! `dlock` CLI — a thin demonstration front end over `dlock-redis`.
//!
//! Each invocation is a fresh process, so there is no in-memory handle to
//! hand between an `acquire` and a later `release`/`extend`: `acquire`
//! prints the identifier it generated, and callers pass it back with `--id`
//! to resume ownership (the same explicit-id path `Lock::builder` exposes
//! for any long-lived caller that outlives a single connection).

use std::time::Duration;

use clap::{Parser, Subcommand};
use dlock_api::LockHandle;
use dlock_redis::{Lock, LockId, RedisConfig};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "dlock", version, about)]
struct Cli {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379", global = true)]
    redis_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Acquire a lock, printing the identifier that now owns it.
    Acquire {
        name: String,
        /// Seconds until the lock key expires on its own.
        #[arg(long)]
        expire: Option<u64>,
        /// Seconds to wait for the lock before giving up.
        #[arg(long)]
        timeout: Option<u64>,
        /// Fail immediately instead of waiting for the current holder.
        #[arg(long)]
        no_wait: bool,
    },
    /// Release a lock previously acquired with the given identifier.
    Release { name: String, id: String },
    /// Refresh a lock's TTL.
    Extend {
        name: String,
        id: String,
        /// New TTL in seconds; omit to reuse the original expiry.
        #[arg(long)]
        expire: Option<u64>,
    },
    /// Unconditionally clear one lock and wake its waiters.
    Reset { name: String },
    /// Unconditionally clear every lock in the keyspace.
    ResetAll,
    /// Report whether a lock is currently held, by anyone.
    Locked { name: String },
    /// Report the identifier currently holding a lock, if any.
    Owner { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pool = dlock_redis::connect(&RedisConfig::new(cli.redis_url))?;

    match cli.command {
        Command::Acquire {
            name,
            expire,
            timeout,
            no_wait,
        } => {
            let mut builder = Lock::builder(pool, &name);
            if let Some(expire) = expire {
                builder = builder.expire(Duration::from_secs(expire));
            }
            let mut lock = builder.build()?;

            let blocking = !no_wait;
            let timeout = timeout.map(Duration::from_secs);
            if lock.acquire(blocking, timeout).await? {
                // Dropping `lock` here only stops its (absent, for this
                // command) renewal task; the key itself stays held in
                // Redis until released or it expires on its own.
                println!("acquired {name} as {}", lock.id());
            } else {
                println!("failed to acquire {name}");
                std::process::exit(1);
            }
        }
        Command::Release { name, id } => {
            let mut lock = Lock::builder(pool, &name).id(LockId::from_text(id)).build()?;
            lock.release().await?;
            println!("released {name}");
        }
        Command::Extend { name, id, expire } => {
            let lock = Lock::builder(pool, &name).id(LockId::from_text(id)).build()?;
            lock.extend(expire.map(Duration::from_secs)).await?;
            println!("extended {name}");
        }
        Command::Reset { name } => {
            let lock = Lock::builder(pool, &name).build()?;
            lock.reset().await?;
            println!("reset {name}");
        }
        Command::ResetAll => {
            let count = dlock_redis::reset_all(&pool).await?;
            println!("cleared {count} lock(s)");
        }
        Command::Locked { name } => {
            let lock = Lock::builder(pool, &name).build()?;
            println!("{}", lock.locked().await?);
        }
        Command::Owner { name } => {
            let lock = Lock::builder(pool, &name).build()?;
            match lock.get_owner_id().await? {
                Some(owner) => println!("{owner}"),
                None => println!("(unlocked)"),
            }
        }
    }

    Ok(())
}
