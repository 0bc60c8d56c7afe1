//! ent tutorial
//!
//! Walks through the lifecycle of an entity against the in-memory backend,
//! or against a Redis server with `--redis <host:port>`.

use std::sync::Arc;

use clap::Parser;
use ent_core::{json_encode, Ent, EntError, LookupFlags, StorageRef};
use ent_storage::{MemoryStorage, RedisConfig, RedisStorage};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod user;

use user::{find_user_by_email, load_users_by_team, User};

/// ent tutorial
#[derive(Parser)]
#[command(name = "ent-tutorial")]
#[command(about = "Create, index, update and delete entities", long_about = None)]
struct Cli {
    /// Redis server address; uses in-memory storage when omitted
    #[arg(long, value_name = "ADDR")]
    redis: Option<String>,

    /// Key of the Redis hash holding id counters
    #[arg(long, default_value = "entid", requires = "redis")]
    id_key: String,

    /// Print entities as JSON instead of their debug form
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage: StorageRef = match &cli.redis {
        Some(address) => {
            info!(address = %address, "connecting to redis");
            let config = RedisConfig::new(address.clone()).with_id_key(cli.id_key.clone());
            Arc::new(RedisStorage::connect(config)?)
        }
        None => Arc::new(MemoryStorage::new()),
    };

    run(&storage, cli.json)
}

fn show(title: &str, u: &User, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        let raw = json_encode(u)?;
        let value: serde_json::Value = serde_json::from_slice(&raw)?;
        println!("{title}: {}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{title}: {u}");
    }
    Ok(())
}

fn run(storage: &StorageRef, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // 1. create
    let mut ann = User::new("Ann", "ann@example.com", 1);
    ann.create(storage)?;
    let mut bob = User::new("Bob", "bob@example.com", 1);
    bob.create(storage)?;
    let mut cat = User::new("Cat", "cat@example.com", 2);
    cat.create(storage)?;
    show("created", &ann, as_json)?;

    // 2. lookup through the unique index
    let id = find_user_by_email(&**storage, "bob@example.com")?;
    println!("bob@example.com -> id {id}");

    // 3. update
    ann.set_score(9.5);
    ann.set_team(2);
    ann.save()?;
    show("saved", &ann, as_json)?;

    // 4. a second copy goes stale once the first one is saved
    let mut stale = User::default();
    ent_core::load_ent_by_id(&mut stale, storage, bob.id())?;
    bob.set_score(3.0);
    bob.save()?;
    stale.set_score(4.0);
    match stale.save() {
        Err(err @ EntError::VersionConflict { .. }) => {
            println!("stale save rejected: {err}");
            stale.reload()?;
            println!("reloaded at version {}", stale.version());
        }
        other => other?,
    }

    // 5. unique indexes reject duplicates
    cat.set_email("ann@example.com");
    match cat.save() {
        Err(err) if err.is_unique_conflict() => println!("duplicate email rejected: {err}"),
        other => other?,
    }
    cat.set_email("cat@example.org");
    cat.save()?;

    // 6. non-unique index, newest first
    for u in load_users_by_team(storage, 2, 0, LookupFlags::REVERSE)? {
        println!("team 2: {} <{}>", u.name, u.email);
    }

    // 7. iterate everything
    for u in ent_core::iterate_ents::<User>(storage) {
        let u = u?;
        println!("user {}: {} (v{})", u.id(), u.name, u.version());
    }

    // 8. delete
    bob.delete()?;
    match find_user_by_email(&**storage, "bob@example.com") {
        Err(EntError::NotFound) => println!("bob@example.com is gone"),
        other => {
            other?;
        }
    }

    info!("tutorial finished");
    Ok(())
}
