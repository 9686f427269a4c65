use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::entity::{DEFAULT_ROLE, ROLES};
use crate::error::{Result, TechNotesError};
use crate::http;
use crate::logging;
use crate::service::{BcryptHasher, ErrorKind, NewUser, ServiceError, Services};
use crate::storage::{open_store, Backend, LoroStore, SqliteStore, DATA_DIR};

/// Find the project root by walking up to a `.technotes/` or `.git/` directory
fn find_project_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(DATA_DIR).exists() || current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

fn parse_backend(backend: Option<String>) -> Result<Option<Backend>> {
    backend.map(|b| b.parse()).transpose()
}

/// Load config for the current project, with the CLI backend taking precedence
fn load_project(backend: Option<String>) -> Result<(PathBuf, Config)> {
    let root = find_project_root();
    if !root.join(DATA_DIR).exists() {
        return Err(TechNotesError::NotInitialized);
    }

    let mut config = Config::load(&root)?;
    if let Some(backend) = parse_backend(backend)? {
        config.backend = backend;
    }
    Ok((root, config))
}

async fn open_services(root: &Path, config: &Config) -> Result<Services> {
    let store = open_store(root, config.backend)?;
    let hasher = Arc::new(BcryptHasher::new(config.bcrypt_cost)?);
    Ok(Services::new(store, hasher).await?)
}

/// Not-found from a list operation means "nothing to show", not a failure
fn empty_listing<T>(result: std::result::Result<Vec<T>, ServiceError>) -> Result<Vec<T>> {
    match result {
        Ok(items) => Ok(items),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}

pub async fn handle_init(backend: Option<String>) -> Result<()> {
    let root = env::current_dir()?;
    let data_dir = root.join(DATA_DIR);
    if data_dir.exists() {
        return Err(TechNotesError::AlreadyInitialized);
    }

    let mut config = Config::default();
    if let Some(backend) = parse_backend(backend)? {
        config.backend = backend;
    }

    fs::create_dir_all(&data_dir)?;
    match config.backend {
        Backend::Loro => {
            LoroStore::init(&data_dir)?;
        }
        Backend::Sqlite => {
            SqliteStore::open(&data_dir)?;
        }
    }
    config.save(&root)?;

    println!("Initialized technotes project in {}", root.display());
    println!("  backend: {}", config.backend);
    println!("  config:  {}", Config::path(&root).display());

    Ok(())
}

pub async fn handle_serve(backend: Option<String>, port: Option<u16>) -> Result<()> {
    let (root, mut config) = load_project(backend)?;
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;

    let log_dir = config.log_dir.as_ref().map(|dir| root.join(dir));
    if let Some(ref dir) = log_dir {
        fs::create_dir_all(dir)?;
    }
    let _guard = logging::init(log_dir.as_deref());

    let services = open_services(&root, &config).await?;
    http::serve(services, &config).await
}

pub async fn handle_user_add(
    backend: Option<String>,
    username: String,
    password: String,
    roles: Vec<String>,
) -> Result<()> {
    let (root, config) = load_project(backend)?;
    let services = open_services(&root, &config).await?;

    let roles = if roles.is_empty() {
        vec![DEFAULT_ROLE.to_string()]
    } else {
        roles
    };
    for role in roles.iter().filter(|r| !ROLES.contains(&r.as_str())) {
        eprintln!("Warning: '{}' is not one of {}", role, ROLES.join(", "));
    }

    let created = services
        .users
        .create_user(NewUser {
            username,
            password,
            roles,
        })
        .await?;

    println!("New user {} created ({})", created.username, created.id);
    Ok(())
}

pub async fn handle_user_list(backend: Option<String>, json: bool) -> Result<()> {
    let (root, config) = load_project(backend)?;
    let services = open_services(&root, &config).await?;

    let users = empty_listing(services.users.list_users().await)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
    } else if users.is_empty() {
        println!("No users found.");
    } else {
        println!("Users:\n");
        for u in users {
            let status = if u.active { "active" } else { "inactive" };
            println!(
                "  ({}) [{}] {} - {}",
                short_id(&u.id),
                status,
                u.username,
                u.roles.join(", ")
            );
        }
    }

    Ok(())
}

pub async fn handle_note_list(backend: Option<String>, json: bool) -> Result<()> {
    let (root, config) = load_project(backend)?;
    let services = open_services(&root, &config).await?;

    let notes = empty_listing(services.notes.list_notes().await)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
    } else if notes.is_empty() {
        println!("No notes found.");
    } else {
        println!("Notes:\n");
        for n in notes {
            let status = if n.note.completed { "done" } else { "open" };
            println!(
                "  {} ({}) [{}] {} - {}",
                n.note.ticket,
                short_id(&n.note.id),
                status,
                n.note.title,
                n.username
            );
        }
    }

    Ok(())
}
