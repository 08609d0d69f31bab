use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};

use calshare::access::Permission;
use calshare::auth;
use calshare::mail::InviteMailer;
use calshare::storage::{self, schema, Config};

pub const USAGE: &str = "Usage: calshare [--conf PATH] --init \
| --add-user NAME EMAIL PASSWORD | --grant USER COLLECTION PERM | --test-mail RCPT";

pub enum CliMode {
    Init,
    AddUser {
        username: String,
        email: String,
        password: String,
    },
    Grant {
        username: String,
        collection: String,
        permission: Permission,
    },
    TestMail {
        recipient: String,
    },
}

pub struct CliArgs {
    pub mode: CliMode,
    pub config: Option<PathBuf>,
}

pub fn parse_cli_args() -> Result<CliArgs, String> {
    let mut args = env::args().skip(1);
    let mut config = None;
    let mut mode = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--conf" => {
                let path = args.next().ok_or("--conf requires a path")?;
                config = Some(PathBuf::from(path));
            }
            "--init" => {
                mode = Some(CliMode::Init);
            }
            "--add-user" => {
                let (username, email, password) = three(&mut args, "--add-user")?;
                mode = Some(CliMode::AddUser { username, email, password });
            }
            "--grant" => {
                let (username, collection, permission) = three(&mut args, "--grant")?;
                let permission = permission
                    .parse::<Permission>()
                    .map_err(|e| e.to_string())?;
                mode = Some(CliMode::Grant { username, collection, permission });
            }
            "--test-mail" => {
                let recipient = args.next().ok_or("--test-mail requires a recipient")?;
                mode = Some(CliMode::TestMail { recipient });
            }
            "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ => return Err(format!("Unknown argument: {}", arg)),
        }
    }

    match mode {
        Some(mode) => Ok(CliArgs { mode, config }),
        None => Err("no mode given".to_string()),
    }
}

fn three(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<(String, String, String), String> {
    match (args.next(), args.next(), args.next()) {
        (Some(a), Some(b), Some(c)) => Ok((a, b, c)),
        _ => Err(format!("{flag} requires three arguments")),
    }
}

fn load_config(args: &CliArgs) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display())),
        None => Config::load_or_create().context("loading default config"),
    }
}

pub fn run(args: CliArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if let CliMode::TestMail { recipient } = args.mode {
        let mailer = InviteMailer::new(config.smtp);
        mailer.send(
            &recipient,
            &recipient,
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR",
            "calshare test invite",
        )?;
        println!("test invite sent to {recipient}");
        return Ok(());
    }

    if let Some(parent) = config.db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = storage::open(&config.db)?;
    schema::initialize(&conn)?;
    let guard = conn
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    match args.mode {
        CliMode::Init => {
            println!("database initialized at {}", config.db.display());
        }
        CliMode::AddUser { username, email, password } => {
            guard.execute(
                "INSERT INTO users (username, password, email) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, auth::hash_password(&password), email],
            )?;
            println!("user {username} created");
        }
        CliMode::Grant { username, collection, permission } => {
            guard.execute(
                "INSERT OR IGNORE INTO collection (name) VALUES (?1)",
                [&collection],
            )?;
            let granted = guard.execute(
                "INSERT INTO collection_role (user_id, collection_id, permission)
                 SELECT users.id, collection.id, ?3 FROM users, collection
                 WHERE users.username = ?1 AND collection.name = ?2",
                rusqlite::params![username, collection, permission.as_str()],
            )?;
            if granted == 0 {
                bail!("no such user: {username}");
            }
            println!("granted {permission} on {collection} to {username}");
        }
        CliMode::TestMail { .. } => unreachable!("handled above"),
    }

    Ok(())
}
