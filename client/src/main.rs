// Interactive OMNIFS client
// Shell-style front end over the JSON protocol: login, navigate, read and
// write files, administer users.

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};

mod connection;

use connection::Connection;

#[derive(Parser)]
#[command(name = "omnifs-client")]
#[command(about = "Interactive client for an OMNIFS server", long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let mut connection = Connection::new(cli.host, cli.port);

    println!("OMNIFS interactive client — type 'help' for commands");
    let stdin = io::stdin();
    loop {
        print_prompt(&connection);
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("input error: {}", e);
                break;
            }
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            continue;
        };
        match command {
            "exit" | "quit" => break,
            "help" => print_help(),
            _ => run_command(&mut connection, command, args),
        }
    }
    println!("Bye.");
}

fn print_prompt(connection: &Connection) {
    let who = connection.username.as_deref().unwrap_or("guest");
    print!("{}@omnifs> ", who);
    let _ = io::stdout().flush();
}

fn print_help() {
    println!("Commands:");
    println!("  login <user> <password>       authenticate");
    println!("  logout                        end the session");
    println!("  whoami                        show session details");
    println!("  ls <path>                     list a directory");
    println!("  mkdir <path>                  create a directory");
    println!("  rmdir <path>                  delete an empty directory");
    println!("  create <path> <text...>       create a file");
    println!("  cat <path>                    print a file");
    println!("  edit <path> <index> <text...> overwrite bytes in place");
    println!("  rm <path>                     delete a file");
    println!("  mv <old> <new>                rename a file");
    println!("  truncate <path>               empty a file");
    println!("  stat <path>                   show metadata");
    println!("  chmod <path> <octal>          set permissions");
    println!("  stats                         file system statistics");
    println!("  users                         list users (admin)");
    println!("  useradd <name> <pw> <role>    create a user (admin)");
    println!("  userdel <name>                delete a user (admin)");
    println!("  errmsg <code>                 look up an error message");
    println!("  exit                          quit");
}

fn run_command(connection: &mut Connection, command: &str, args: &[&str]) {
    let outcome = match (command, args) {
        ("login", [user, password]) => {
            match connection.send("user_login", json!({"username": user, "password": password})) {
                Ok(reply) if reply.is_success() => {
                    connection.session_id = reply.data["session_id"].as_str().map(String::from);
                    connection.username = Some(user.to_string());
                    Ok(format!("logged in as {}", user))
                }
                Ok(reply) => Err(reply.error_text()),
                Err(e) => Err(e),
            }
        }
        ("logout", []) => {
            let result = simple(connection, "user_logout", json!({}), "logged out");
            if result.is_ok() {
                connection.session_id = None;
                connection.username = None;
            }
            result
        }
        ("whoami", []) => connection
            .send("get_session_info", json!({}))
            .and_then(reply_or_error)
            .map(|data| {
                format!(
                    "{} (role {}, user id {})",
                    data["username"].as_str().unwrap_or("?"),
                    data["role"].as_str().unwrap_or("?"),
                    data["user_id"]
                )
            }),
        ("ls", [path]) => connection
            .send("dir_list", json!({"path": path}))
            .and_then(reply_or_error)
            .map(|data| {
                let mut lines = Vec::new();
                if let Some(entries) = data["entries"].as_array() {
                    for entry in entries {
                        let marker = if entry["is_directory"].as_bool().unwrap_or(false) {
                            "d"
                        } else {
                            "-"
                        };
                        lines.push(format!(
                            "{} {:>8}  {}",
                            marker,
                            entry["size"],
                            entry["name"].as_str().unwrap_or("?")
                        ));
                    }
                }
                if lines.is_empty() {
                    "(empty)".to_string()
                } else {
                    lines.join("\n")
                }
            }),
        ("mkdir", [path]) => simple(connection, "dir_create", json!({"path": path}), "created"),
        ("rmdir", [path]) => simple(connection, "dir_delete", json!({"path": path}), "removed"),
        ("create", [path, text @ ..]) if !text.is_empty() => simple(
            connection,
            "file_create",
            json!({"path": path, "data": text.join(" ")}),
            "created",
        ),
        ("cat", [path]) => connection
            .send("file_read", json!({"path": path}))
            .and_then(reply_or_error)
            .map(|data| data["content"].as_str().unwrap_or("").to_string()),
        ("edit", [path, index, text @ ..]) if !text.is_empty() => match index.parse::<u64>() {
            Ok(index) => simple(
                connection,
                "file_edit",
                json!({"path": path, "data": text.join(" "), "index": index}),
                "edited",
            ),
            Err(_) => Err("index must be a number".to_string()),
        },
        ("rm", [path]) => simple(connection, "file_delete", json!({"path": path}), "deleted"),
        ("mv", [old, new]) => simple(
            connection,
            "file_rename",
            json!({"old_path": old, "new_path": new}),
            "renamed",
        ),
        ("truncate", [path]) => {
            simple(connection, "file_truncate", json!({"path": path}), "truncated")
        }
        ("stat", [path]) => connection
            .send("get_metadata", json!({"path": path}))
            .and_then(reply_or_error)
            .map(|data| {
                format!(
                    "{}  {}  {} bytes  mode {:o}  owner {}",
                    data["name"].as_str().unwrap_or("?"),
                    if data["is_directory"].as_bool().unwrap_or(false) {
                        "directory"
                    } else {
                        "file"
                    },
                    data["size"],
                    data["permissions"].as_u64().unwrap_or(0),
                    data["owner_id"]
                )
            }),
        ("chmod", [path, mode]) => match u32::from_str_radix(mode, 8) {
            Ok(permissions) => simple(
                connection,
                "set_permissions",
                json!({"path": path, "permissions": permissions}),
                "permissions set",
            ),
            Err(_) => Err("mode must be octal, e.g. 644".to_string()),
        },
        ("stats", []) => connection
            .send("get_stats", json!({}))
            .and_then(reply_or_error)
            .map(|data| {
                format!(
                    "total {}  used {}  free {}  files {}  directories {}",
                    data["total_size"],
                    data["used_space"],
                    data["free_space"],
                    data["file_count"],
                    data["directory_count"]
                )
            }),
        ("users", []) => connection
            .send("user_list", json!({}))
            .and_then(reply_or_error)
            .map(|data| {
                data["users"]
                    .as_array()
                    .map(|users| {
                        users
                            .iter()
                            .filter_map(|u| u.as_str())
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default()
            }),
        ("useradd", [name, password, role]) => simple(
            connection,
            "user_create",
            json!({"username": name, "password": password, "role": role}),
            "user created",
        ),
        ("userdel", [name]) => simple(
            connection,
            "user_delete",
            json!({"username": name}),
            "user deleted",
        ),
        ("errmsg", [code]) => match code.parse::<i32>() {
            Ok(code) => connection
                .send("get_error_message", json!({"error_code": code}))
                .and_then(reply_or_error)
                .map(|data| data["message"].as_str().unwrap_or("?").to_string()),
            Err(_) => Err("code must be an integer".to_string()),
        },
        _ => Err(format!("unknown command or bad arguments: '{}' (try 'help')", command)),
    };

    match outcome {
        Ok(message) => println!("{}", message),
        Err(message) => println!("error: {}", message),
    }
}

/// Send a request whose reply carries no interesting data.
fn simple(
    connection: &Connection,
    operation: &str,
    parameters: serde_json::Value,
    success: &str,
) -> Result<String, String> {
    connection
        .send(operation, parameters)
        .and_then(reply_or_error)
        .map(|_| success.to_string())
}

fn reply_or_error(reply: connection::Reply) -> Result<serde_json::Value, String> {
    if reply.is_success() {
        Ok(reply.data)
    } else {
        Err(reply.error_text())
    }
}
