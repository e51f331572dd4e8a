use std::env;
use std::process::ExitCode;

use chrono::Utc;

use reminder_module::service::admin;
use reminder_module::ProfileStore;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let (command, user_id) = match parse_args(&args) {
        Some(parsed) => parsed,
        None => {
            eprintln!("usage: reminder-admin <grant|revoke|status> <user-id>");
            return ExitCode::from(2);
        }
    };

    let profiles_db_path =
        env::var("PROFILES_DB_PATH").unwrap_or_else(|_| "data/profiles.db".to_string());
    let store = match ProfileStore::new(profiles_db_path) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open profile store: {err}");
            return ExitCode::FAILURE;
        }
    };

    let now = Utc::now();
    let result = match command {
        "grant" => admin::grant_premium(&store, user_id)
            .map(|_| format!("user {user_id} upgraded to premium")),
        "revoke" => admin::revoke_premium(&store, user_id, now)
            .map(|state| format!("premium revoked for user {user_id}; entitlement now {state:?}")),
        _ => admin::entitlement_status(&store, user_id, now),
    };

    match result {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Option<(&str, i64)> {
    if args.len() != 2 {
        return None;
    }
    let command = args[0].as_str();
    if !matches!(command, "grant" | "revoke" | "status") {
        return None;
    }
    let user_id = args[1].parse().ok()?;
    Some((command, user_id))
}
