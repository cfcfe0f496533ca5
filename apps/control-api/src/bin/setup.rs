use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use control_api::auth::credentials::{CredentialKeys, TokenIssuer};
use control_api::auth::login::{hash_password, load_accounts, OperatorAccount};
use control_api::config::Config;
use control_api::permissions::Role;
use warden_common::id::{prefix, prefixed_ulid};

fn prompt(label: &str, default: Option<&str>) -> String {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    let input = input.trim().to_string();
    if input.is_empty() {
        default.unwrap_or("").to_string()
    } else {
        input
    }
}

fn generate_seed() -> String {
    let bytes: Vec<u8> = (0..32).map(|_| rand::thread_rng().gen()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

fn read_env_file(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    map
}

fn write_env_file(path: &Path, updates: &HashMap<String, String>) {
    let mut lines: Vec<String> = Vec::new();
    let mut written_keys: HashSet<String> = HashSet::new();

    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            let trimmed = line.trim();
            if let Some((key, _)) = trimmed.split_once('=') {
                let key = key.trim();
                if let Some(value) = updates.get(key) {
                    lines.push(format!("{}={}", key, value));
                    written_keys.insert(key.to_string());
                    continue;
                }
            }
            lines.push(line.to_string());
        }
    }

    for (key, value) in updates {
        if !written_keys.contains(key) {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut content = lines.join("\n");
    if !content.ends_with('\n') {
        content.push('\n');
    }

    std::fs::write(path, content).expect("Failed to write .env file");
}

fn parse_role(raw: &str) -> Role {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap_or_else(|_| {
        eprintln!("Unknown role '{}'. Expected super_admin, admin, moderator or viewer.", raw);
        std::process::exit(1);
    })
}

fn main() {
    println!("=== Warden Control Setup ===\n");

    let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let env_path = env_path.as_path();
    let env_vars = read_env_file(env_path);

    // Step 1: signing seeds. Existing seeds are kept so issued credentials stay valid.
    let mut updates = HashMap::new();
    for key in ["ACCESS_KEY_SEED", "REFRESH_KEY_SEED"] {
        let seed = env_vars.get(key).cloned().unwrap_or_else(generate_seed);
        updates.insert(key.to_string(), seed);
    }

    let default_operators = env_vars
        .get("OPERATORS_FILE")
        .cloned()
        .unwrap_or_else(|| "operators.json".to_string());
    let operators_file = PathBuf::from(prompt("Operators file", Some(&default_operators)));
    updates.insert(
        "OPERATORS_FILE".to_string(),
        operators_file.display().to_string(),
    );

    // Step 2: the operator account.
    let email = prompt("Operator email", None);
    if email.is_empty() {
        eprintln!("An email is required.");
        std::process::exit(1);
    }
    let display_name = prompt("Display name", Some(""));
    let role = parse_role(&prompt("Role", Some("super_admin")));
    if !role.is_admin() {
        eprintln!("Operator accounts need an operator role.");
        std::process::exit(1);
    }

    print!("Password: ");
    io::stdout().flush().unwrap();
    let password = rpassword::read_password().expect("Failed to read password");
    if password.len() < 8 {
        eprintln!("Password must be at least 8 characters.");
        std::process::exit(1);
    }
    let password_hash = hash_password(&password).expect("Failed to hash password");

    let mut accounts = if operators_file.exists() {
        load_accounts(&operators_file).expect("Failed to read operators file")
    } else {
        Vec::new()
    };
    accounts.retain(|a| !a.email.eq_ignore_ascii_case(&email));
    let operator_id = prefixed_ulid(prefix::OPERATOR);
    accounts.push(OperatorAccount {
        id: operator_id.clone(),
        email: email.clone(),
        display_name: Some(display_name).filter(|s| !s.is_empty()),
        role,
        permissions: None,
        password_hash,
    });
    let json = serde_json::to_string_pretty(&accounts).expect("Failed to serialize operators");
    std::fs::write(&operators_file, json).expect("Failed to write operators file");

    write_env_file(env_path, &updates);

    // Step 3: optional end-user credential for running the ban listener locally.
    let user_id = prompt("Development user id for ban-listener (blank to skip)", Some(""));
    let user_credential = if user_id.is_empty() {
        None
    } else {
        let mut config = Config::for_development();
        config.access_key_seed = updates["ACCESS_KEY_SEED"].clone();
        config.refresh_key_seed = updates["REFRESH_KEY_SEED"].clone();
        if let Some(issuer) = env_vars.get("TOKEN_ISSUER") {
            config.token_issuer = issuer.clone();
        }
        if let Some(audience) = env_vars.get("TOKEN_AUDIENCE") {
            config.token_audience = audience.clone();
        }
        let issuer = TokenIssuer::new(Arc::new(CredentialKeys::from_config(&config)));
        let minted = issuer
            .mint_access(&user_id, Role::User, &[])
            .expect("Failed to mint user credential");
        Some(minted.token)
    };

    println!("\n=== Operator saved ===");
    println!("  OPERATOR_ID:    {}", operator_id);
    println!("  EMAIL:          {}", email);
    println!("  ROLE:           {}", role.as_str());
    println!("  OPERATORS_FILE: {}", operators_file.display());
    println!("\nSigning seeds written to .env");
    if let Some(credential) = user_credential {
        println!("\nUSER_CREDENTIAL for ban-listener (valid 15 minutes):\n{}", credential);
    }
    println!("\nStart the server with: cargo run -p control-api");
}
